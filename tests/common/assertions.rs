//! Waiting helpers and domain assertions for logview harnesses.

use std::time::Duration;

/// Upper bound for anything a harness waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Poll `cond` every few milliseconds until it holds or `limit` passes.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Assert that reading `content` from `offset` yields `expected`.
///
/// ```rust
/// assert_tail!(b"a\nb\nc\n", 2, "b\nc\n");
/// ```
#[macro_export]
macro_rules! assert_tail {
    ($content:expr, $offset:expr, $expected:expr) => {{
        let content: &[u8] = $content;
        let offset = $offset as usize;
        let actual = String::from_utf8_lossy(&content[offset..]);
        if actual != $expected {
            panic!(
                "assert_tail! failed:\n  offset:   {}\n  expected: {:?}\n  actual:   {:?}",
                offset, $expected, actual
            );
        }
    }};
}

/// Split SSE body text into its `data:` payloads.
pub fn sse_data(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            frame
                .lines()
                .filter_map(|l| l.strip_prefix("data:"))
                .map(|l| l.strip_prefix(' ').unwrap_or(l))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect()
}
