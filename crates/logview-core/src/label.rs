//! Label rules — derive a named attribute from a file path.
//!
//! A rule is a compiled [`Regex`] and an optional replacement template in
//! `regex` expansion syntax (`$1`, `${name}`). A path the pattern does not
//! match yields the empty string; absence of a match is the normal case for
//! heterogeneous file sets, never an error.

use regex::Regex;
use serde::Deserialize;

/// Reserved label key whose value overrides a file's display name.
pub const NAME_KEY: &str = "__name__";

/// A compiled label rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawLabelRule")]
pub struct LabelRule {
    pattern: Regex,
    replace: Option<String>,
}

/// Label rule as written in the source config: a bare pattern or a table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawLabelRule {
    Pattern(String),
    Full {
        pattern: String,
        #[serde(default)]
        replace: Option<String>,
    },
}

impl TryFrom<RawLabelRule> for LabelRule {
    type Error = regex::Error;

    fn try_from(raw: RawLabelRule) -> Result<Self, Self::Error> {
        match raw {
            RawLabelRule::Pattern(pattern) => LabelRule::new(&pattern, None),
            RawLabelRule::Full { pattern, replace } => LabelRule::new(&pattern, replace),
        }
    }
}

impl LabelRule {
    pub fn new(pattern: &str, replace: Option<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replace,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Apply the rule to `path`.
    ///
    /// Without a template the first capture group is used, or the whole
    /// match when the pattern has no groups. A group that did not take part
    /// in the match, or a template that expands to nothing, gives `""`.
    pub fn evaluate(&self, path: &str) -> String {
        let Some(caps) = self.pattern.captures(path) else {
            return String::new();
        };
        match &self.replace {
            Some(template) => {
                let mut out = String::new();
                caps.expand(template, &mut out);
                out
            }
            None if caps.len() > 1 => caps
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            None => caps[0].to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
