//! logview — list, tail and watch logs over HTTP.
//!
//! The binary is a thin shell over three crates, re-exported here so that
//! integration tests and benches can reach every layer directly.
//!
//! # Architecture
//!
//! ```text
//! SourceConfig ──► Indexer ──► DirFiles ─┐
//!                  Docker Engine API ────┼──► Registry ──► axum router
//!                  journalctl ───────────┘
//! ```
//!
//! Each backend answers the same three requests: list entries, tail the
//! last N lines, and watch new lines until the client disconnects.

pub use logview_core as catalog;
pub use logview_feeds as feeds;
pub use logview_server as server;
