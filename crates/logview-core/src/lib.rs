//! logview-core — catalog and tail primitives for logview.
//!
//! This crate holds everything that does not need an async runtime: the
//! source configuration, label rules, the file [`Indexer`](indexer::Indexer)
//! with its atomically published snapshots, and the tail-offset engine.
//!
//! # Architecture
//!
//! ```text
//! SourceConfig ──► Indexer ──► Snapshot (id → path)
//!                     │
//!   LabelRule ────────┘        tail::offset_for_last_lines ──► start offset
//! ```

pub mod clock;
pub mod config;
pub mod indexer;
pub mod label;
pub mod tail;
pub mod types;

pub use config::{ConfigError, SourceConfig, SourceGroup};
pub use indexer::{Indexer, Snapshot};
pub use label::LabelRule;
pub use tail::{offset_for_last_lines, TailError};
pub use types::{IndexedFile, Labels, ListEntry, Listing, StableId};
