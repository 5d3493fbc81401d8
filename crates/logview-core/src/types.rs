//! Core types for logview-core.
//!
//! This module defines the catalog records shared by every backend: the
//! [`StableId`] handle, the internal [`IndexedFile`], and the client-facing
//! [`ListEntry`] / [`Listing`] payloads.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Label values keyed by label name. Ordered so that serialisation and id
/// computation see keys in one fixed order.
pub type Labels = BTreeMap<String, String>;

/// Opaque, deterministic handle for a catalog entry.
///
/// Hex-encoded SHA-256 over the entry's identity metadata (display name,
/// path and label values). Identical inputs always yield the identical id,
/// so handles survive catalog refreshes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StableId(String);

impl StableId {
    /// Compute the id for `(name, path, labels)`.
    ///
    /// `keys` is the declared key set of the group the file came from; every
    /// key contributes, absent values hash as the empty string.
    pub fn compute<'a>(
        name: &str,
        path: &str,
        keys: impl IntoIterator<Item = &'a String>,
        labels: &Labels,
    ) -> Self {
        let mut material = String::new();
        let _ = write!(material, "{name:?}\0{path:?}");
        for key in keys {
            let value = labels.get(key).map(String::as_str).unwrap_or_default();
            let _ = write!(material, "\0{key:?}\u{ff}{value:?}");
        }
        Self(hex::encode(Sha256::digest(material.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StableId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A file discovered by the indexer.
///
/// `path` never leaves the process: it is skipped on serialisation and
/// clients only ever see the [`StableId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedFile {
    pub id: StableId,
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub labels: Labels,
}

impl IndexedFile {
    /// Recompute the id from this record's own metadata.
    pub fn recompute_id(&self) -> StableId {
        StableId::compute(
            &self.name,
            &self.path.to_string_lossy(),
            self.labels.keys(),
            &self.labels,
        )
    }
}

/// One addressable entry in a list response, shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub name: String,
    pub labels: Labels,
}

impl From<&IndexedFile> for ListEntry {
    fn from(file: &IndexedFile) -> Self {
        Self {
            id: file.id.to_string(),
            name: file.name.clone(),
            labels: file.labels.clone(),
        }
    }
}

/// Body of every `list` route: the declared label keys plus the entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub keys: Vec<String>,
    pub files: Vec<ListEntry>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
