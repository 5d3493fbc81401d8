//! Source configuration for the file catalog.
//!
//! [`SourceConfig::load`] reads a YAML, JSON or TOML file through the
//! `config` crate, picking the format from the file extension. Any failure
//! here is fatal at startup; nothing is retried at refresh time.
//!
//! ```yaml
//! keys: [service]
//! files:
//!   - paths: ["/var/log/*.log"]
//!     labels:
//!       service: '([a-z]+)\.log$'
//! ```

use crate::label::{LabelRule, NAME_KEY};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Errors raised while loading the source configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: config::ConfigError,
    },
}

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// One glob group: ordered path patterns plus the label rules applied to
/// every file they match.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceGroup {
    pub paths: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, LabelRule>,
}

impl SourceGroup {
    /// Label keys this group declares, excluding the reserved name key.
    /// Ordered, so the id digest sees them in one fixed order.
    pub fn label_keys(&self) -> impl Iterator<Item = &String> {
        self.labels.keys().filter(|k| k.as_str() != NAME_KEY)
    }

    pub fn name_rule(&self) -> Option<&LabelRule> {
        self.labels.get(NAME_KEY)
    }
}

/// Top-level source configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    /// Declared display order of label keys. Derived from the groups when
    /// absent.
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub files: Vec<SourceGroup>,
}

impl SourceConfig {
    /// Load from `path`. The extension selects the format: `.yaml`/`.yml`,
    /// `.json` or `.toml`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => config::FileFormat::Yaml,
            Some("json") => config::FileFormat::Json,
            Some("toml") => config::FileFormat::Toml,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        config::Config::builder()
            .add_source(config::File::from(path).format(format).required(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Parse from an in-memory string (used by tests and `glob-test`).
    pub fn parse(text: &str, format: config::FileFormat) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(text, format))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ConfigError::Load {
                path: PathBuf::from("<inline>"),
                source,
            })
    }

    /// Keys shown to clients: the configured list, or the sorted union of
    /// every group's label keys.
    pub fn display_keys(&self) -> Vec<String> {
        if !self.keys.is_empty() {
            return self.keys.clone();
        }
        self.files
            .iter()
            .flat_map(|g| g.label_keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
keys: [service]
files:
  - paths: ["/var/log/*.log"]
    labels:
      service: '([a-z]+)\.log$'
      __name__:
        pattern: '/([a-z]+)/[^/]+$'
        replace: 'dir-$1'
  - paths: ["/tmp/*.txt", "/opt/*.txt"]
"#;

    #[test]
    fn yaml_loads() {
        let cfg = SourceConfig::parse(YAML, config::FileFormat::Yaml).unwrap();
        assert_eq!(cfg.keys, vec!["service"]);
        assert_eq!(cfg.files.len(), 2);
        assert_eq!(cfg.files[0].label_keys().collect::<Vec<_>>(), vec!["service"]);
        assert!(cfg.files[0].name_rule().is_some());
        assert_eq!(cfg.files[1].paths, vec!["/tmp/*.txt", "/opt/*.txt"]);
        assert!(cfg.files[1].labels.is_empty());
    }

    #[test]
    fn display_keys_fall_back_to_union() {
        let json = r#"{"files":[
            {"paths":["/a/*"],"labels":{"b":"x","a":"y"}},
            {"paths":["/b/*"],"labels":{"c":"z","__name__":"n"}}
        ]}"#;
        let cfg = SourceConfig::parse(json, config::FileFormat::Json).unwrap();
        assert_eq!(cfg.display_keys(), vec!["a", "b", "c"]);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            SourceConfig::load(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn invalid_label_pattern_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, r#"{"files":[{"paths":["/a"],"labels":{"k":"(["}}]}"#).unwrap();
        assert!(matches!(
            SourceConfig::load(&path),
            Err(ConfigError::Load { .. })
        ));
    }

    #[test]
    fn json_file_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, r#"{"files":[{"paths":["/var/log/*.log"]}]}"#).unwrap();
        let cfg = SourceConfig::load(&path).unwrap();
        assert_eq!(cfg.files[0].paths, vec!["/var/log/*.log"]);
    }
}
