//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.rotary/
//!   config.yaml
//! ```
//!
//! # API pattern
//!
//! Every function touching the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! [`load_from`] takes an explicit file path for `rotary --config <path>`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Directory, Server};

// ---------------------------------------------------------------------------
// 1. Schema
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub master: Server,
    #[serde(default)]
    pub targets: Vec<Server>,
    pub directories: Vec<Directory>,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub retention: RetentionRules,
}

/// Options shared by every transfer method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Base command tokens.
    #[serde(default = "default_program")]
    pub program: Vec<String>,
    #[serde(default = "default_true")]
    pub archive: bool,
    #[serde(default)]
    pub stats: bool,
    /// Extra arguments passed to every invocation.
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            archive: true,
            stats: false,
            arguments: vec![],
        }
    }
}

/// Incremental snapshot settings. The same `format` names snapshot
/// directories on rotate and parses them back on prune.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_format")]
    pub format: String,
    /// Fixed snapshot series name; generated from `format` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_latest")]
    pub latest_name: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_format(),
            name: None,
            latest_name: default_latest(),
        }
    }
}

/// Which member of a retention bucket survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeepTieBreak {
    #[default]
    Youngest,
    Oldest,
}

impl fmt::Display for KeepTieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeepTieBreak::Youngest => write!(f, "youngest"),
            KeepTieBreak::Oldest => write!(f, "oldest"),
        }
    }
}

/// Retention counts. `last` is honoured by the bundled count policy; the
/// period counts are handed to an injected period policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetentionRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarterly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yearly: Option<u32>,
    #[serde(default)]
    pub keep: KeepTieBreak,
}

impl RetentionRules {
    /// Configured period counts as `(period, count)` pairs, finest first.
    pub fn periods(&self) -> Vec<(&'static str, u32)> {
        [
            ("hourly", self.hourly),
            ("daily", self.daily),
            ("weekly", self.weekly),
            ("monthly", self.monthly),
            ("quarterly", self.quarterly),
            ("yearly", self.yearly),
        ]
        .into_iter()
        .filter_map(|(name, count)| count.map(|c| (name, c)))
        .collect()
    }
}

fn default_program() -> Vec<String> {
    vec!["rsync".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "%Y-%m-%dT%H-%M".to_string()
}

fn default_latest() -> String {
    "latest".to_string()
}

// ---------------------------------------------------------------------------
// 2. Validation / lookup
// ---------------------------------------------------------------------------

impl Config {
    /// Reject configurations the transfer and retention layers cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directories.is_empty() {
            return Err(ConfigError::Invalid("no directories configured".into()));
        }
        for dir in &self.directories {
            if !dir.is_contained() {
                return Err(ConfigError::Invalid(format!(
                    "directory '{}' must be a relative path inside the master root",
                    dir.path
                )));
            }
        }
        if self.transfer.program.is_empty() {
            return Err(ConfigError::Invalid("transfer.program is empty".into()));
        }
        if self.snapshot.latest_name.trim().is_empty() {
            return Err(ConfigError::Invalid("snapshot.latest_name is empty".into()));
        }
        let format = &self.snapshot.format;
        if format.trim().is_empty() || StrftimeItems::new(format).any(|i| matches!(i, Item::Error)) {
            return Err(ConfigError::Invalid(format!(
                "snapshot.format '{format}' is not a valid timestamp format"
            )));
        }
        if self.snapshot.name.as_deref() == Some(self.snapshot.latest_name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "snapshot.name and snapshot.latest_name are both '{}'",
                self.snapshot.latest_name
            )));
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if !seen.insert(&target.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Result<&Server, ConfigError> {
        self.targets
            .iter()
            .find(|t| t.name.0 == name)
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// 3. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.rotary/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".rotary").join("config.yaml")
}

// ---------------------------------------------------------------------------
// 4. Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    tracing::debug!(path = %path.display(), targets = config.targets.len(), "config loaded");
    Ok(config)
}

/// Load `<home>/.rotary/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Config {
        Config {
            master: Server::new("master", "backup01", "/srv"),
            targets: vec![Server::new("nas", "nas.lan", "/volume1/backups")],
            directories: vec![Directory::new("data/app")],
            transfer: TransferConfig::default(),
            snapshot: SnapshotConfig::default(),
            retention: RetentionRules::default(),
        }
    }

    #[test]
    fn config_path_is_correct() {
        let home = TempDir::new().unwrap();
        assert!(config_path_at(home.path()).ends_with(".rotary/config.yaml"));
    }

    #[test]
    fn serialized_config_loads_back() {
        let home = TempDir::new().unwrap();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_yaml::to_string(&sample()).unwrap()).unwrap();
        assert_eq!(load_at(home.path()).expect("load"), sample());
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let yaml = "master: { name: m, host: h, root: /srv }\ndirectories: [ { path: etc } ]\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.transfer.program, vec!["rsync"]);
        assert!(config.transfer.archive);
        assert!(!config.transfer.stats);
        assert_eq!(config.snapshot.latest_name, "latest");
        assert_eq!(config.retention.keep, KeepTieBreak::Youngest);
    }

    #[test]
    fn quarterly_is_read_from_its_own_key() {
        let yaml = "quarterly: 4\nmonthly: 12\nkeep: oldest\n";
        let rules: RetentionRules = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.quarterly, Some(4));
        assert_eq!(rules.periods(), vec![("monthly", 12), ("quarterly", 4)]);
        assert_eq!(rules.keep, KeepTieBreak::Oldest);
    }

    #[test]
    fn unknown_target_lookup_fails() {
        let err = sample().target("tape").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownServer(ref n) if n == "tape"));
    }

    #[test]
    fn snapshot_name_may_not_shadow_latest() {
        let mut config = sample();
        config.snapshot.name = Some("latest".into());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
