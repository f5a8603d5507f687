//! Runtime settings and the code/label lookup tables.
//!
//! The lookup tables are loaded once at startup, either from the YAML file
//! embedded in the binary or from a user-supplied file, and are immutable for
//! the lifetime of the process.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

use crate::models::UNKNOWN_CODE;

/// Default origin of every request.
pub const DEFAULT_ORIGIN: &str = "https://grosserrat.bs.ch";
/// Default cap on concurrently outstanding requests.
pub const DEFAULT_CONCURRENCY: usize = 3;
/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = concat!("grosserrat/", env!("CARGO_PKG_VERSION"));

const EMBEDDED_LOOKUPS: &str = include_str!("../config/lookups.yaml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read lookup file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid lookup YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("lookup table `{0}` has no entry for the unknown code 99")]
    MissingUnknown(&'static str),
    #[error("invalid origin: {0}")]
    Origin(#[from] url::ParseError),
}

/// Connection settings shared by every fetch batch.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub origin: Url,
    pub user_agent: String,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl FetchSettings {
    pub fn new(
        origin: &str,
        user_agent: &str,
        concurrency: usize,
        timeout_secs: u64,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            origin: Url::parse(origin)?,
            user_agent: user_agent.to_string(),
            // A zero cap would never admit a request.
            concurrency: concurrency.max(1),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// A bidirectional code ↔ label table.
#[derive(Debug, Clone)]
pub struct CodeTable {
    labels: BTreeMap<u32, String>,
    codes: HashMap<String, u32>,
}

impl CodeTable {
    fn new(labels: BTreeMap<u32, String>) -> Self {
        let codes = labels
            .iter()
            .map(|(code, label)| (label.trim().to_string(), *code))
            .collect();
        Self { labels, codes }
    }

    /// Label → code; labels missing from the table map to [`UNKNOWN_CODE`].
    pub fn code_for(&self, label: &str) -> u32 {
        self.codes.get(label.trim()).copied().unwrap_or(UNKNOWN_CODE)
    }

    /// Code → canonical label.
    pub fn label_for(&self, code: u32) -> Option<&str> {
        self.labels.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

#[derive(Debug, Deserialize)]
struct LookupFile {
    business_types: BTreeMap<u32, String>,
    business_statuses: BTreeMap<u32, String>,
}

/// Business type and status tables.
#[derive(Debug, Clone)]
pub struct TypeLookup {
    pub types: CodeTable,
    pub statuses: CodeTable,
}

impl TypeLookup {
    /// The tables compiled into the binary.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_yaml(EMBEDDED_LOOKUPS)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: LookupFile = serde_yaml::from_str(yaml)?;
        if !file.business_types.contains_key(&UNKNOWN_CODE) {
            return Err(ConfigError::MissingUnknown("business_types"));
        }
        if !file.business_statuses.contains_key(&UNKNOWN_CODE) {
            return Err(ConfigError::MissingUnknown("business_statuses"));
        }
        Ok(Self {
            types: CodeTable::new(file.business_types),
            statuses: CodeTable::new(file.business_statuses),
        })
    }

    /// Load from `path` when given, otherwise use the embedded tables.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let lookup = match path {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_yaml(&yaml)?
            }
            None => Self::embedded()?,
        };
        info!(
            types = lookup.types.len(),
            statuses = lookup.statuses.len(),
            "Loaded lookup tables"
        );
        Ok(lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_tables_parse() {
        let lookup = TypeLookup::embedded().unwrap();
        assert_eq!(lookup.types.code_for("Anzug"), 1);
        assert_eq!(lookup.types.label_for(10), Some("Schriftliche Anfrage"));
        assert_eq!(lookup.statuses.code_for("erledigt"), 2);
    }

    #[test]
    fn test_unknown_label_maps_to_99() {
        let lookup = TypeLookup::embedded().unwrap();
        assert_eq!(lookup.types.code_for("Gibt es nicht"), UNKNOWN_CODE);
        assert_eq!(lookup.types.label_for(UNKNOWN_CODE), Some("Unbekannt"));
    }

    #[test]
    fn test_label_lookup_trims_whitespace() {
        let lookup = TypeLookup::embedded().unwrap();
        assert_eq!(lookup.types.code_for("  Interpellation\n"), 3);
    }

    #[test]
    fn test_table_without_unknown_code_is_rejected() {
        let yaml = "business_types:\n  1: Anzug\nbusiness_statuses:\n  99: Unbekannt\n";
        let err = TypeLookup::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::MissingUnknown("business_types")));
    }

    #[test]
    fn test_fetch_settings_clamp_zero_concurrency() {
        let settings = FetchSettings::new(DEFAULT_ORIGIN, "ua", 0, 5).unwrap();
        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }
}
