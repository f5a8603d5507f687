//! JSON cache of fetched pages.
//!
//! The business detail batch is the slowest fetch of a harvest. Its results
//! can be written to a JSON file and replayed by a later run instead of
//! hitting the site again.
//!
//! # File layout
//!
//! ```text
//! [
//!   { "url": "https://grosserrat.bs.ch/geschaefte/200112345", "body": "<html>..." },
//!   { "url": "https://grosserrat.bs.ch/geschaefte/200100001", "error": "HTTP status 404" }
//! ]
//! ```
//!
//! Failed slots keep their position, so a replayed batch lines up with the
//! URLs it was fetched for.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, instrument, warn};

use crate::fetch::{FetchError, FetchFailure, FetchResult, body_text};

/// Default location of the business page cache.
pub const DEFAULT_CACHE_FILE: &str = "tmp/business_pages.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid cache JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One slot of a cached fetch batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CachedPage {
    pub fn from_result(url: &str, result: &FetchResult) -> Self {
        match result {
            Ok(body) => Self {
                url: url.to_string(),
                body: Some(body_text(body)),
                error: None,
            },
            Err(failure) => Self {
                url: url.to_string(),
                body: None,
                error: Some(failure.cause.to_string()),
            },
        }
    }

    /// Back into a fetch result. A cached failure replays as a transport
    /// failure carrying the original message.
    pub fn into_result(self) -> FetchResult {
        match (self.body, self.error) {
            (Some(body), _) => Ok(body.into()),
            (None, error) => Err(FetchFailure {
                url: self.url,
                cause: FetchError::Transport(error.unwrap_or_else(|| "empty cache slot".into())),
            }),
        }
    }
}

/// Write a cached batch to `path`, creating parent directories.
///
/// # Arguments
///
/// * `path` - Cache file, overwritten as a whole
/// * `pages` - Slots to write, failed ones included
///
/// # Returns
///
/// `Ok(())` on success, or [`CacheError`] if serialization, directory
/// creation or the write fails.
#[instrument(level = "info", skip_all, fields(path = %path.display(), pages = pages.len()))]
pub async fn save_pages(path: &Path, pages: &[CachedPage]) -> Result<(), CacheError> {
    let json = serde_json::to_string(pages)?;
    let io_err = |source| CacheError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create cache dir");
            return Err(io_err(e));
        }
    }

    fs::write(path, json).await.map_err(io_err)?;
    info!("Wrote page cache");
    Ok(())
}

/// Read a cached batch from `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_pages(path: &Path) -> Result<Vec<CachedPage>, CacheError> {
    let json = fs::read_to_string(path).await.map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let pages: Vec<CachedPage> = serde_json::from_str(&json)?;
    let failed = pages.iter().filter(|p| p.body.is_none()).count();
    if failed > 0 {
        warn!(failed, "Cache contains failed slots");
    }
    info!(pages = pages.len(), "Loaded page cache");
    Ok(pages)
}
