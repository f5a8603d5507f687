//! Crate-level error type.
//!
//! Each stage has its own error enum next to its code; [`HarvestError`]
//! aggregates them for the pipeline so `?` works across stage boundaries.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fetch::FetchFailure;
use crate::outputs::json::CacheError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum HarvestError {
    /// The first request of a batch could not reach the origin.
    #[error("origin unreachable: {0}")]
    OriginUnreachable(#[source] FetchFailure),

    /// A single request whose result the stage cannot do without
    /// (e.g. the member search).
    #[error(transparent)]
    Fetch(#[from] FetchFailure),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, HarvestError>;
