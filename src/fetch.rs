//! Bounded-concurrency page fetching.
//!
//! # Architecture
//!
//! - [`PageSource`]: transport trait (GET and form POST) returning raw bytes
//! - [`HttpSource`]: the `reqwest` implementation; one client, connection
//!   reuse, fixed `User-Agent`, per-request timeout
//! - [`BoundedFetcher`]: drives a batch of GETs through a `PageSource` with at
//!   most `concurrency` requests outstanding
//!
//! # Batch semantics
//!
//! Results come back positionally aligned with the input URLs. A failing or
//! timed-out request turns into a [`FetchFailure`] in its own slot and never
//! cancels or delays its siblings. Nothing is retried. The one fatal case is
//! an unreachable origin on the first request of a [`BoundedFetcher::fetch_all`]
//! batch; [`BoundedFetcher::fetch_each`] leaves even that in its slot.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::FetchSettings;
use crate::error::HarvestError;

/// Why a single request failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// True when the origin could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FetchError::Connect(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = e.status() {
            FetchError::Status(status.as_u16())
        } else if e.is_connect() {
            FetchError::Connect(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Failure marker for one slot of a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetch of {url} failed: {cause}")]
pub struct FetchFailure {
    pub url: String,
    #[source]
    pub cause: FetchError,
}

/// Outcome of one request.
pub type FetchResult = Result<Bytes, FetchFailure>;

/// Transport used by the fetcher and the PDF tagger.
pub trait PageSource {
    /// GET `url` and return the body of a 2xx response.
    async fn get(&self, url: &str) -> Result<Bytes, FetchError>;

    /// POST `form` url-encoded to `url` and return the body of a 2xx response.
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<Bytes, FetchError>;
}

/// `reqwest`-backed [`PageSource`].
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.bytes().await?)
    }

    #[instrument(level = "debug", skip(self, form))]
    async fn post_form(&self, url: &str, form: &[(&str, String)]) -> Result<Bytes, FetchError> {
        let resp = self
            .client
            .post(url)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?)
    }
}

/// Runs batches of GETs with a hard cap on outstanding requests.
#[derive(Debug)]
pub struct BoundedFetcher<S> {
    source: S,
    concurrency: usize,
    timeout: Duration,
}

impl<S: PageSource> BoundedFetcher<S> {
    pub fn new(source: S, settings: &FetchSettings) -> Self {
        Self {
            source,
            concurrency: settings.concurrency.max(1),
            timeout: settings.timeout,
        }
    }

    /// The underlying transport, for one-off requests outside a batch.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch one URL, converting an elapsed timeout into a failure.
    pub async fn fetch_one(&self, url: &str) -> FetchResult {
        let t0 = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.source.get(url)).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(cause)) => Err(FetchFailure {
                url: url.to_string(),
                cause,
            }),
            Err(_) => Err(FetchFailure {
                url: url.to_string(),
                cause: FetchError::Timeout,
            }),
        };
        match &outcome {
            Ok(body) => debug!(%url, bytes = body.len(), elapsed_ms = t0.elapsed().as_millis() as u64, "Fetched"),
            Err(f) => warn!(%url, error = %f.cause, "Fetch failed"),
        }
        outcome
    }

    /// Submit a form to `url` under the same timeout as a GET.
    #[instrument(level = "info", skip(self, form), fields(fields = form.len()))]
    pub async fn submit_form(&self, url: &str, form: &[(&str, String)]) -> FetchResult {
        let failure = |cause| FetchFailure {
            url: url.to_string(),
            cause,
        };
        match tokio::time::timeout(self.timeout, self.source.post_form(url, form)).await {
            Ok(Ok(body)) => {
                debug!(%url, bytes = body.len(), "Form submitted");
                Ok(body)
            }
            Ok(Err(cause)) => Err(failure(cause)),
            Err(_) => Err(failure(FetchError::Timeout)),
        }
    }

    /// Fetch every URL with at most `concurrency` requests outstanding.
    ///
    /// Requests start in submission order; a queued request starts as soon as
    /// any running one finishes, so a slow or timed-out request holds only its
    /// own slot. Every failure, connection failures included, stays in its
    /// slot.
    ///
    /// # Arguments
    ///
    /// * `urls` - Pages to GET, in the order results should come back
    ///
    /// # Returns
    ///
    /// One [`FetchResult`] per input URL, at the same position.
    #[instrument(level = "info", skip_all, fields(count = urls.len(), concurrency = self.concurrency))]
    pub async fn fetch_each(&self, urls: &[String]) -> Vec<FetchResult> {
        let t0 = Instant::now();
        let mut indexed: Vec<(usize, FetchResult)> = stream::iter(urls.iter().enumerate())
            .map(|(i, url)| async move { (i, self.fetch_one(url).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_unstable_by_key(|(i, _)| *i);
        let results: Vec<FetchResult> = indexed.into_iter().map(|(_, r)| r).collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(
            total = results.len(),
            ok = results.len() - failed,
            failed,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetch batch complete"
        );
        results
    }

    /// Like [`fetch_each`](Self::fetch_each), but a batch whose first request
    /// could not reach the origin is an error.
    ///
    /// # Returns
    ///
    /// * `Ok(results)` - One [`FetchResult`] per input URL, at the same position
    /// * `Err(HarvestError::OriginUnreachable)` - The first request failed to
    ///   connect
    pub async fn fetch_all(&self, urls: &[String]) -> Result<Vec<FetchResult>, HarvestError> {
        let results = self.fetch_each(urls).await;
        if let Some(Err(first)) = results.first() {
            if first.cause.is_unreachable() {
                return Err(HarvestError::OriginUnreachable(first.clone()));
            }
        }
        Ok(results)
    }
}

/// Decode a fetched page as text, replacing invalid UTF-8.
pub fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
