//! Outbound document fetching.
//!
//! [`FetchDocument`] is the capability interface the rest of the pipeline
//! depends on: given a URL, produce raw markup or a typed failure. The
//! production implementation is [`HttpFetcher`], a thin wrapper over a shared
//! `reqwest::Client` with a bounded request timeout. Transport errors,
//! timeouts, and non-success statuses all map uniformly to
//! [`IngestError::Fetch`]; no retries happen at this layer.

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::IngestError;

/// Capability interface for fetching a document by URL.
///
/// Implementors return the raw response body. Tests substitute a fake that
/// serves fixture pages from memory.
pub trait FetchDocument {
    /// Fetch the document at `url`, returning its body as text.
    async fn fetch(&self, url: &str) -> Result<String, IngestError>;
}

/// HTTP fetcher backed by a shared client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a fetcher whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Fetch {
                url: String::new(),
                reason: format!("client build failed: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl FetchDocument for HttpFetcher {
    #[instrument(level = "debug", skip(self), fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, IngestError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| IngestError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, %status, "Non-success response");
            return Err(IngestError::Fetch {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        let body = response.text().await.map_err(|e| IngestError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!(%url, bytes = body.len(), "Fetched document");
        Ok(body)
    }
}
