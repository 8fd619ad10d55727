//! Error taxonomy for the ingestion pipeline.
//!
//! Failures are typed by where they occur in the pipeline:
//! - [`IngestError::Fetch`]: network transport errors, timeouts, and
//!   non-success HTTP statuses, all treated uniformly
//! - [`IngestError::MissingField`]: a required field absent after both the
//!   primary and fallback selectors missed
//! - [`IngestError::DateParse`]: no parsable date even after the
//!   secondary-page fallback
//! - [`IngestError::Conflict`]: a natural-key create race; recovered inside
//!   the resolver by re-querying, never surfaced to an item
//!
//! Item-level failures are caught at the item boundary and recorded in the
//! run summary; only listing-level failures abort a whole run.

use thiserror::Error;

/// All failure modes of the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Network transport error, timeout, or non-success HTTP status.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A required field was absent after trying both selectors.
    #[error("required field `{0}` missing after fallback selector")]
    MissingField(&'static str),

    /// No date could be derived from the raw text or the secondary page.
    #[error("no parsable date in {0:?}")]
    DateParse(String),

    /// Insert-if-absent hit an existing natural key.
    #[error("{kind} already exists for natural key `{key}`")]
    Conflict { kind: &'static str, key: String },

    /// A configured selector string failed to compile.
    #[error("invalid selector `{0}`")]
    Selector(String),

    /// Catalog store failure outside the conflict path.
    #[error("store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rules file error: {0}")]
    Rules(#[from] serde_yaml::Error),
}

impl IngestError {
    /// True for the natural-key race the resolver recovers from locally.
    pub fn is_conflict(&self) -> bool {
        matches!(self, IngestError::Conflict { .. })
    }
}
