//! Batch orchestration over the ranked listing.
//!
//! One run: fetch and parse the listing page (fatal on failure, there is
//! nothing to iterate), then walk its entries in order through the item
//! processor. Only newly created items count toward the batch cap; skipped
//! titles are free, so re-runs make progress past what earlier runs
//! ingested. A failed item is recorded with its cause and the loop moves on;
//! one bad page never halts the batch.
//!
//! Cancellation is checked between items: the in-flight item completes, the
//! rest is left for the next run, and the summary marks the run cancelled.

use scraper::Html;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::error::IngestError;
use crate::extract;
use crate::fetch::FetchDocument;
use crate::models::{EntityId, ListingEntry};
use crate::pipeline::{ItemOutcome, ItemProcessor};
use crate::rules::ScrapeRules;
use crate::store::CatalogStore;

/// Run parameters for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of newly created media items per run.
    pub batch_cap: usize,
    /// Bound on concurrent contributor-detail resolutions within one item.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_cap: 10,
            concurrency: 4,
        }
    }
}

/// A title created this run, with its processing time.
#[derive(Debug, Serialize)]
pub struct CreatedItem {
    pub id: EntityId,
    pub title: String,
    pub elapsed_ms: u64,
}

/// An entry that failed this run, with the cause.
#[derive(Debug, Serialize)]
pub struct FailedItem {
    pub title: String,
    pub url: String,
    pub reason: String,
}

/// The run's output artifact: what was created, skipped, and failed.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub created: Vec<CreatedItem>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedItem>,
    /// True when the run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} skipped={} failed={}{}",
            self.created.len(),
            self.skipped.len(),
            self.failed.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Parse the ranked listing page into ordered entries.
pub fn parse_listing(
    body: &str,
    listing_url: &str,
    rules: &ScrapeRules,
) -> Result<Vec<ListingEntry>, IngestError> {
    let doc = Html::parse_document(body);
    let links = extract::require_fragments(&doc, "listing_entries", &rules.listing_entries)?;

    let base = url::Url::parse(listing_url).ok();
    let mut entries = Vec::with_capacity(links.len());
    for (i, link) in links.iter().enumerate() {
        let Some(href) = link.href() else {
            warn!(rank = i + 1, "Listing entry without href; skipping row");
            continue;
        };
        let url = match &base {
            Some(base) => match base.join(&href) {
                Ok(resolved) => resolved.to_string(),
                Err(_) => href,
            },
            None => href,
        };
        entries.push(ListingEntry {
            rank: entries.len() + 1,
            title: link.text(),
            url,
        });
    }
    Ok(entries)
}

/// Walk the listing and ingest up to `batch_cap` new media items.
///
/// Listing fetch/parse failures abort the run; everything after that is
/// isolated per item.
#[instrument(level = "info", skip(store, fetcher, rules, opts, cancel), fields(%listing_url))]
pub async fn run<S, F>(
    store: &S,
    fetcher: &F,
    rules: &ScrapeRules,
    listing_url: &str,
    opts: &BatchOptions,
    cancel: &AtomicBool,
) -> Result<RunSummary, IngestError>
where
    S: CatalogStore,
    F: FetchDocument,
{
    let body = fetcher.fetch(listing_url).await?;
    let entries = parse_listing(&body, listing_url, rules)?;
    info!(count = entries.len(), cap = opts.batch_cap, "Parsed ranked listing");

    let processor = ItemProcessor {
        store,
        fetcher,
        rules,
        concurrency: opts.concurrency,
    };

    let mut summary = RunSummary::default();
    for entry in &entries {
        if summary.created.len() >= opts.batch_cap {
            info!(cap = opts.batch_cap, "Batch cap reached");
            break;
        }
        if cancel.load(Ordering::Relaxed) {
            warn!("Cancellation requested; stopping before next item");
            summary.cancelled = true;
            break;
        }

        let started = Instant::now();
        match processor.process(entry).await {
            Ok(ItemOutcome::Created { id, title }) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(rank = entry.rank, %title, id, elapsed_ms, "Item created");
                summary.created.push(CreatedItem {
                    id,
                    title,
                    elapsed_ms,
                });
            }
            Ok(ItemOutcome::Skipped { title }) => {
                info!(rank = entry.rank, %title, "Item skipped");
                summary.skipped.push(title);
            }
            Err(e) => {
                error!(rank = entry.rank, url = %entry.url, error = %e, "Item failed");
                summary.failed.push(FailedItem {
                    title: entry.title.clone(),
                    url: entry.url.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(%summary, "Run complete");
    Ok(summary)
}
