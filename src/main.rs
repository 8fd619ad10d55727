//! # Catalog Ingest
//!
//! A batch ingestion job that crawls a ranked external listing of titles,
//! fetches per-title detail pages, extracts structured entities (media item,
//! contributors, languages, genres), resolves each against already-known
//! records by natural key, and persists fully-linked media items into the
//! catalog, idempotently across runs.
//!
//! ## Usage
//!
//! ```sh
//! catalog_ingest --listing-url https://example.com/chart/top --batch-cap 10
//! ```
//!
//! ## Architecture
//!
//! The job follows a pipeline architecture:
//! 1. **Listing**: fetch and parse the ranked listing page
//! 2. **Per item**: fetch the detail page, extract fields, normalize the
//!    release date (with a secondary-page fallback), resolve contributors,
//!    languages, and genres to store identifiers
//! 3. **Persist**: create the media item with all association sets attached
//! 4. **Report**: write the run summary and the catalog snapshot
//!
//! Titles already present in the catalog are skipped and do not consume the
//! batch cap, so repeated runs converge instead of duplicating.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod batch;
mod cli;
mod dates;
mod error;
mod extract;
mod fetch;
mod models;
mod pipeline;
mod resolve;
mod rules;
mod store;

use batch::BatchOptions;
use cli::Cli;
use fetch::HttpFetcher;
use rules::ScrapeRules;
use store::MemoryStore;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("catalog_ingest starting up");

    let args = Cli::parse();
    debug!(?args.listing_url, args.batch_cap, args.concurrency, "Parsed CLI arguments");

    // Cancellation: first ctrl-c finishes the in-flight item and stops the
    // loop between items.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-c received; finishing in-flight item then stopping");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let rules = ScrapeRules::load(args.rules.as_deref().map(Path::new)).await?;
    let fetcher = HttpFetcher::new(Duration::from_secs(args.timeout_secs))?;
    let store = MemoryStore::load(Path::new(&args.catalog)).await?;

    let opts = BatchOptions {
        batch_cap: args.batch_cap,
        concurrency: args.concurrency,
    };

    let summary = batch::run(
        &store,
        &fetcher,
        &rules,
        &args.listing_url,
        &opts,
        &cancel,
    )
    .await?;

    store.save(Path::new(&args.catalog)).await?;
    info!(
        media_items = store.media_item_count().await,
        contributors = store.contributor_count().await,
        "Catalog totals after run"
    );

    if let Some(ref path) = args.summary_out {
        let json = serde_json::to_string_pretty(&summary)?;
        tokio::fs::write(path, json).await?;
        info!(%path, "Wrote run summary");
    }

    for item in &summary.created {
        info!(title = %item.title, elapsed_ms = item.elapsed_ms, "Created");
    }
    for item in &summary.failed {
        warn!(title = %item.title, reason = %item.reason, "Failed");
    }

    let elapsed = start_time.elapsed();
    info!(
        %summary,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
