//! Command-line interface definitions for the ingestion job.
//!
//! All options can be given as flags or environment variables. The job is
//! meant to be run from cron or an administrative shell, so everything has
//! a sensible default except the listing URL.

use clap::Parser;

/// Command-line arguments for one ingestion run.
///
/// # Examples
///
/// ```sh
/// # Ingest up to 10 new titles from the ranked listing
/// catalog_ingest --listing-url https://example.com/chart/top
///
/// # Larger batch, custom selector rules, summary artifact
/// catalog_ingest -l https://example.com/chart/top -b 25 \
///     --rules rules.yaml --summary-out summary.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// URL of the ranked listing page to crawl
    #[arg(short, long, env = "LISTING_URL")]
    pub listing_url: String,

    /// Maximum number of newly created media items this run
    #[arg(short, long, default_value_t = 10)]
    pub batch_cap: usize,

    /// Bound on concurrent contributor-detail fetches within one item
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Timeout in seconds applied to every outbound request
    #[arg(long, default_value_t = 15)]
    pub timeout_secs: u64,

    /// Optional path to a YAML selector-rules file
    #[arg(short, long, env = "SCRAPE_RULES")]
    pub rules: Option<String>,

    /// Path of the catalog snapshot file
    #[arg(long, default_value = "catalog.json")]
    pub catalog: String,

    /// Optional path to write the run summary as JSON
    #[arg(long)]
    pub summary_out: Option<String>,
}
