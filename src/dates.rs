//! Date normalization for the heterogeneous date strings on the source site.
//!
//! Two input shapes occur in the wild:
//!
//! 1. Long form, "Month Day, Year" ("January 5, 2020"), possibly wrapped in
//!    surrounding text ("Released January 5, 2020 (USA)"). Resolved directly
//!    through the month table.
//! 2. A locale-ambiguous short form that cannot be parsed at all. For those
//!    the secondary release-dates page is fetched and its rows scanned for
//!    the first well-formed three-token date; that page prints dates
//!    day-first ("5 January 2020"), so the token order is reversed there.
//!
//! Output is always a canonical [`NaiveDate`], which displays as
//! `YYYY-MM-DD`. Contributor birth/death dates use [`normalize_optional`]:
//! an absent section yields `None`, never an error.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::error::IngestError;
use crate::extract::{self, Extracted};
use crate::fetch::FetchDocument;
use crate::rules::ScrapeRules;

/// Month-name to two-digit month-number table.
pub static MONTHS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("January", "01"),
        ("February", "02"),
        ("March", "03"),
        ("April", "04"),
        ("May", "05"),
        ("June", "06"),
        ("July", "07"),
        ("August", "08"),
        ("September", "09"),
        ("October", "10"),
        ("November", "11"),
        ("December", "12"),
    ])
});

static LONG_FORM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]+)\s+(\d{1,2}),\s*(\d{4})").unwrap());

static DAY_FIRST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s+([A-Za-z]+)\s+(\d{4})").unwrap());

/// Canonicalize a month token to the table's capitalization.
fn canonical_month(token: &str) -> String {
    let lower = token.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn assemble(
    year: &str,
    month_token: &str,
    day: &str,
    months: &HashMap<&str, &str>,
) -> Option<NaiveDate> {
    let month = months.get(canonical_month(month_token).as_str())?;
    let day: u32 = day.parse().ok()?;
    let iso = format!("{year}-{month}-{day:02}");
    NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok()
}

/// Parse a long-form "Month Day, Year" date anywhere inside `raw`.
pub fn normalize_long_form(raw: &str, months: &HashMap<&str, &str>) -> Option<NaiveDate> {
    let caps = LONG_FORM.captures(raw)?;
    assemble(&caps[3], &caps[1], &caps[2], months)
}

/// Parse a day-first "Day Month Year" date anywhere inside `raw`, the
/// convention used by the secondary release-dates page.
pub fn normalize_day_first(raw: &str, months: &HashMap<&str, &str>) -> Option<NaiveDate> {
    let caps = DAY_FIRST.captures(raw)?;
    assemble(&caps[3], &caps[2], &caps[1], months)
}

/// Normalize a release-date string, falling back to the secondary page.
///
/// Tries the long form first. When `raw` is not parsable, fetches
/// `release_info_url` and scans its rows for the first well-formed day-first
/// date. Fails with [`IngestError::DateParse`] when no row yields one.
#[instrument(level = "debug", skip(fetcher, rules, months), fields(%release_info_url))]
pub async fn normalize<F: FetchDocument>(
    raw: &str,
    release_info_url: &str,
    fetcher: &F,
    rules: &ScrapeRules,
    months: &HashMap<&str, &str>,
) -> Result<NaiveDate, IngestError> {
    if let Some(date) = normalize_long_form(raw, months) {
        return Ok(date);
    }

    debug!(%raw, "Ambiguous release date; falling back to release-dates page");
    let body = fetcher.fetch(release_info_url).await?;
    let rows = {
        let doc = Html::parse_document(&body);
        extract::extract_fragments(&doc, &rules.release_date_rows)?
    };

    for row in &rows {
        if let Some(date) = normalize_day_first(&row.text(), months) {
            return Ok(date);
        }
    }

    warn!(%raw, rows = rows.len(), "No parsable date on release-dates page");
    Err(IngestError::DateParse(raw.to_string()))
}

/// Birth/death variant: a missing section is an absent date, not an error.
/// A present but unparsable value is treated the same way.
pub fn normalize_optional(raw: Extracted, months: &HashMap<&str, &str>) -> Option<NaiveDate> {
    let text = raw.into_option()?;
    let parsed = normalize_long_form(&text, months);
    if parsed.is_none() {
        warn!(%text, "Unparsable contributor date; treating as absent");
    }
    parsed
}
