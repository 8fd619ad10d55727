//! Selector rules: extraction configuration, not code.
//!
//! The source site changes layout between sections and over time, so every
//! extracted field is addressed by a [`FieldRule`] holding a primary CSS
//! selector and an optional fallback. Layout drift is then a config change,
//! not a redeploy: rules load from a YAML file when one is given and fall
//! back to the compiled-in defaults otherwise.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::IngestError;

/// A named extraction rule: primary selector plus optional fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub selector: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

impl FieldRule {
    pub fn new(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            fallback: None,
        }
    }

    pub fn with_fallback(selector: &str, fallback: &str) -> Self {
        Self {
            selector: selector.to_string(),
            fallback: Some(fallback.to_string()),
        }
    }
}

/// The full ruleset for the listing site, one rule per extracted field.
///
/// Defaults target the site's classic layout with the redesigned
/// `data-testid` layout as fallback, since pages are served in either shape
/// depending on section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeRules {
    /// Title links inside the ranked listing table.
    pub listing_entries: FieldRule,
    pub title: FieldRule,
    pub summary: FieldRule,
    pub running_time: FieldRule,
    pub release_date: FieldRule,
    pub genres: FieldRule,
    pub languages: FieldRule,
    pub directors: FieldRule,
    pub cast: FieldRule,
    /// Rows on the secondary release-dates page.
    pub release_date_rows: FieldRule,
    pub contributor_birth: FieldRule,
    pub contributor_death: FieldRule,
    /// Actor-only: job category text on the contributor page.
    pub contributor_specialisation: FieldRule,
    /// Director-only: filmography rows, counted for the film-count attribute.
    pub contributor_films: FieldRule,
    /// Path segment appended to a detail URL to reach the release-dates page.
    pub release_dates_path: String,
}

impl Default for ScrapeRules {
    fn default() -> Self {
        Self {
            listing_entries: FieldRule::with_fallback(
                "td.titleColumn a",
                "ul.ipc-metadata-list a.ipc-title-link-wrapper",
            ),
            title: FieldRule::with_fallback("h1", ".title_wrapper h1"),
            summary: FieldRule::with_fallback(".summary_text", "[data-testid=plot]"),
            running_time: FieldRule::with_fallback("time", ".runtime"),
            release_date: FieldRule::with_fallback(
                ".release-date",
                "a[title='See more release dates']",
            ),
            genres: FieldRule::with_fallback(".genres a", "[data-testid=genres] a"),
            languages: FieldRule::with_fallback(
                ".languages a",
                "[data-testid=title-details-languages] a",
            ),
            directors: FieldRule::with_fallback(
                ".credit-directors a",
                "[data-testid=title-pc-principal-credit] a[href*='/name/']",
            ),
            cast: FieldRule::with_fallback(
                "table.cast_list a.cast-name",
                "[data-testid=title-cast-item] a",
            ),
            release_date_rows: FieldRule::with_fallback(
                "#release_dates tr",
                "table.release-dates-table tr",
            ),
            contributor_birth: FieldRule::with_fallback(
                "#name-born-info time",
                "[data-testid=birth-date]",
            ),
            contributor_death: FieldRule::with_fallback(
                "#name-death-info time",
                "[data-testid=death-date]",
            ),
            contributor_specialisation: FieldRule::with_fallback(
                ".name-job-categories a",
                ".infobar a",
            ),
            contributor_films: FieldRule::with_fallback(
                ".filmo-row",
                "[data-testid=filmography] li",
            ),
            release_dates_path: "releaseinfo".to_string(),
        }
    }
}

impl ScrapeRules {
    /// Load rules from a YAML file, or the compiled-in defaults when no path
    /// is given. Unknown fields in the file keep their defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self, IngestError> {
        match path {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path).await?;
                let rules: ScrapeRules = serde_yaml::from_str(&raw)?;
                info!(path = %path.display(), "Loaded selector rules");
                Ok(rules)
            }
            None => Ok(ScrapeRules::default()),
        }
    }
}
