//! Per-entry processing: one listing entry in, one fully-linked media item out.
//!
//! The processor fetches the entry's detail page, extracts the title, and
//! short-circuits with [`ItemOutcome::Skipped`] when the catalog already
//! holds that title (the idempotency check). Otherwise it extracts the
//! remaining fields, normalizes the release date, resolves every
//! contributor, language, and genre to a store identifier, and creates the
//! media item with all four association sets attached in one store call.
//!
//! Contributor resolution fans out across a bounded `buffer_unordered` pool;
//! everything else is sequential. Any extraction, normalization, or
//! resolution failure aborts this item only, and because the media item is
//! written last, a failed item leaves nothing behind.

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use scraper::Html;
use tracing::{debug, info, instrument};
use url::Url;

use crate::dates::{self, MONTHS};
use crate::error::IngestError;
use crate::extract::{self, Extracted};
use crate::fetch::FetchDocument;
use crate::models::{EntityId, ListingEntry, NewMediaItem, RoleKind};
use crate::resolve::EntityResolver;
use crate::rules::ScrapeRules;
use crate::store::CatalogStore;

/// Result of processing one listing entry.
#[derive(Debug)]
pub enum ItemOutcome {
    Created { id: EntityId, title: String },
    Skipped { title: String },
}

/// A name extracted from a credits list, with its detail-page link if any.
#[derive(Debug, Clone)]
struct Credit {
    name: String,
    url: Option<String>,
}

/// All fields extracted from one detail page, owned and awaitable-safe.
#[derive(Debug)]
struct ItemFields {
    languages: Vec<String>,
    raw_release_date: String,
    genres: Vec<String>,
    running_time_minutes: u32,
    summary: String,
    directors: Vec<Credit>,
    cast: Vec<Credit>,
}

/// Orchestrates fetcher, extractor, normalizer, and resolver for one entry.
pub struct ItemProcessor<'a, S, F> {
    pub store: &'a S,
    pub fetcher: &'a F,
    pub rules: &'a ScrapeRules,
    /// Bound on concurrent contributor-detail resolutions.
    pub concurrency: usize,
}

impl<'a, S, F> ItemProcessor<'a, S, F>
where
    S: CatalogStore,
    F: FetchDocument,
{
    #[instrument(level = "info", skip(self, entry), fields(rank = entry.rank, url = %entry.url))]
    pub async fn process(&self, entry: &ListingEntry) -> Result<ItemOutcome, IngestError> {
        let body = self.fetcher.fetch(&entry.url).await?;

        let title = {
            let doc = Html::parse_document(&body);
            extract::require_text(&doc, "title", &self.rules.title)?
        };

        // Idempotency check: an existing title is a skip, not an error.
        if self
            .store
            .find_media_item_by_title(&title)
            .await?
            .is_some()
        {
            info!(%title, "Already in catalog; skipping");
            return Ok(ItemOutcome::Skipped { title });
        }

        let fields = extract_item_fields(&body, &entry.url, self.rules)?;
        debug!(
            %title,
            directors = fields.directors.len(),
            cast = fields.cast.len(),
            genres = fields.genres.len(),
            "Extracted item fields"
        );

        let release_info_url = release_info_url(&entry.url, &self.rules.release_dates_path);
        let release_date = dates::normalize(
            &fields.raw_release_date,
            &release_info_url,
            self.fetcher,
            self.rules,
            &MONTHS,
        )
        .await?;

        let resolver = EntityResolver {
            store: self.store,
            fetcher: self.fetcher,
            rules: self.rules,
        };

        let mut language_ids = Vec::with_capacity(fields.languages.len());
        for name in &fields.languages {
            language_ids.push(resolver.resolve_language(name).await?);
        }
        let mut genre_ids = Vec::with_capacity(fields.genres.len());
        for name in &fields.genres {
            genre_ids.push(resolver.resolve_genre(name).await?);
        }

        // Contributor resolution is the request fan-out; each one is
        // independent, so run them through a bounded pool.
        let credits: Vec<(RoleKind, Credit)> = fields
            .directors
            .into_iter()
            .map(|c| (RoleKind::Director, c))
            .chain(fields.cast.into_iter().map(|c| (RoleKind::Actor, c)))
            .collect();

        let resolved: Vec<Result<(RoleKind, EntityId), IngestError>> = stream::iter(credits)
            .map(|(kind, credit)| {
                let resolver = &resolver;
                async move {
                    resolver
                        .resolve_contributor(kind, &credit.name, credit.url.as_deref())
                        .await
                        .map(|id| (kind, id))
                }
            })
            .buffer_unordered(self.concurrency.max(1))
            .collect()
            .await;

        let mut director_ids = Vec::new();
        let mut actor_ids = Vec::new();
        for result in resolved {
            match result? {
                (RoleKind::Director, id) => director_ids.push(id),
                (RoleKind::Actor, id) => actor_ids.push(id),
            }
        }

        let item = NewMediaItem {
            title: title.clone(),
            release_date,
            running_time_minutes: fields.running_time_minutes,
            summary: fields.summary,
            verified: true,
        };

        match self
            .store
            .create_media_item(item, &director_ids, &actor_ids, &language_ids, &genre_ids)
            .await
        {
            Ok(id) => {
                info!(%title, id, "Created media item");
                Ok(ItemOutcome::Created { id, title })
            }
            // Another run created the title between our check and create.
            Err(e) if e.is_conflict() => {
                info!(%title, "Title appeared concurrently; skipping");
                Ok(ItemOutcome::Skipped { title })
            }
            Err(e) => Err(e),
        }
    }
}

/// Extract every field the item needs from the detail page in one pass.
///
/// Runs synchronously over the parsed document and returns owned data, so
/// nothing borrows the document across later awaits.
fn extract_item_fields(
    body: &str,
    base_url: &str,
    rules: &ScrapeRules,
) -> Result<ItemFields, IngestError> {
    let doc = Html::parse_document(body);

    let languages: Vec<String> = extract::require_fragments(&doc, "languages", &rules.languages)?
        .iter()
        .map(|f| f.text())
        .unique()
        .collect();
    let genres: Vec<String> = extract::require_fragments(&doc, "genres", &rules.genres)?
        .iter()
        .map(|f| f.text())
        .unique()
        .collect();

    let raw_release_date = extract::require_text(&doc, "release_date", &rules.release_date)?;
    let running_time_text = extract::require_text(&doc, "running_time", &rules.running_time)?;
    let running_time_minutes = parse_running_time(&running_time_text)?;
    let summary = match extract::extract_text(&doc, &rules.summary)? {
        Extracted::Found(text) => text,
        Extracted::Missing => String::new(),
    };

    let directors = credits(
        extract::require_fragments(&doc, "directors", &rules.directors)?,
        base_url,
    );
    let cast = credits(
        extract::require_fragments(&doc, "cast", &rules.cast)?,
        base_url,
    );

    Ok(ItemFields {
        languages,
        raw_release_date,
        genres,
        running_time_minutes,
        summary,
        directors,
        cast,
    })
}

/// Turn credit fragments into de-duplicated named credits with resolved links.
fn credits(fragments: Vec<crate::extract::Fragment>, base_url: &str) -> Vec<Credit> {
    fragments
        .iter()
        .map(|f| Credit {
            name: f.text(),
            url: f.href().and_then(|href| absolutize(base_url, &href)),
        })
        .filter(|c| !c.name.is_empty())
        .unique_by(|c| c.name.clone())
        .collect()
}

/// Resolve a possibly-relative href against the page it came from.
fn absolutize(base_url: &str, href: &str) -> Option<String> {
    match Url::parse(base_url) {
        Ok(base) => base.join(href).ok().map(|u| u.to_string()),
        Err(_) => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

/// Build the secondary release-dates URL for a detail page.
fn release_info_url(detail_url: &str, path: &str) -> String {
    format!("{}/{}", detail_url.trim_end_matches('/'), path)
}

/// Parse a running time like "142 min" or "2h 22m" into minutes.
fn parse_running_time(text: &str) -> Result<u32, IngestError> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static HOURS_MINUTES: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)\s*h\s*(?:(\d+)\s*m)?").unwrap());
    static MINUTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

    if let Some(caps) = HOURS_MINUTES.captures(text) {
        let hours: u32 = caps[1].parse().unwrap_or(0);
        let minutes: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        return Ok(hours * 60 + minutes);
    }
    if let Some(caps) = MINUTES.captures(text) {
        if let Ok(minutes) = caps[1].parse() {
            return Ok(minutes);
        }
    }
    Err(IngestError::MissingField("running_time"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;
    use crate::store::MemoryStore;

    const BASE: &str = "https://example.com";

    /// Detail page matching the default primary selectors.
    fn detail_page(title: &str, date: &str) -> String {
        format!(
            r#"<html><body>
                <h1>{title}</h1>
                <span class="release-date">{date}</span>
                <time>142 min</time>
                <div class="summary_text">A film about examples.</div>
                <div class="genres"><a href="/genre/drama">Drama</a></div>
                <div class="languages"><a href="/lang/en">English</a></div>
                <div class="credit-directors"><a href="/name/dir1/">John Smith</a></div>
                <table class="cast_list">
                    <tr><td><a class="cast-name" href="/name/act1/">Jane Doe</a></td></tr>
                    <tr><td><a class="cast-name" href="/name/act2/">Sam Roe</a></td></tr>
                </table>
            </body></html>"#
        )
    }

    const PERSON_PAGE: &str = r#"
        <html><body>
            <div id="name-born-info"><time>March 2, 1970</time></div>
            <div class="filmo-row">Film A</div>
        </body></html>
    "#;

    fn fetcher_with_item(url_path: &str, title: &str) -> FakeFetcher {
        let mut fetcher = FakeFetcher::new();
        fetcher.add_page(
            &format!("{BASE}{url_path}"),
            &detail_page(title, "January 5, 2020"),
        );
        for person in ["/name/dir1/", "/name/act1/", "/name/act2/"] {
            fetcher.add_page(&format!("{BASE}{person}"), PERSON_PAGE);
        }
        fetcher
    }

    fn entry(url_path: &str, title: &str) -> ListingEntry {
        ListingEntry {
            rank: 1,
            title: title.to_string(),
            url: format!("{BASE}{url_path}"),
        }
    }

    #[tokio::test]
    async fn test_process_creates_fully_linked_item() {
        let store = MemoryStore::new();
        let fetcher = fetcher_with_item("/title/tt1/", "The Example");
        let rules = ScrapeRules::default();
        let processor = ItemProcessor {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
            concurrency: 4,
        };

        let outcome = processor.process(&entry("/title/tt1/", "The Example")).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Created { .. }));

        let record = store.media_item("The Example").await.unwrap();
        assert_eq!(record.release_date.to_string(), "2020-01-05");
        assert_eq!(record.running_time_minutes, 142);
        assert_eq!(record.director_ids.len(), 1);
        assert_eq!(record.actor_ids.len(), 2);
        assert_eq!(record.language_ids.len(), 1);
        assert_eq!(record.genre_ids.len(), 1);
        assert!(record.verified);
    }

    #[tokio::test]
    async fn test_existing_title_short_circuits_to_skip() {
        let store = MemoryStore::new();
        let fetcher = fetcher_with_item("/title/tt1/", "The Example");
        let rules = ScrapeRules::default();
        let processor = ItemProcessor {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
            concurrency: 4,
        };

        processor.process(&entry("/title/tt1/", "The Example")).await.unwrap();
        let requests_after_create = fetcher.requested().len();

        let outcome = processor.process(&entry("/title/tt1/", "The Example")).await.unwrap();
        assert!(matches!(outcome, ItemOutcome::Skipped { .. }));
        // the skip only re-fetched the detail page, nothing else
        assert_eq!(fetcher.requested().len(), requests_after_create + 1);
    }

    #[tokio::test]
    async fn test_resolution_failure_leaves_no_partial_item() {
        let store = MemoryStore::new();
        let mut fetcher = FakeFetcher::new();
        fetcher.add_page(
            &format!("{BASE}/title/tt1/"),
            &detail_page("The Example", "January 5, 2020"),
        );
        // director page present, actor pages missing -> resolution fails
        fetcher.add_page(&format!("{BASE}/name/dir1/"), PERSON_PAGE);

        let rules = ScrapeRules::default();
        let processor = ItemProcessor {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
            concurrency: 4,
        };

        let err = processor.process(&entry("/title/tt1/", "The Example")).await.unwrap_err();
        assert!(matches!(err, IngestError::Fetch { .. }));
        assert_eq!(store.media_item_count().await, 0);
    }

    #[tokio::test]
    async fn test_missing_genre_section_fails_item() {
        let store = MemoryStore::new();
        let page = detail_page("The Example", "January 5, 2020")
            .replace(r#"<div class="genres"><a href="/genre/drama">Drama</a></div>"#, "");
        let mut fetcher = FakeFetcher::new();
        fetcher.add_page(&format!("{BASE}/title/tt1/"), &page);

        let rules = ScrapeRules::default();
        let processor = ItemProcessor {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
            concurrency: 4,
        };

        let err = processor.process(&entry("/title/tt1/", "The Example")).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingField("genres")));
        assert_eq!(store.media_item_count().await, 0);
    }

    #[tokio::test]
    async fn test_ambiguous_date_uses_release_dates_page() {
        let store = MemoryStore::new();
        let mut fetcher = FakeFetcher::new();
        fetcher.add_page(
            &format!("{BASE}/title/tt1/"),
            &detail_page("The Example", "05.02.20"),
        );
        fetcher.add_page(
            &format!("{BASE}/title/tt1/releaseinfo"),
            r#"<table id="release_dates"><tr><td>Poland</td><td>5 February 2020</td></tr></table>"#,
        );
        for person in ["/name/dir1/", "/name/act1/", "/name/act2/"] {
            fetcher.add_page(&format!("{BASE}{person}"), PERSON_PAGE);
        }

        let rules = ScrapeRules::default();
        let processor = ItemProcessor {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
            concurrency: 4,
        };

        processor.process(&entry("/title/tt1/", "The Example")).await.unwrap();
        let record = store.media_item("The Example").await.unwrap();
        assert_eq!(record.release_date.to_string(), "2020-02-05");
    }

    #[test]
    fn test_parse_running_time() {
        assert_eq!(parse_running_time("142 min").unwrap(), 142);
        assert_eq!(parse_running_time("2h 22m").unwrap(), 142);
        assert_eq!(parse_running_time("2h").unwrap(), 120);
        assert!(parse_running_time("unknown").is_err());
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://example.com/title/tt1/", "/name/nm1/"),
            Some("https://example.com/name/nm1/".to_string())
        );
        assert_eq!(
            absolutize("https://example.com/title/tt1/", "https://other.org/p"),
            Some("https://other.org/p".to_string())
        );
    }
}
