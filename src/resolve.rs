//! Entity resolution: raw name strings to stable store identifiers.
//!
//! Every resolution is lookup-by-natural-key first, create on miss.
//! First write wins: a hit returns the existing identifier and never
//! overwrites fields, within or across runs.
//!
//! Contributors are the expensive case. A miss triggers a fetch of the
//! contributor's own detail page to pick up date of birth, date of death,
//! and the role-specific attribute before creating the record; languages
//! and genres are created straight from the name.
//!
//! Because distinct contributors within one item resolve concurrently, two
//! callers can race on the same new natural key. The store's insert-if-absent
//! create turns that race into a [`Conflict`](crate::error::IngestError::Conflict),
//! which is recovered here by re-querying the key and using the winner's
//! identifier; it never escapes this module.

use scraper::Html;
use tracing::{debug, instrument};

use crate::dates::{self, MONTHS};
use crate::error::IngestError;
use crate::extract;
use crate::fetch::FetchDocument;
use crate::models::{EntityId, NewContributor, Role, RoleKind};
use crate::rules::ScrapeRules;
use crate::store::CatalogStore;

/// Resolves contributors, languages, and genres against the catalog store.
pub struct EntityResolver<'a, S, F> {
    pub store: &'a S,
    pub fetcher: &'a F,
    pub rules: &'a ScrapeRules,
}

impl<'a, S, F> EntityResolver<'a, S, F>
where
    S: CatalogStore,
    F: FetchDocument,
{
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_language(&self, name: &str) -> Result<EntityId, IngestError> {
        if let Some(id) = self.store.find_language_by_name(name).await? {
            return Ok(id);
        }
        match self.store.create_language(name).await {
            Ok(id) => Ok(id),
            Err(e) if e.is_conflict() => self.refind_language(name).await,
            Err(e) => Err(e),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_genre(&self, name: &str) -> Result<EntityId, IngestError> {
        if let Some(id) = self.store.find_genre_by_name(name).await? {
            return Ok(id);
        }
        match self.store.create_genre(name).await {
            Ok(id) => Ok(id),
            Err(e) if e.is_conflict() => self.refind_genre(name).await,
            Err(e) => Err(e),
        }
    }

    /// Resolve a contributor by full name, fetching their detail page on a
    /// miss to populate dates and the role attribute.
    #[instrument(level = "debug", skip(self, detail_url))]
    pub async fn resolve_contributor(
        &self,
        kind: RoleKind,
        name: &str,
        detail_url: Option<&str>,
    ) -> Result<EntityId, IngestError> {
        if let Some(id) = self.store.find_contributor_by_name(name).await? {
            debug!(%name, id, "Contributor already known");
            return Ok(id);
        }

        let contributor = self.fetch_contributor(kind, name, detail_url).await?;
        match self.store.create_contributor(contributor).await {
            Ok(id) => Ok(id),
            // Lost the create race; the winner's record stands.
            Err(e) if e.is_conflict() => self.refind_contributor(name).await,
            Err(e) => Err(e),
        }
    }

    /// Build a contributor record from their detail page.
    ///
    /// Pure with respect to the store: `(name, url) -> record`. Missing birth
    /// or death sections yield absent dates, not errors.
    async fn fetch_contributor(
        &self,
        kind: RoleKind,
        name: &str,
        detail_url: Option<&str>,
    ) -> Result<NewContributor, IngestError> {
        let Some(url) = detail_url else {
            // No link in the credits markup; record the name alone.
            return Ok(NewContributor {
                full_name: name.to_string(),
                date_of_birth: None,
                date_of_death: None,
                role: default_role(kind),
                verified: true,
            });
        };

        let body = self.fetcher.fetch(url).await?;
        let (birth, death, role) = {
            let doc = Html::parse_document(&body);
            let birth = extract::extract_text(&doc, &self.rules.contributor_birth)?;
            let death = extract::extract_text(&doc, &self.rules.contributor_death)?;
            let role = match kind {
                RoleKind::Actor => Role::Actor {
                    specialisation: extract::extract_text(
                        &doc,
                        &self.rules.contributor_specialisation,
                    )?
                    .unwrap_or("Acting"),
                },
                RoleKind::Director => Role::Director {
                    film_count: extract::extract_fragments(&doc, &self.rules.contributor_films)?
                        .len() as u32,
                },
            };
            (birth, death, role)
        };

        Ok(NewContributor {
            full_name: name.to_string(),
            date_of_birth: dates::normalize_optional(birth, &MONTHS),
            date_of_death: dates::normalize_optional(death, &MONTHS),
            role,
            verified: true,
        })
    }

    async fn refind_contributor(&self, name: &str) -> Result<EntityId, IngestError> {
        self.store
            .find_contributor_by_name(name)
            .await?
            .ok_or_else(|| IngestError::Store(format!("contributor `{name}` vanished after conflict")))
    }

    async fn refind_language(&self, name: &str) -> Result<EntityId, IngestError> {
        self.store
            .find_language_by_name(name)
            .await?
            .ok_or_else(|| IngestError::Store(format!("language `{name}` vanished after conflict")))
    }

    async fn refind_genre(&self, name: &str) -> Result<EntityId, IngestError> {
        self.store
            .find_genre_by_name(name)
            .await?
            .ok_or_else(|| IngestError::Store(format!("genre `{name}` vanished after conflict")))
    }
}

fn default_role(kind: RoleKind) -> Role {
    match kind {
        RoleKind::Actor => Role::Actor {
            specialisation: "Acting".to_string(),
        },
        RoleKind::Director => Role::Director { film_count: 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;
    use crate::store::MemoryStore;

    const PERSON_PAGE: &str = r#"
        <html><body>
            <div id="name-born-info"><time>March 2, 1970</time></div>
            <div class="name-job-categories"><a>Stage and screen</a></div>
            <div class="filmo-row">Film A</div>
            <div class="filmo-row">Film B</div>
        </body></html>
    "#;

    fn rules() -> ScrapeRules {
        ScrapeRules::default()
    }

    #[tokio::test]
    async fn test_language_created_once_then_reused() {
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new();
        let rules = rules();
        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };

        let first = resolver.resolve_language("English").await.unwrap();
        let second = resolver.resolve_language("English").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_contributor_miss_fetches_detail_page() {
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new().page("https://example.com/name/1/", PERSON_PAGE);
        let rules = rules();
        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };

        let id = resolver
            .resolve_contributor(RoleKind::Actor, "Jane Doe", Some("https://example.com/name/1/"))
            .await
            .unwrap();

        let record = store.contributor("Jane Doe").await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.date_of_birth.unwrap().to_string(), "1970-03-02");
        assert!(record.date_of_death.is_none());
        assert_eq!(
            record.role,
            Role::Actor {
                specialisation: "Stage and screen".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_contributor_hit_skips_detail_fetch() {
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new().page("https://example.com/name/1/", PERSON_PAGE);
        let rules = rules();
        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };

        let first = resolver
            .resolve_contributor(RoleKind::Actor, "Jane Doe", Some("https://example.com/name/1/"))
            .await
            .unwrap();
        let second = resolver
            .resolve_contributor(RoleKind::Actor, "Jane Doe", Some("https://example.com/name/1/"))
            .await
            .unwrap();

        assert_eq!(first, second);
        // only the first resolution touched the network
        assert_eq!(fetcher.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_director_film_count_from_filmography_rows() {
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new().page("https://example.com/name/2/", PERSON_PAGE);
        let rules = rules();
        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };

        resolver
            .resolve_contributor(
                RoleKind::Director,
                "John Smith",
                Some("https://example.com/name/2/"),
            )
            .await
            .unwrap();

        let record = store.contributor("John Smith").await.unwrap();
        assert_eq!(record.role, Role::Director { film_count: 2 });
    }

    #[tokio::test]
    async fn test_unlinked_contributor_gets_name_only_record() {
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new();
        let rules = rules();
        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };

        resolver
            .resolve_contributor(RoleKind::Actor, "Jane Doe", None)
            .await
            .unwrap();

        let record = store.contributor("Jane Doe").await.unwrap();
        assert!(record.date_of_birth.is_none());
        assert!(fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_recovered_by_requery() {
        // Pre-create the record to force the create path into a conflict.
        let store = MemoryStore::new();
        let fetcher = FakeFetcher::new();
        let rules = rules();

        let existing = store
            .create_language("English")
            .await
            .unwrap();

        // A resolver that skipped its lookup would now conflict; simulate the
        // race by calling create directly and recovering like the resolver.
        let err = store.create_language("English").await.unwrap_err();
        assert!(err.is_conflict());

        let resolver = EntityResolver {
            store: &store,
            fetcher: &fetcher,
            rules: &rules,
        };
        let resolved = resolver.resolve_language("English").await.unwrap();
        assert_eq!(resolved, existing);
    }
}
