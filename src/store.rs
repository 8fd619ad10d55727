//! The catalog store collaborator.
//!
//! The surrounding catalog application owns the real persistence; the
//! pipeline only needs the narrow surface in [`CatalogStore`]: natural-key
//! lookups plus insert-if-absent creates, with
//! `create_media_item` attaching all four association sets in one unit.
//!
//! Every `create_*` is atomic check-then-insert: a duplicate natural key
//! yields [`IngestError::Conflict`] with no read-then-write window, which is
//! what makes concurrent resolution of the same new contributor safe.
//!
//! [`MemoryStore`] is the crate's own implementation, with a JSON snapshot
//! so repeated CLI runs against the same catalog file converge instead of
//! duplicating.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::models::{
    Contributor, EntityId, MediaItemRecord, NamedRecord, NewContributor, NewMediaItem,
};

/// Lookup and insert-if-absent operations the pipeline needs.
pub trait CatalogStore {
    async fn find_media_item_by_title(&self, title: &str)
    -> Result<Option<EntityId>, IngestError>;
    async fn find_contributor_by_name(&self, name: &str)
    -> Result<Option<EntityId>, IngestError>;
    async fn find_language_by_name(&self, name: &str) -> Result<Option<EntityId>, IngestError>;
    async fn find_genre_by_name(&self, name: &str) -> Result<Option<EntityId>, IngestError>;

    /// Insert-if-absent by full name; `Conflict` when the key exists.
    async fn create_contributor(
        &self,
        contributor: NewContributor,
    ) -> Result<EntityId, IngestError>;
    async fn create_language(&self, name: &str) -> Result<EntityId, IngestError>;
    async fn create_genre(&self, name: &str) -> Result<EntityId, IngestError>;

    /// Persist a media item with all four association sets as one unit.
    async fn create_media_item(
        &self,
        item: NewMediaItem,
        director_ids: &[EntityId],
        actor_ids: &[EntityId],
        language_ids: &[EntityId],
        genre_ids: &[EntityId],
    ) -> Result<EntityId, IngestError>;
}

/// Snapshot of the whole catalog, keyed by natural key per kind.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    next_id: EntityId,
    media_items: HashMap<String, MediaItemRecord>,
    contributors: HashMap<String, Contributor>,
    languages: HashMap<String, NamedRecord>,
    genres: HashMap<String, NamedRecord>,
}

impl CatalogState {
    fn next_id(&mut self) -> EntityId {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded in-memory catalog with an optional JSON snapshot on disk.
///
/// All mutations happen under one lock, so each `create_*` is an atomic
/// check-then-insert and `create_media_item` is all-or-nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<CatalogState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot if one exists at `path`; start empty otherwise.
    pub async fn load(path: &Path) -> Result<Self, IngestError> {
        if !tokio::fs::try_exists(path).await? {
            info!(path = %path.display(), "No catalog snapshot; starting empty");
            return Ok(Self::new());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let state: CatalogState = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            media_items = state.media_items.len(),
            contributors = state.contributors.len(),
            "Loaded catalog snapshot"
        );
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Write the current catalog state to `path` as JSON.
    pub async fn save(&self, path: &Path) -> Result<(), IngestError> {
        let json = {
            let state = self.state.lock().await;
            serde_json::to_string_pretty(&*state)?
        };
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Wrote catalog snapshot");
        Ok(())
    }

    /// Media item count, for reporting and tests.
    pub async fn media_item_count(&self) -> usize {
        self.state.lock().await.media_items.len()
    }

    /// Contributor count, for reporting and tests.
    pub async fn contributor_count(&self) -> usize {
        self.state.lock().await.contributors.len()
    }

    /// Fetch a persisted media item by title.
    #[cfg(test)]
    pub async fn media_item(&self, title: &str) -> Option<MediaItemRecord> {
        self.state.lock().await.media_items.get(title).cloned()
    }

    /// Fetch a persisted contributor by full name.
    #[cfg(test)]
    pub async fn contributor(&self, name: &str) -> Option<Contributor> {
        self.state.lock().await.contributors.get(name).cloned()
    }
}

impl CatalogStore for MemoryStore {
    async fn find_media_item_by_title(
        &self,
        title: &str,
    ) -> Result<Option<EntityId>, IngestError> {
        Ok(self.state.lock().await.media_items.get(title).map(|m| m.id))
    }

    async fn find_contributor_by_name(
        &self,
        name: &str,
    ) -> Result<Option<EntityId>, IngestError> {
        Ok(self.state.lock().await.contributors.get(name).map(|c| c.id))
    }

    async fn find_language_by_name(&self, name: &str) -> Result<Option<EntityId>, IngestError> {
        Ok(self.state.lock().await.languages.get(name).map(|l| l.id))
    }

    async fn find_genre_by_name(&self, name: &str) -> Result<Option<EntityId>, IngestError> {
        Ok(self.state.lock().await.genres.get(name).map(|g| g.id))
    }

    async fn create_contributor(
        &self,
        contributor: NewContributor,
    ) -> Result<EntityId, IngestError> {
        let mut state = self.state.lock().await;
        if state.contributors.contains_key(&contributor.full_name) {
            return Err(IngestError::Conflict {
                kind: "contributor",
                key: contributor.full_name,
            });
        }
        let id = state.next_id();
        debug!(id, name = %contributor.full_name, "Created contributor");
        state.contributors.insert(
            contributor.full_name.clone(),
            Contributor {
                id,
                full_name: contributor.full_name,
                date_of_birth: contributor.date_of_birth,
                date_of_death: contributor.date_of_death,
                role: contributor.role,
                verified: contributor.verified,
            },
        );
        Ok(id)
    }

    async fn create_language(&self, name: &str) -> Result<EntityId, IngestError> {
        let mut state = self.state.lock().await;
        if state.languages.contains_key(name) {
            return Err(IngestError::Conflict {
                kind: "language",
                key: name.to_string(),
            });
        }
        let id = state.next_id();
        state.languages.insert(
            name.to_string(),
            NamedRecord {
                id,
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_genre(&self, name: &str) -> Result<EntityId, IngestError> {
        let mut state = self.state.lock().await;
        if state.genres.contains_key(name) {
            return Err(IngestError::Conflict {
                kind: "genre",
                key: name.to_string(),
            });
        }
        let id = state.next_id();
        state.genres.insert(
            name.to_string(),
            NamedRecord {
                id,
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_media_item(
        &self,
        item: NewMediaItem,
        director_ids: &[EntityId],
        actor_ids: &[EntityId],
        language_ids: &[EntityId],
        genre_ids: &[EntityId],
    ) -> Result<EntityId, IngestError> {
        let mut state = self.state.lock().await;
        if state.media_items.contains_key(&item.title) {
            return Err(IngestError::Conflict {
                kind: "media item",
                key: item.title,
            });
        }
        let id = state.next_id();
        debug!(id, title = %item.title, "Created media item");
        state.media_items.insert(
            item.title.clone(),
            MediaItemRecord {
                id,
                title: item.title,
                release_date: item.release_date,
                running_time_minutes: item.running_time_minutes,
                summary: item.summary,
                verified: item.verified,
                director_ids: director_ids.to_vec(),
                actor_ids: actor_ids.to_vec(),
                language_ids: language_ids.to_vec(),
                genre_ids: genre_ids.to_vec(),
            },
        );
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::NaiveDate;

    fn contributor(name: &str) -> NewContributor {
        NewContributor {
            full_name: name.to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1970, 3, 2),
            date_of_death: None,
            role: Role::Actor {
                specialisation: "Acting".to_string(),
            },
            verified: true,
        }
    }

    fn media_item(title: &str) -> NewMediaItem {
        NewMediaItem {
            title: title.to_string(),
            release_date: NaiveDate::from_ymd_opt(2020, 1, 5).unwrap(),
            running_time_minutes: 120,
            summary: "Summary".to_string(),
            verified: true,
        }
    }

    #[tokio::test]
    async fn test_create_then_find_contributor() {
        let store = MemoryStore::new();
        let id = store.create_contributor(contributor("Jane Doe")).await.unwrap();
        assert_eq!(
            store.find_contributor_by_name("Jane Doe").await.unwrap(),
            Some(id)
        );
        assert_eq!(store.find_contributor_by_name("Nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_conflict() {
        let store = MemoryStore::new();
        store.create_contributor(contributor("Jane Doe")).await.unwrap();
        let err = store
            .create_contributor(contributor("Jane Doe"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.contributor_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_title_is_conflict() {
        let store = MemoryStore::new();
        store
            .create_media_item(media_item("The Example"), &[], &[], &[], &[])
            .await
            .unwrap();
        let err = store
            .create_media_item(media_item("The Example"), &[], &[], &[], &[])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.media_item_count().await, 1);
    }

    #[tokio::test]
    async fn test_media_item_keeps_association_sets() {
        let store = MemoryStore::new();
        let lang = store.create_language("English").await.unwrap();
        let genre = store.create_genre("Drama").await.unwrap();
        store
            .create_media_item(media_item("The Example"), &[1], &[2, 3], &[lang], &[genre])
            .await
            .unwrap();

        let record = store.media_item("The Example").await.unwrap();
        assert_eq!(record.director_ids, vec![1]);
        assert_eq!(record.actor_ids, vec![2, 3]);
        assert_eq!(record.language_ids, vec![lang]);
        assert_eq!(record.genre_ids, vec![genre]);
        assert!(record.verified);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = std::env::temp_dir().join("catalog_ingest_store_test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("catalog.json");

        let store = MemoryStore::new();
        store.create_language("English").await.unwrap();
        store
            .create_media_item(media_item("The Example"), &[], &[], &[], &[])
            .await
            .unwrap();
        store.save(&path).await.unwrap();

        let reloaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.media_item_count().await, 1);
        assert!(
            reloaded
                .find_language_by_name("English")
                .await
                .unwrap()
                .is_some()
        );

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_create_same_key_yields_one_record() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_contributor(contributor("Jane Doe")).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create_contributor(contributor("Jane Doe")).await })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a.is_ok() != b.is_ok());
        assert_eq!(store.contributor_count().await, 1);
    }
}
