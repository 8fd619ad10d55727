//! Data models for catalog entities and listing entries.
//!
//! This module defines the records the pipeline reads from and writes to the
//! catalog store:
//! - [`ListingEntry`]: one ranked row of the remote listing page
//! - [`NewMediaItem`] / [`MediaItemRecord`]: a media item before and after
//!   the store assigns it an identifier and its association sets
//! - [`NewContributor`] / [`Contributor`]: a person with a role-specific
//!   attribute, deduplicated by full name
//! - [`NamedRecord`]: languages and genres, which carry only a name
//!
//! Natural keys (media item title, contributor full name, language/genre
//! name) drive deduplication; store-assigned [`EntityId`]s are surrogates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Store-assigned surrogate identifier.
pub type EntityId = u64;

/// One ranked, title-linked row of the remote listing page.
#[derive(Debug, Clone)]
pub struct ListingEntry {
    /// 1-based position in the ranked listing.
    pub rank: usize,
    /// Link text; the authoritative title comes from the detail page.
    pub title: String,
    /// Absolute URL of the detail page.
    pub url: String,
}

/// A media item as assembled by the pipeline, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewMediaItem {
    pub title: String,
    pub release_date: NaiveDate,
    pub running_time_minutes: u32,
    pub summary: String,
    /// Always true for machine-ingested records.
    pub verified: bool,
}

/// A persisted media item with its four association sets attached.
///
/// Created in one store call and never updated by the pipeline afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaItemRecord {
    pub id: EntityId,
    pub title: String,
    pub release_date: NaiveDate,
    pub running_time_minutes: u32,
    pub summary: String,
    pub verified: bool,
    pub director_ids: Vec<EntityId>,
    pub actor_ids: Vec<EntityId>,
    pub language_ids: Vec<EntityId>,
    pub genre_ids: Vec<EntityId>,
}

/// Which credit list a contributor was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleKind {
    Actor,
    Director,
}

/// Role-specific attribute carried by a contributor record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Actor { specialisation: String },
    Director { film_count: u32 },
}

/// A contributor before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewContributor {
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub role: Role,
    pub verified: bool,
}

/// A persisted contributor. First write wins; later runs never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: EntityId,
    pub full_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub role: Role,
    pub verified: bool,
}

/// A language or genre: a natural-key name and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedRecord {
    pub id: EntityId,
    pub name: String,
}
