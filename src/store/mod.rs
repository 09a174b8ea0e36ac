//! Local degree record store capability.
//!
//! The import pipeline treats persistence as an injected capability: a
//! generic record store with query-by-metadata, hierarchical taxonomy terms,
//! and per-record metadata. [`SqliteStore`] is the persistent backend;
//! [`MemoryStore`] backs tests and dry runs.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use thiserror::Error;

pub type RecordId = u64;
pub type TermId = u64;

/// Well-known metadata keys attached to imported degree records.
pub mod meta {
    pub const DEGREE_ID: &str = "degree_id";
    pub const API_ID: &str = "degree_api_id";
    pub const ONLINE: &str = "degree_online";
    pub const CATALOG_URL: &str = "degree_catalog_url";
    pub const PLAN_CODE: &str = "degree_plan_code";
    pub const SUBPLAN_CODE: &str = "degree_subplan_code";
    pub const NAME_SHORT: &str = "degree_name_short";
    pub const DESCRIPTION: &str = "degree_description";
    /// Set to "on" by catalog editors to shield a record from the importer.
    pub const IMPORT_IGNORE: &str = "degree_import_ignore";
}

/// Taxonomies a degree record is classified under.
pub mod taxonomy {
    pub const PROGRAM_TYPES: &str = "program_types";
    pub const COLLEGES: &str = "colleges";
    pub const DEPARTMENTS: &str = "departments";
}

/// Errors raised by record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("database error: {0}")]
    Database(String),
}

/// Publication status of a degree record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Draft,
    Published,
    Trashed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Draft => "draft",
            RecordStatus::Published => "published",
            RecordStatus::Trashed => "trashed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(RecordStatus::Draft),
            "published" => Some(RecordStatus::Published),
            "trashed" => Some(RecordStatus::Trashed),
            _ => None,
        }
    }

    /// True for statuses the importer matches against (trash excluded).
    pub fn is_live(&self) -> bool {
        matches!(self, RecordStatus::Draft | RecordStatus::Published)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted degree record's core fields.
///
/// Term assignments and metadata are reached through the store's term/meta
/// operations rather than carried on the struct.
#[derive(Debug, Clone)]
pub struct DegreeRecord {
    pub id: RecordId,
    pub title: String,
    pub slug: String,
    pub status: RecordStatus,
    /// Record id of the parent plan; 0 for top-level records.
    pub parent_id: RecordId,
    pub created: NaiveDateTime,
}

/// Fields for creating a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub title: String,
    pub slug: String,
    pub status: RecordStatus,
    pub parent_id: RecordId,
    pub created: NaiveDateTime,
}

/// Partial update of a record's core fields. Unset fields are preserved, so
/// an import update never touches slug, status, or creation date.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub parent_id: Option<RecordId>,
}

/// Attribute query over imported degree records.
///
/// Matches only records carrying a non-empty plan code, i.e. records this
/// importer created.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub statuses: Vec<RecordStatus>,
    /// Some(true) restricts to subplans (non-empty subplan code meta),
    /// Some(false) to plans, None to both.
    pub has_subplan: Option<bool>,
    /// When false, records flagged with [`meta::IMPORT_IGNORE`] are omitted.
    pub include_ignored: bool,
}

impl RecordQuery {
    /// Published top-level plan records eligible for stale removal.
    pub fn published_plans() -> Self {
        Self {
            statuses: vec![RecordStatus::Published],
            has_subplan: Some(false),
            include_ignored: false,
        }
    }

    /// Published subplan records eligible for stale removal.
    pub fn published_subplans() -> Self {
        Self {
            statuses: vec![RecordStatus::Published],
            has_subplan: Some(true),
            include_ignored: false,
        }
    }

    /// All live imported records, for the run summary's independent total.
    pub fn totals() -> Self {
        Self {
            statuses: vec![RecordStatus::Draft, RecordStatus::Published],
            has_subplan: None,
            include_ignored: false,
        }
    }
}

/// Create/update/delete/query capability over the local record store.
///
/// `find_by_meta` may return multiple ids; callers expect zero or one and
/// treat ambiguity as a data-integrity warning, not an error.
pub trait DegreeStore {
    fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<RecordId>, StoreError>;

    fn get(&self, id: RecordId) -> Result<Option<DegreeRecord>, StoreError>;

    fn create(&self, record: NewRecord) -> Result<RecordId, StoreError>;

    fn update(&self, id: RecordId, patch: &RecordPatch) -> Result<(), StoreError>;

    fn publish(&self, id: RecordId) -> Result<(), StoreError>;

    /// Removes a record outright (`hard`) or moves it to the trash.
    fn delete(&self, id: RecordId, hard: bool) -> Result<(), StoreError>;

    /// Replaces the record's term assignments for one taxonomy. Terms that
    /// do not exist yet are created uncategorized.
    fn set_terms(&self, id: RecordId, taxonomy: &str, names: &[String])
        -> Result<(), StoreError>;

    fn get_terms(&self, id: RecordId, taxonomy: &str) -> Result<Vec<String>, StoreError>;

    /// Taxonomies the record has at least one term in.
    fn taxonomies(&self, id: RecordId) -> Result<Vec<String>, StoreError>;

    fn set_meta(&self, id: RecordId, key: &str, value: &str) -> Result<(), StoreError>;

    fn get_meta(&self, id: RecordId, key: &str) -> Result<Option<String>, StoreError>;

    fn all_meta(&self, id: RecordId) -> Result<BTreeMap<String, String>, StoreError>;

    fn find_term(&self, taxonomy: &str, name: &str) -> Result<Option<TermId>, StoreError>;

    fn insert_term(
        &self,
        taxonomy: &str,
        name: &str,
        parent: Option<TermId>,
        slug: Option<&str>,
    ) -> Result<TermId, StoreError>;

    fn set_term_meta(&self, term_id: TermId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Drops any cached parent/child index for a taxonomy. Called after the
    /// importer seeds new hierarchical terms; stores with no such cache
    /// treat this as a no-op.
    fn flush_term_hierarchy(&self, taxonomy: &str) -> Result<(), StoreError>;

    fn degree_ids(&self, query: &RecordQuery) -> Result<Vec<RecordId>, StoreError>;

    /// Whether catalog editors have shielded this record from the importer.
    fn import_ignored(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.get_meta(id, meta::IMPORT_IGNORE)?.as_deref() == Some("on"))
    }

    /// Live imported record count, recomputed from the store itself.
    fn count_degrees(&self) -> Result<u64, StoreError> {
        Ok(self.degree_ids(&RecordQuery::totals())?.len() as u64)
    }
}

/// Fallback slug for terms created without an explicit one.
pub(crate) fn default_term_slug(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}
