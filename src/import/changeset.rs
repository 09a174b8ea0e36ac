//! Before/after change tracking for one degree record across an import run.
//!
//! A changeset snapshots a record's core fields, taxonomy memberships, and
//! metadata before and after it is updated, then reports a structured diff
//! and a printable changelog. Diffs are only meaningful once both snapshots
//! are captured.

use crate::store::{meta, DegreeStore, RecordId, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Values longer than this are truncated in the changelog.
const CHANGELOG_VALUE_MAX: usize = 60;

/// A point-in-time capture of one record's comparable data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Core record fields (volatile timestamps excluded).
    pub fields: BTreeMap<String, String>,
    /// Term names per taxonomy.
    pub terms: BTreeMap<String, Vec<String>>,
    /// Metadata, minus keys considered private by convention (leading `_`).
    pub meta: BTreeMap<String, String>,
}

/// An old/new field value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub old: String,
    pub new: String,
}

/// Structured differences between a record's old and new snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesetDiff {
    pub fields_updated: BTreeMap<String, FieldChange>,
    pub terms_added: BTreeMap<String, Vec<String>>,
    pub terms_removed: BTreeMap<String, Vec<String>>,
    pub meta_added: BTreeMap<String, String>,
    pub meta_updated: BTreeMap<String, FieldChange>,
}

impl ChangesetDiff {
    pub fn is_empty(&self) -> bool {
        self.fields_updated.is_empty()
            && self.terms_added.is_empty()
            && self.terms_removed.is_empty()
            && self.meta_added.is_empty()
            && self.meta_updated.is_empty()
    }
}

/// Tracks changes between an existing record's data and imported updates.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    record_id: RecordId,
    degree_id: String,
    old: Option<Snapshot>,
    new: Option<Snapshot>,
}

impl Changeset {
    /// Creates a changeset with the record's current data as the old side.
    pub fn with_old(store: &dyn DegreeStore, id: RecordId) -> Result<Self, StoreError> {
        let mut changeset = Self {
            record_id: id,
            ..Self::default()
        };
        changeset.capture_old(store)?;
        Ok(changeset)
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn degree_id(&self) -> &str {
        &self.degree_id
    }

    /// Snapshots the record's current data as the old side.
    pub fn capture_old(&mut self, store: &dyn DegreeStore) -> Result<(), StoreError> {
        let snapshot = snapshot(store, self.record_id)?;
        self.remember_degree_id(&snapshot);
        self.old = Some(snapshot);
        Ok(())
    }

    /// Snapshots the record's current data as the new side.
    pub fn capture_new(&mut self, store: &dyn DegreeStore) -> Result<(), StoreError> {
        let snapshot = snapshot(store, self.record_id)?;
        self.remember_degree_id(&snapshot);
        self.new = Some(snapshot);
        Ok(())
    }

    fn remember_degree_id(&mut self, snapshot: &Snapshot) {
        if self.degree_id.is_empty() {
            if let Some(id) = snapshot.meta.get(meta::DEGREE_ID) {
                self.degree_id = id.clone();
            }
        }
    }

    /// Computes the structured diff, or `None` until both snapshots are set.
    pub fn diff(&self) -> Option<ChangesetDiff> {
        let old = self.old.as_ref()?;
        let new = self.new.as_ref()?;
        let mut diff = ChangesetDiff::default();

        // Field-by-field inequality over fields present in both snapshots.
        for (key, new_value) in &new.fields {
            if let Some(old_value) = old.fields.get(key) {
                if old_value != new_value {
                    diff.fields_updated.insert(
                        key.clone(),
                        FieldChange {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
            }
        }

        // Per-taxonomy set difference.
        let taxonomies: BTreeSet<&String> = old.terms.keys().chain(new.terms.keys()).collect();
        for taxonomy in taxonomies {
            let old_terms: BTreeSet<&String> =
                old.terms.get(taxonomy).into_iter().flatten().collect();
            let new_terms: BTreeSet<&String> =
                new.terms.get(taxonomy).into_iter().flatten().collect();

            let added: Vec<String> = new_terms
                .difference(&old_terms)
                .map(|s| (*s).clone())
                .collect();
            let removed: Vec<String> = old_terms
                .difference(&new_terms)
                .map(|s| (*s).clone())
                .collect();

            if !added.is_empty() {
                diff.terms_added.insert(taxonomy.clone(), added);
            }
            if !removed.is_empty() {
                diff.terms_removed.insert(taxonomy.clone(), removed);
            }
        }

        // Meta additions and updates; removals are not surfaced.
        for (key, new_value) in &new.meta {
            match old.meta.get(key) {
                None => {
                    diff.meta_added.insert(key.clone(), new_value.clone());
                }
                Some(old_value) if old_value.is_empty() && !new_value.is_empty() => {
                    diff.meta_added.insert(key.clone(), new_value.clone());
                }
                Some(old_value) if old_value != new_value => {
                    diff.meta_updated.insert(
                        key.clone(),
                        FieldChange {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        Some(diff)
    }

    /// Whether any field, term, or meta data differs between the snapshots.
    pub fn has_changes(&self) -> bool {
        self.diff().is_some_and(|diff| !diff.is_empty())
    }

    /// Renders a printable changelog of all updates, or an empty string when
    /// there is nothing to report.
    pub fn changelog(&self) -> String {
        let Some(diff) = self.diff() else {
            return String::new();
        };
        if diff.is_empty() {
            return String::new();
        }

        let title = self
            .new
            .as_ref()
            .and_then(|s| s.fields.get("title"))
            .or_else(|| self.old.as_ref().and_then(|s| s.fields.get("title")))
            .cloned()
            .unwrap_or_default();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "\"{}\" (ID \"{}\" | Record {}):",
            title, self.degree_id, self.record_id
        );

        for (field, change) in &diff.fields_updated {
            let _ = writeln!(
                out,
                "-- Updated {}: \"{}\" ==> \"{}\"",
                field,
                truncate(&change.old),
                truncate(&change.new)
            );
        }
        for (taxonomy, names) in &diff.terms_added {
            let _ = writeln!(out, "-- Added {} terms: ({})", taxonomy, names.join(", "));
        }
        for (taxonomy, names) in &diff.terms_removed {
            let _ = writeln!(out, "-- Removed {} terms: ({})", taxonomy, names.join(", "));
        }
        for (key, value) in &diff.meta_added {
            let _ = writeln!(out, "-- Added meta {}: \"{}\"", key, truncate(value));
        }
        for (key, change) in &diff.meta_updated {
            let _ = writeln!(
                out,
                "-- Updated meta {}: \"{}\" ==> \"{}\"",
                key,
                truncate(&change.old),
                truncate(&change.new)
            );
        }

        out.push('\n');
        out
    }
}

/// Captures a record's comparable data from the store.
fn snapshot(store: &dyn DegreeStore, id: RecordId) -> Result<Snapshot, StoreError> {
    let record = store.get(id)?.ok_or(StoreError::NotFound(id))?;

    let mut fields = BTreeMap::new();
    fields.insert("title".to_string(), record.title);
    fields.insert("slug".to_string(), record.slug);
    fields.insert("status".to_string(), record.status.as_str().to_string());
    fields.insert("parent".to_string(), record.parent_id.to_string());

    let mut terms = BTreeMap::new();
    for taxonomy in store.taxonomies(id)? {
        let mut names = store.get_terms(id, &taxonomy)?;
        names.sort();
        terms.insert(taxonomy, names);
    }

    let meta = store
        .all_meta(id)?
        .into_iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .collect();

    Ok(Snapshot {
        fields,
        terms,
        meta,
    })
}

fn truncate(value: &str) -> String {
    if value.chars().count() > CHANGELOG_VALUE_MAX {
        let head: String = value.chars().take(CHANGELOG_VALUE_MAX).collect();
        format!("{}[...]", head)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DegreeStore, MemoryStore, NewRecord, RecordPatch, RecordStatus};
    use chrono::NaiveDate;

    fn seed_record(store: &MemoryStore) -> RecordId {
        store
            .create(NewRecord {
                title: "A".to_string(),
                slug: "a".to_string(),
                status: RecordStatus::Published,
                parent_id: 0,
                created: NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            })
            .unwrap()
    }

    #[test]
    fn test_diff_reports_title_and_term_additions() {
        let store = MemoryStore::new();
        let id = seed_record(&store);
        store.set_terms(id, "colleges", &["X".to_string()]).unwrap();

        let mut changeset = Changeset::with_old(&store, id).unwrap();

        store
            .update(
                id,
                &RecordPatch {
                    title: Some("B".to_string()),
                    parent_id: None,
                },
            )
            .unwrap();
        store
            .set_terms(id, "colleges", &["X".to_string(), "Y".to_string()])
            .unwrap();
        changeset.capture_new(&store).unwrap();

        let diff = changeset.diff().unwrap();
        assert_eq!(
            diff.fields_updated.get("title"),
            Some(&FieldChange {
                old: "A".to_string(),
                new: "B".to_string()
            })
        );
        assert_eq!(diff.terms_added.get("colleges").unwrap(), &vec!["Y".to_string()]);
        assert!(diff.terms_removed.is_empty());
        assert!(changeset.has_changes());
    }

    #[test]
    fn test_diff_requires_both_snapshots() {
        let store = MemoryStore::new();
        let id = seed_record(&store);
        let changeset = Changeset::with_old(&store, id).unwrap();
        assert!(changeset.diff().is_none());
        assert!(!changeset.has_changes());
    }

    #[test]
    fn test_no_changes_when_nothing_moved() {
        let store = MemoryStore::new();
        let id = seed_record(&store);
        store.set_meta(id, "degree_id", "A ").unwrap();

        let mut changeset = Changeset::with_old(&store, id).unwrap();
        changeset.capture_new(&store).unwrap();
        assert!(!changeset.has_changes());
        assert_eq!(changeset.changelog(), "");
        assert_eq!(changeset.degree_id(), "A ");
    }

    #[test]
    fn test_meta_added_and_updated_but_never_removed() {
        let store = MemoryStore::new();
        let id = seed_record(&store);
        store.set_meta(id, "degree_online", "false").unwrap();
        store.set_meta(id, "degree_catalog_url", "").unwrap();
        store.set_meta(id, "stale_key", "x").unwrap();
        store.set_meta(id, "_private", "hidden").unwrap();

        let mut changeset = Changeset::with_old(&store, id).unwrap();

        store.set_meta(id, "degree_online", "true").unwrap();
        store.set_meta(id, "degree_catalog_url", "https://catalog").unwrap();
        store.set_meta(id, "degree_name_short", "A").unwrap();
        changeset.capture_new(&store).unwrap();

        let diff = changeset.diff().unwrap();
        assert_eq!(
            diff.meta_updated.get("degree_online").unwrap().new,
            "true"
        );
        // Empty-to-value counts as an addition, as does a brand new key.
        assert!(diff.meta_added.contains_key("degree_catalog_url"));
        assert!(diff.meta_added.contains_key("degree_name_short"));
        // Keys that vanish, and private keys, are not surfaced at all.
        assert!(!diff.meta_added.contains_key("stale_key"));
        assert!(!diff.meta_updated.contains_key("stale_key"));
        assert!(!diff.meta_added.contains_key("_private"));
    }

    #[test]
    fn test_changelog_truncates_long_values() {
        let store = MemoryStore::new();
        let id = seed_record(&store);
        let mut changeset = Changeset::with_old(&store, id).unwrap();

        let long = "x".repeat(80);
        store.set_meta(id, "degree_catalog_url", &long).unwrap();
        changeset.capture_new(&store).unwrap();

        let log = changeset.changelog();
        assert!(log.contains("[...]"));
        assert!(log.contains(&"x".repeat(60)));
        assert!(!log.contains(&"x".repeat(61)));
    }
}
