//! In-memory record store.
//!
//! Backs unit and integration tests; behaves like the sqlite store for every
//! operation the importer performs.

use super::{
    default_term_slug, meta, DegreeRecord, DegreeStore, NewRecord, RecordId, RecordPatch,
    RecordQuery, StoreError, TermId,
};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct TermEntry {
    id: TermId,
    taxonomy: String,
    name: String,
    #[allow(dead_code)]
    slug: String,
    #[allow(dead_code)]
    parent: Option<TermId>,
}

#[derive(Default)]
struct Inner {
    next_record_id: RecordId,
    next_term_id: TermId,
    records: BTreeMap<RecordId, DegreeRecord>,
    record_meta: BTreeMap<RecordId, BTreeMap<String, String>>,
    /// record -> taxonomy -> assigned term names
    record_terms: BTreeMap<RecordId, BTreeMap<String, Vec<String>>>,
    terms: Vec<TermEntry>,
    term_meta: BTreeMap<TermId, BTreeMap<String, String>>,
    hierarchy_flushes: u64,
}

/// A [`DegreeStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the term hierarchy cache was flushed. Used by tests
    /// asserting the seeding contract.
    pub fn hierarchy_flushes(&self) -> u64 {
        self.lock().hierarchy_flushes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store poisoned")
    }
}

impl DegreeStore for MemoryStore {
    fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<RecordId>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .record_meta
            .iter()
            .filter(|(_, m)| m.get(key).map(String::as_str) == Some(value))
            .map(|(id, _)| *id)
            .collect())
    }

    fn get(&self, id: RecordId) -> Result<Option<DegreeRecord>, StoreError> {
        Ok(self.lock().records.get(&id).cloned())
    }

    fn create(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let mut inner = self.lock();
        inner.next_record_id += 1;
        let id = inner.next_record_id;
        inner.records.insert(
            id,
            DegreeRecord {
                id,
                title: record.title,
                slug: record.slug,
                status: record.status,
                parent_id: record.parent_id,
                created: record.created,
            },
        );
        Ok(id)
    }

    fn update(&self, id: RecordId, patch: &RecordPatch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = &patch.title {
            record.title = title.clone();
        }
        if let Some(parent_id) = patch.parent_id {
            record.parent_id = parent_id;
        }
        Ok(())
    }

    fn publish(&self, id: RecordId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = super::RecordStatus::Published;
        Ok(())
    }

    fn delete(&self, id: RecordId, hard: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if hard {
            inner.records.remove(&id).ok_or(StoreError::NotFound(id))?;
            inner.record_meta.remove(&id);
            inner.record_terms.remove(&id);
        } else {
            let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            record.status = super::RecordStatus::Trashed;
        }
        Ok(())
    }

    fn set_terms(
        &self,
        id: RecordId,
        taxonomy: &str,
        names: &[String],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        for name in names {
            let exists = inner
                .terms
                .iter()
                .any(|t| t.taxonomy == taxonomy && t.name == *name);
            if !exists {
                inner.next_term_id += 1;
                let term_id = inner.next_term_id;
                inner.terms.push(TermEntry {
                    id: term_id,
                    taxonomy: taxonomy.to_string(),
                    name: name.clone(),
                    slug: default_term_slug(name),
                    parent: None,
                });
            }
        }
        inner
            .record_terms
            .entry(id)
            .or_default()
            .insert(taxonomy.to_string(), names.to_vec());
        Ok(())
    }

    fn get_terms(&self, id: RecordId, taxonomy: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .record_terms
            .get(&id)
            .and_then(|by_tax| by_tax.get(taxonomy))
            .cloned()
            .unwrap_or_default())
    }

    fn taxonomies(&self, id: RecordId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .record_terms
            .get(&id)
            .map(|by_tax| by_tax.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn set_meta(&self, id: RecordId, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        inner
            .record_meta
            .entry(id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_meta(&self, id: RecordId, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .lock()
            .record_meta
            .get(&id)
            .and_then(|m| m.get(key))
            .cloned())
    }

    fn all_meta(&self, id: RecordId) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.lock().record_meta.get(&id).cloned().unwrap_or_default())
    }

    fn find_term(&self, taxonomy: &str, name: &str) -> Result<Option<TermId>, StoreError> {
        Ok(self
            .lock()
            .terms
            .iter()
            .find(|t| t.taxonomy == taxonomy && t.name == name)
            .map(|t| t.id))
    }

    fn insert_term(
        &self,
        taxonomy: &str,
        name: &str,
        parent: Option<TermId>,
        slug: Option<&str>,
    ) -> Result<TermId, StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .terms
            .iter()
            .find(|t| t.taxonomy == taxonomy && t.name == name)
        {
            return Ok(existing.id);
        }
        inner.next_term_id += 1;
        let term_id = inner.next_term_id;
        inner.terms.push(TermEntry {
            id: term_id,
            taxonomy: taxonomy.to_string(),
            name: name.to_string(),
            slug: slug
                .map(str::to_string)
                .unwrap_or_else(|| default_term_slug(name)),
            parent,
        });
        Ok(term_id)
    }

    fn set_term_meta(&self, term_id: TermId, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()
            .term_meta
            .entry(term_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn flush_term_hierarchy(&self, _taxonomy: &str) -> Result<(), StoreError> {
        self.lock().hierarchy_flushes += 1;
        Ok(())
    }

    fn degree_ids(&self, query: &RecordQuery) -> Result<Vec<RecordId>, StoreError> {
        let inner = self.lock();
        let mut ids = Vec::new();
        for (id, record) in &inner.records {
            if !query.statuses.contains(&record.status) {
                continue;
            }
            let record_meta = match inner.record_meta.get(id) {
                Some(m) => m,
                None => continue,
            };
            let plan_code = record_meta.get(meta::PLAN_CODE).map(String::as_str);
            if plan_code.unwrap_or("").is_empty() {
                continue;
            }
            let is_subplan = !record_meta
                .get(meta::SUBPLAN_CODE)
                .map(String::as_str)
                .unwrap_or("")
                .is_empty();
            if let Some(want_subplan) = query.has_subplan {
                if is_subplan != want_subplan {
                    continue;
                }
            }
            if !query.include_ignored
                && record_meta.get(meta::IMPORT_IGNORE).map(String::as_str) == Some("on")
            {
                continue;
            }
            ids.push(*id);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStatus;
    use chrono::NaiveDate;

    fn draft(title: &str) -> NewRecord {
        NewRecord {
            title: title.to_string(),
            slug: title.to_lowercase(),
            status: RecordStatus::Draft,
            parent_id: 0,
            created: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_create_find_by_meta() {
        let store = MemoryStore::new();
        let id = store.create(draft("Biology")).unwrap();
        store.set_meta(id, meta::DEGREE_ID, "BIO ").unwrap();
        assert_eq!(store.find_by_meta(meta::DEGREE_ID, "BIO ").unwrap(), vec![id]);
        assert!(store.find_by_meta(meta::DEGREE_ID, "CHM ").unwrap().is_empty());
    }

    #[test]
    fn test_update_preserves_unpatched_fields() {
        let store = MemoryStore::new();
        let id = store.create(draft("Biology")).unwrap();
        store
            .update(
                id,
                &RecordPatch {
                    title: Some("Biology BS".to_string()),
                    parent_id: None,
                },
            )
            .unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.title, "Biology BS");
        assert_eq!(record.slug, "biology");
        assert_eq!(record.status, RecordStatus::Draft);
    }

    #[test]
    fn test_soft_delete_trashes_record() {
        let store = MemoryStore::new();
        let id = store.create(draft("Biology")).unwrap();
        store.delete(id, false).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().status, RecordStatus::Trashed);
        store.delete(id, true).unwrap();
        assert!(store.get(id).unwrap().is_none());
    }

    #[test]
    fn test_set_terms_replaces_assignment() {
        let store = MemoryStore::new();
        let id = store.create(draft("Biology")).unwrap();
        store
            .set_terms(id, "colleges", &["Sciences".to_string(), "Medicine".to_string()])
            .unwrap();
        store.set_terms(id, "colleges", &["Sciences".to_string()]).unwrap();
        assert_eq!(store.get_terms(id, "colleges").unwrap(), vec!["Sciences"]);
    }

    #[test]
    fn test_degree_ids_filters_ignored_and_subplans() {
        let store = MemoryStore::new();
        let plan = store.create(draft("Biology")).unwrap();
        store.set_meta(plan, meta::PLAN_CODE, "BIO").unwrap();
        store.publish(plan).unwrap();

        let subplan = store.create(draft("Biology - Ecology")).unwrap();
        store.set_meta(subplan, meta::PLAN_CODE, "BIO").unwrap();
        store.set_meta(subplan, meta::SUBPLAN_CODE, "ECO").unwrap();
        store.publish(subplan).unwrap();

        let ignored = store.create(draft("Chemistry")).unwrap();
        store.set_meta(ignored, meta::PLAN_CODE, "CHM").unwrap();
        store.set_meta(ignored, meta::IMPORT_IGNORE, "on").unwrap();
        store.publish(ignored).unwrap();

        assert_eq!(
            store.degree_ids(&RecordQuery::published_plans()).unwrap(),
            vec![plan]
        );
        assert_eq!(
            store.degree_ids(&RecordQuery::published_subplans()).unwrap(),
            vec![subplan]
        );
        assert_eq!(store.count_degrees().unwrap(), 2);
    }
}
