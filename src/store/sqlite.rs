//! SQLite-backed degree record store.

use super::{
    default_term_slug, meta, DegreeRecord, DegreeStore, NewRecord, RecordId, RecordPatch,
    RecordQuery, RecordStatus, StoreError, TermId,
};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/init_degrees.sql");

/// A [`DegreeStore`] persisted in a SQLite database.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (and if necessary initializes) the catalog database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    /// Opens an in-memory catalog database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().expect("sqlite store poisoned")
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(DegreeRecord, String)> {
    let status: String = row.get(3)?;
    Ok((
        DegreeRecord {
            id: row.get::<_, i64>(0)? as RecordId,
            title: row.get(1)?,
            slug: row.get(2)?,
            status: RecordStatus::Draft,
            parent_id: row.get::<_, i64>(4)? as RecordId,
            created: row.get::<_, NaiveDateTime>(5)?,
        },
        status,
    ))
}

impl DegreeStore for SqliteStore {
    fn find_by_meta(&self, key: &str, value: &str) -> Result<Vec<RecordId>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT record_id FROM degree_meta WHERE meta_key = ?1 AND meta_value = ?2
             ORDER BY record_id",
        )?;
        let ids = stmt
            .query_map((key, value), |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids.into_iter().map(|id| id as RecordId).collect())
    }

    fn get(&self, id: RecordId) -> Result<Option<DegreeRecord>, StoreError> {
        let db = self.lock();
        let row = db
            .query_row(
                "SELECT record_id, title, slug, status, parent_id, created_at
                 FROM degrees WHERE record_id = ?1",
                [id as i64],
                row_to_record,
            )
            .optional()?;

        match row {
            Some((mut record, status)) => {
                record.status = RecordStatus::parse(&status).ok_or_else(|| {
                    StoreError::Database(format!("unknown record status '{}'", status))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn create(&self, record: NewRecord) -> Result<RecordId, StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO degrees (title, slug, status, parent_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &record.title,
                &record.slug,
                record.status.as_str(),
                record.parent_id as i64,
                record.created,
            ),
        )?;
        Ok(db.last_insert_rowid() as RecordId)
    }

    fn update(&self, id: RecordId, patch: &RecordPatch) -> Result<(), StoreError> {
        let db = self.lock();
        let mut updated = 1usize;
        if let Some(title) = &patch.title {
            updated = db.execute(
                "UPDATE degrees SET title = ?1 WHERE record_id = ?2",
                (title, id as i64),
            )?;
        }
        if let Some(parent_id) = patch.parent_id {
            updated = db.execute(
                "UPDATE degrees SET parent_id = ?1 WHERE record_id = ?2",
                (parent_id as i64, id as i64),
            )?;
        }
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn publish(&self, id: RecordId) -> Result<(), StoreError> {
        let db = self.lock();
        let updated = db.execute(
            "UPDATE degrees SET status = 'published' WHERE record_id = ?1",
            [id as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn delete(&self, id: RecordId, hard: bool) -> Result<(), StoreError> {
        let db = self.lock();
        if hard {
            let removed = db.execute("DELETE FROM degrees WHERE record_id = ?1", [id as i64])?;
            if removed == 0 {
                return Err(StoreError::NotFound(id));
            }
            db.execute("DELETE FROM degree_meta WHERE record_id = ?1", [id as i64])?;
            db.execute("DELETE FROM degree_terms WHERE record_id = ?1", [id as i64])?;
        } else {
            let updated = db.execute(
                "UPDATE degrees SET status = 'trashed' WHERE record_id = ?1",
                [id as i64],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id));
            }
        }
        Ok(())
    }

    fn set_terms(
        &self,
        id: RecordId,
        taxonomy: &str,
        names: &[String],
    ) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "DELETE FROM degree_terms WHERE record_id = ?1
             AND term_id IN (SELECT term_id FROM terms WHERE taxonomy = ?2)",
            (id as i64, taxonomy),
        )?;

        for name in names {
            db.execute(
                "INSERT OR IGNORE INTO terms (taxonomy, name, slug) VALUES (?1, ?2, ?3)",
                (taxonomy, name, default_term_slug(name)),
            )?;
            let term_id: i64 = db.query_row(
                "SELECT term_id FROM terms WHERE taxonomy = ?1 AND name = ?2",
                (taxonomy, name),
                |row| row.get(0),
            )?;
            db.execute(
                "INSERT OR IGNORE INTO degree_terms (record_id, term_id) VALUES (?1, ?2)",
                (id as i64, term_id),
            )?;
        }
        Ok(())
    }

    fn get_terms(&self, id: RecordId, taxonomy: &str) -> Result<Vec<String>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT t.name FROM terms t
             JOIN degree_terms dt ON dt.term_id = t.term_id
             WHERE dt.record_id = ?1 AND t.taxonomy = ?2
             ORDER BY t.name",
        )?;
        let names = stmt
            .query_map((id as i64, taxonomy), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn taxonomies(&self, id: RecordId) -> Result<Vec<String>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT DISTINCT t.taxonomy FROM terms t
             JOIN degree_terms dt ON dt.term_id = t.term_id
             WHERE dt.record_id = ?1
             ORDER BY t.taxonomy",
        )?;
        let taxonomies = stmt
            .query_map([id as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(taxonomies)
    }

    fn set_meta(&self, id: RecordId, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO degree_meta (record_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT (record_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            (id as i64, key, value),
        )?;
        Ok(())
    }

    fn get_meta(&self, id: RecordId, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.lock();
        let value = db
            .query_row(
                "SELECT meta_value FROM degree_meta WHERE record_id = ?1 AND meta_key = ?2",
                (id as i64, key),
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn all_meta(&self, id: RecordId) -> Result<BTreeMap<String, String>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT meta_key, meta_value FROM degree_meta WHERE record_id = ?1",
        )?;
        let mut map = BTreeMap::new();
        let rows = stmt.query_map([id as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn find_term(&self, taxonomy: &str, name: &str) -> Result<Option<TermId>, StoreError> {
        let db = self.lock();
        let id = db
            .query_row(
                "SELECT term_id FROM terms WHERE taxonomy = ?1 AND name = ?2",
                (taxonomy, name),
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(|id| id as TermId))
    }

    fn insert_term(
        &self,
        taxonomy: &str,
        name: &str,
        parent: Option<TermId>,
        slug: Option<&str>,
    ) -> Result<TermId, StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT OR IGNORE INTO terms (taxonomy, name, slug, parent_id) VALUES (?1, ?2, ?3, ?4)",
            (
                taxonomy,
                name,
                slug.map(str::to_string)
                    .unwrap_or_else(|| default_term_slug(name)),
                parent.map(|p| p as i64),
            ),
        )?;
        let term_id: i64 = db.query_row(
            "SELECT term_id FROM terms WHERE taxonomy = ?1 AND name = ?2",
            (taxonomy, name),
            |row| row.get(0),
        )?;
        Ok(term_id as TermId)
    }

    fn set_term_meta(&self, term_id: TermId, key: &str, value: &str) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO term_meta (term_id, meta_key, meta_value) VALUES (?1, ?2, ?3)
             ON CONFLICT (term_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            (term_id as i64, key, value),
        )?;
        Ok(())
    }

    fn flush_term_hierarchy(&self, _taxonomy: &str) -> Result<(), StoreError> {
        // Terms are read straight from the tables; there is no cached index.
        Ok(())
    }

    fn degree_ids(&self, query: &RecordQuery) -> Result<Vec<RecordId>, StoreError> {
        let statuses = query
            .statuses
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "SELECT d.record_id FROM degrees d
             WHERE d.status IN ({statuses})
               AND EXISTS (SELECT 1 FROM degree_meta m
                           WHERE m.record_id = d.record_id
                             AND m.meta_key = '{plan}' AND m.meta_value <> '')",
            statuses = statuses,
            plan = meta::PLAN_CODE,
        );

        match query.has_subplan {
            Some(true) => sql.push_str(&format!(
                " AND EXISTS (SELECT 1 FROM degree_meta m
                              WHERE m.record_id = d.record_id
                                AND m.meta_key = '{subplan}' AND m.meta_value <> '')",
                subplan = meta::SUBPLAN_CODE,
            )),
            Some(false) => sql.push_str(&format!(
                " AND NOT EXISTS (SELECT 1 FROM degree_meta m
                                  WHERE m.record_id = d.record_id
                                    AND m.meta_key = '{subplan}' AND m.meta_value <> '')",
                subplan = meta::SUBPLAN_CODE,
            )),
            None => {}
        }

        if !query.include_ignored {
            sql.push_str(&format!(
                " AND NOT EXISTS (SELECT 1 FROM degree_meta m
                                  WHERE m.record_id = d.record_id
                                    AND m.meta_key = '{ignore}' AND m.meta_value = 'on')",
                ignore = meta::IMPORT_IGNORE,
            ));
        }

        sql.push_str(" ORDER BY d.record_id");

        let db = self.lock();
        let mut stmt = db.prepare(&sql)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids.into_iter().map(|id| id as RecordId).collect())
    }
}
