//! Conversion of one Search Service program into a local degree record.
//!
//! Handles the composite-key match against existing records, parent plan
//! resolution, derived name/slug generation, and the actual create-or-update
//! against the store.

use crate::classify;
use crate::config::ImportConfig;
use crate::search::{ProgramSource, RemoteProgram};
use crate::store::{
    meta, taxonomy, DegreeRecord, DegreeStore, NewRecord, RecordId, RecordPatch, StoreError,
};
use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

static SLUG_SCRUB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Override applied to a program's classified program type names.
pub type ProgramTypesHook = Box<dyn Fn(&RemoteProgram, Vec<String>) -> Vec<String> + Send + Sync>;
/// Override applied to a record's assembled metadata.
pub type MetaHook =
    Box<dyn Fn(&RemoteProgram, BTreeMap<String, String>) -> BTreeMap<String, String> + Send + Sync>;
/// Override applied to a record's assembled term lists.
pub type TermsHook = Box<
    dyn Fn(&RemoteProgram, BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>>
        + Send
        + Sync,
>;

/// Optional strategy overrides injected into record shaping. Every hook
/// defaults to the identity behavior when unset.
#[derive(Default)]
pub struct Hooks {
    pub program_types: Option<ProgramTypesHook>,
    pub record_meta: Option<MetaHook>,
    pub terms: Option<TermsHook>,
}

/// One remote program prepared for saving as a local record.
pub struct ProgramImport<'a> {
    program: &'a RemoteProgram,
    degree_id: String,
    is_subplan: bool,
    is_new: bool,
    parent_record_id: RecordId,
    existing: Option<DegreeRecord>,
    /// How many live records matched the degree id; more than one is a
    /// data-integrity problem surfaced in the run summary.
    match_candidates: usize,
    name_short: String,
    slug: String,
    meta: BTreeMap<String, String>,
    terms: BTreeMap<String, Vec<String>>,
    record_id: RecordId,
}

impl<'a> ProgramImport<'a> {
    /// Resolves everything needed to save `program`: the existing record
    /// match, the parent record for subplans, and the derived name, slug,
    /// metadata, and term assignments.
    pub async fn prepare(
        program: &'a RemoteProgram,
        source: &dyn ProgramSource,
        store: &dyn DegreeStore,
        config: &ImportConfig,
        hooks: &Hooks,
    ) -> Result<ProgramImport<'a>, StoreError> {
        let degree_id = program.degree_id();
        let is_subplan = program.is_subplan();

        let parent_record_id = resolve_parent_record_id(program, source, store, config).await?;
        let mut matches = find_matches(store, &degree_id)?;
        let match_candidates = matches.len();
        if match_candidates > 1 {
            warn!(
                degree_id = %degree_id,
                matches = match_candidates,
                "Multiple records share one degree id; using the first match"
            );
        }
        let existing = if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0))
        };
        let is_new = existing.is_none();

        let parent_title = if parent_record_id != 0 {
            store.get(parent_record_id)?.map(|record| record.title)
        } else {
            None
        };
        let name_short = if is_subplan {
            derive_name_short(&program.name, parent_title.as_deref())
        } else {
            program.name.clone()
        };
        let slug = slugify(&format!(
            "{}{}",
            name_short,
            program_suffix(program.level, &program.name)
        ));

        let mut record_meta = BTreeMap::new();
        record_meta.insert(meta::DEGREE_ID.to_string(), degree_id.clone());
        record_meta.insert(meta::API_ID.to_string(), program.id.to_string());
        record_meta.insert(meta::ONLINE.to_string(), program.online.to_string());
        record_meta.insert(
            meta::CATALOG_URL.to_string(),
            program.catalog_url.clone().unwrap_or_default(),
        );
        record_meta.insert(meta::PLAN_CODE.to_string(), program.plan_code.clone());
        record_meta.insert(
            meta::SUBPLAN_CODE.to_string(),
            program.subplan_code().to_string(),
        );
        record_meta.insert(meta::NAME_SHORT.to_string(), name_short.clone());
        if let Some(hook) = &hooks.record_meta {
            record_meta = hook(program, record_meta);
        }

        let mut program_types = classify::classify(program.career, program.level);
        if let Some(hook) = &hooks.program_types {
            program_types = hook(program, program_types);
        }

        let colleges: Vec<String> = program
            .colleges
            .iter()
            .map(|unit| college_name(&unit.full_name))
            .filter(|name| !name.is_empty())
            .collect();
        let departments: Vec<String> = program
            .departments
            .iter()
            .map(|unit| unit.full_name.clone())
            .collect();

        let mut terms = BTreeMap::new();
        terms.insert(taxonomy::PROGRAM_TYPES.to_string(), program_types);
        terms.insert(taxonomy::COLLEGES.to_string(), colleges);
        terms.insert(taxonomy::DEPARTMENTS.to_string(), departments);
        if let Some(hook) = &hooks.terms {
            terms = hook(program, terms);
        }

        Ok(ProgramImport {
            program,
            degree_id,
            is_subplan,
            is_new,
            parent_record_id,
            existing,
            match_candidates,
            name_short,
            slug,
            meta: record_meta,
            terms,
            record_id: 0,
        })
    }

    /// Creates a new draft or updates the matched record, then writes term
    /// assignments and metadata. Returns the record id.
    ///
    /// Updates preserve the existing slug, status, and creation date; only
    /// the title and parent follow the remote data.
    pub fn save(&mut self, store: &dyn DegreeStore) -> Result<RecordId, StoreError> {
        let record_id = match &self.existing {
            Some(existing) => {
                store.update(
                    existing.id,
                    &RecordPatch {
                        title: Some(self.program.name.clone()),
                        parent_id: Some(self.parent_record_id),
                    },
                )?;
                existing.id
            }
            None => store.create(NewRecord {
                title: self.program.name.clone(),
                slug: self.slug.clone(),
                status: crate::store::RecordStatus::Draft,
                parent_id: self.parent_record_id,
                created: Utc::now().naive_utc(),
            })?,
        };
        self.record_id = record_id;

        for (tax, names) in &self.terms {
            if tax == taxonomy::COLLEGES {
                for name in names {
                    let term_id = match store.find_term(tax, name)? {
                        Some(id) => id,
                        None => store.insert_term(tax, name, None, Some(&college_slug(name)))?,
                    };
                    store.set_term_meta(term_id, "colleges_alias", &college_alias(name))?;
                }
            }
            store.set_terms(record_id, tax, names)?;
        }

        for (key, value) in &self.meta {
            store.set_meta(record_id, key, value)?;
        }

        Ok(record_id)
    }

    pub fn degree_id(&self) -> &str {
        &self.degree_id
    }

    pub fn is_subplan(&self) -> bool {
        self.is_subplan
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn match_candidates(&self) -> usize {
        self.match_candidates
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn name_short(&self) -> &str {
        &self.name_short
    }
}

/// Finds every live record matching a degree id.
///
/// Records flagged by editors as ignored, and trashed records, never match.
/// At most one result is expected; callers treat more as a data-integrity
/// warning and take the first match as canonical.
pub fn find_matches(
    store: &dyn DegreeStore,
    degree_id: &str,
) -> Result<Vec<DegreeRecord>, StoreError> {
    let mut matches = Vec::new();
    for id in store.find_by_meta(meta::DEGREE_ID, degree_id)? {
        if store.import_ignored(id)? {
            continue;
        }
        if let Some(record) = store.get(id)? {
            if record.status.is_live() {
                matches.push(record);
            }
        }
    }
    Ok(matches)
}

/// Finds the single live record matching a degree id, first match wins.
pub fn find_existing(
    store: &dyn DegreeStore,
    degree_id: &str,
) -> Result<Option<DegreeRecord>, StoreError> {
    let mut matches = find_matches(store, degree_id)?;
    if matches.len() > 1 {
        warn!(
            degree_id = %degree_id,
            matches = matches.len(),
            "Multiple records share one degree id; using the first match"
        );
    }
    Ok(if matches.is_empty() {
        None
    } else {
        Some(matches.remove(0))
    })
}

/// Resolves the local record id of a subplan's parent plan, or 0.
///
/// Returns 0 for plans, when hierarchy preservation is off, or when the
/// parent cannot be resolved; an unresolvable parent leaves the subplan
/// top-level rather than failing the run.
async fn resolve_parent_record_id(
    program: &RemoteProgram,
    source: &dyn ProgramSource,
    store: &dyn DegreeStore,
    config: &ImportConfig,
) -> Result<RecordId, StoreError> {
    if !config.preserve_hierarchy || !program.is_subplan() {
        return Ok(0);
    }

    let Some(parent_api_id) = source.parent_program_id(program).await else {
        warn!(
            degree_id = %program.degree_id(),
            "Parent program could not be resolved; importing subplan top-level"
        );
        return Ok(0);
    };

    for id in store.find_by_meta(meta::API_ID, &parent_api_id.to_string())? {
        if let Some(record) = store.get(id)? {
            if record.parent_id == 0 && record.status.is_live() {
                return Ok(record.id);
            }
        }
    }

    warn!(
        degree_id = %program.degree_id(),
        parent_api_id = parent_api_id,
        "No local record for parent program; importing subplan top-level"
    );
    Ok(0)
}

/// Shortened display name. For subplans this is the track name with the
/// parent plan's title (and a following "- " separator) stripped when it is
/// a literal prefix.
fn derive_name_short(name: &str, parent_title: Option<&str>) -> String {
    if let Some(parent) = parent_title {
        if !parent.is_empty() && name.starts_with(parent) {
            let mut rest = name[parent.len()..].trim();
            if let Some(stripped) = rest.strip_prefix("- ") {
                rest = stripped;
            }
            return rest.to_string();
        }
    }
    name.to_string()
}

/// Slug suffix derived from the program level.
fn program_suffix(level: crate::search::Level, name: &str) -> &'static str {
    match level {
        crate::search::Level::Minor => "-minor",
        crate::search::Level::Certificate if !name.to_lowercase().contains("certificate") => {
            "-certificate"
        }
        _ => "",
    }
}

/// Sanitizes a name into a URL slug.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();
    SLUG_SCRUB
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Corrects college names the upstream service reports inconsistently. An
/// empty result drops the college entirely.
fn college_name(raw: &str) -> String {
    match raw {
        "College of Hospitality Management" => "Rosen College of Hospitality Management".to_string(),
        "Office of Undergraduate Studies" => "College of Undergraduate Studies".to_string(),
        "College of Nondegree" => String::new(),
        other => other.to_string(),
    }
}

/// Short college alias used for term slugs and display.
fn college_alias(name: &str) -> String {
    name.replace("College of", "")
        .replace("Rosen", "")
        .trim()
        .to_string()
}

fn college_slug(name: &str) -> String {
    slugify(&college_alias(name))
}
