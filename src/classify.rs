//! Program type classification.
//!
//! Maps a remote program's career and level onto hierarchical program type
//! term names, and seeds the default two-level term tree on first import.

use crate::search::{Career, Level};
use crate::store::{taxonomy, DegreeStore, StoreError};
use tracing::{debug, info};

/// A parent program type term and the child terms nested beneath it.
#[derive(Debug, Clone, Copy)]
pub struct ProgramTypeSeed {
    pub name: &'static str,
    pub children: &'static [&'static str],
}

/// Default program type hierarchy, seeded once if absent.
pub const DEFAULT_PROGRAM_TYPES: &[ProgramTypeSeed] = &[
    ProgramTypeSeed {
        name: "Undergraduate Program",
        children: &["Bachelor", "Minor", "Undergraduate Certificate"],
    },
    ProgramTypeSeed {
        name: "Graduate Program",
        children: &["Master", "Specialist", "Doctorate", "Graduate Certificate"],
    },
    ProgramTypeSeed {
        name: "Professional Program",
        children: &[],
    },
];

/// Converts a program's career and level to program type term names.
///
/// Classification is best-effort: an unmapped value on either axis simply
/// contributes no term, so the result holds between zero and two names.
pub fn classify(career: Career, level: Level) -> Vec<String> {
    let mut names = Vec::with_capacity(2);

    match career {
        Career::Undergraduate => names.push("Undergraduate Program".to_string()),
        Career::Graduate => names.push("Graduate Program".to_string()),
        Career::Professional => names.push("Professional Program".to_string()),
        Career::Other => {}
    }

    match level {
        Level::Bachelors => names.push("Bachelor".to_string()),
        Level::Masters => names.push("Master".to_string()),
        Level::Doctoral => names.push("Doctorate".to_string()),
        Level::Specialist => names.push("Specialist".to_string()),
        Level::Minor => names.push("Minor".to_string()),
        Level::Certificate => names.push(
            if career == Career::Undergraduate {
                "Undergraduate Certificate"
            } else {
                "Graduate Certificate"
            }
            .to_string(),
        ),
        Level::Other => {}
    }

    names
}

/// Idempotently creates the program type term tree.
///
/// A parent term that already exists is left alone entirely; a missing parent
/// is created along with all of its children. Any creation flushes the
/// store's cached term hierarchy so parent/child relationships are visible to
/// readers.
pub fn ensure_seed_terms(
    store: &dyn DegreeStore,
    tree: &[ProgramTypeSeed],
) -> Result<(), StoreError> {
    let mut created = false;

    for seed in tree {
        if store
            .find_term(taxonomy::PROGRAM_TYPES, seed.name)?
            .is_some()
        {
            continue;
        }

        let parent = store.insert_term(taxonomy::PROGRAM_TYPES, seed.name, None, None)?;
        for child in seed.children {
            store.insert_term(taxonomy::PROGRAM_TYPES, child, Some(parent), None)?;
        }
        created = true;
    }

    if created {
        store.flush_term_hierarchy(taxonomy::PROGRAM_TYPES)?;
        info!("Generated default program types");
    } else {
        debug!("Default program types already exist");
    }

    Ok(())
}
