//! Human-readable import run summaries.

use super::importer::ImportRunState;
use crate::store::{DegreeStore, StoreError};
use std::fmt::Write;

/// Renders the run summary, basic or verbose.
pub fn render(
    state: &ImportRunState,
    store: &dyn DegreeStore,
    verbose: bool,
) -> Result<String, StoreError> {
    if verbose {
        render_verbose(state, store)
    } else {
        render_basic(state, store)
    }
}

/// The counter block. The record total is recomputed from the store rather
/// than from the run's counters so discrepancies surface here.
fn render_basic(state: &ImportRunState, store: &dyn DegreeStore) -> Result<String, StoreError> {
    let degree_total = store.count_degrees()?;

    let mut out = format!(
        "\nFinished importing degrees.\n\
         Total Processed : {}\n\
         New             : {}\n\
         Updated         : {}\n\
         Removed         : {}\n\
         Duplicates      : {}\n\
         Degree Total    : {}\n",
        state.result_count,
        state.new_count,
        state.updated_count,
        state.removed_count,
        state.duplicate_count,
        degree_total,
    );

    if !state.warnings.is_empty() {
        out.push_str("Warnings:\n");
        for warning in &state.warnings {
            let _ = writeln!(out, "- {}", warning);
        }
    }

    Ok(out)
}

/// The counter block plus per-record changelogs, plans before subplans.
fn render_verbose(state: &ImportRunState, store: &dyn DegreeStore) -> Result<String, StoreError> {
    let mut out = String::from("\n-----------------------\n");
    out.push_str(&render_basic(state, store)?);
    out.push('\n');

    let modified_plans: Vec<_> = state
        .updated_plans
        .values()
        .filter_map(|changeset| changeset.as_ref())
        .filter(|changeset| changeset.has_changes())
        .collect();
    let modified_subplans: Vec<_> = state
        .updated_subplans
        .values()
        .filter_map(|changeset| changeset.as_ref())
        .filter(|changeset| changeset.has_changes())
        .collect();

    let _ = writeln!(
        out,
        "{} existing plan records were updated with changes to record, term, or meta data during this import.\n",
        modified_plans.len()
    );
    for changeset in modified_plans {
        out.push_str(&changeset.changelog());
    }

    let _ = writeln!(
        out,
        "{} existing subplan records were updated with changes to record, term, or meta data during this import.\n",
        modified_subplans.len()
    );
    for changeset in modified_subplans {
        out.push_str(&changeset.changelog());
    }

    out.push_str("That's it!");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_basic_summary_contains_counters() {
        let store = MemoryStore::new();
        let mut state = ImportRunState::new();
        state.result_count = 12;
        state.new_count = 3;
        state.updated_count = 7;
        state.removed_count = 1;
        state.duplicate_count = 1;

        let summary = render(&state, &store, false).unwrap();
        assert!(summary.contains("Total Processed : 12"));
        assert!(summary.contains("New             : 3"));
        assert!(summary.contains("Updated         : 7"));
        assert!(summary.contains("Removed         : 1"));
        assert!(summary.contains("Duplicates      : 1"));
        assert!(summary.contains("Degree Total    : 0"));
    }

    #[test]
    fn test_verbose_summary_mentions_plan_and_subplan_groups() {
        let store = MemoryStore::new();
        let state = ImportRunState::new();
        let summary = render(&state, &store, true).unwrap();
        assert!(summary.contains("0 existing plan records were updated"));
        assert!(summary.contains("0 existing subplan records were updated"));
        assert!(summary.ends_with("That's it!"));
    }
}
