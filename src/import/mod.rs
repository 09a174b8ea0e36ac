/// Degree import and reconciliation module
mod changeset;
mod importer;
mod record;
mod stats;

pub use changeset::{Changeset, ChangesetDiff, FieldChange, Snapshot};
pub use importer::{DegreeImporter, ImportRunState, ImportStage};
pub use record::{
    find_existing, find_matches, slugify, Hooks, MetaHook, ProgramImport, ProgramTypesHook,
    TermsHook,
};
