//! Synchronizes a local catalog of academic degree program records with a
//! paginated Search Service API.
//!
//! The pipeline fetches every remote program, matches each against existing
//! local records by composite plan/subplan key, creates drafts or updates
//! matches in place, assigns hierarchical program type terms plus college and
//! department terms, removes records that no longer appear upstream, and can
//! push description/profile data back to the service as records are saved.
//!
//! The [`import::DegreeImporter`] orchestrates a run over two injected
//! capabilities: a [`search::ProgramSource`] (normally the HTTP-backed
//! [`search::SearchClient`]) and a [`store::DegreeStore`] (normally
//! [`store::SqliteStore`]).

pub mod classify;
pub mod config;
pub mod error;
pub mod import;
pub mod search;
pub mod store;

pub use config::ImportConfig;
pub use error::ImportError;
pub use import::{DegreeImporter, ImportRunState, ImportStage};
pub use search::{ProgramSource, SearchClient};
pub use store::{DegreeStore, MemoryStore, SqliteStore};
