//! Error types for the import pipeline.
//!
//! Only the fetch stage of an import run raises these; every later stage
//! degrades per record and logs instead. See the importer module for the
//! propagation policy.

use crate::store::StoreError;
use thiserror::Error;

/// Fatal errors that abort an entire import run.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The search service could not be reached (connect failure, timeout).
    #[error("Search service request failed: {message}")]
    Network { message: String },

    /// The search service responded, but not with parseable program data.
    #[error("Failed to parse the Search Service response from {url}: {message}. Please make sure your Search Service base URL and API key are correct.")]
    ApiParse { url: String, message: String },

    /// The very first page of results was empty.
    #[error("No results found from the Search Service. Please make sure your Search Service base URL and API key are correct.")]
    ApiEmptyResults,

    /// A record store query failed while assembling the run's working sets.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// A provided URL could not be parsed or joined.
    #[error("Invalid URL: {message}")]
    Url { message: String },
}

impl ImportError {
    /// Process exit code identifying the failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            ImportError::Network { .. } => 1,
            ImportError::ApiParse { .. } => 2,
            ImportError::ApiEmptyResults => 3,
            ImportError::Store(_) => 4,
            ImportError::Url { .. } => 5,
        }
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(err: reqwest::Error) -> Self {
        ImportError::Network {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ImportError {
    fn from(err: url::ParseError) -> Self {
        ImportError::Url {
            message: err.to_string(),
        }
    }
}
