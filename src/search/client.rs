//! HTTP client for the Search Service.
//!
//! Handles the paginated program search:
//! 1. GET `{base_url}programs/search/?key=...&<filters>` for the first page
//! 2. Follow the `next` cursor until it is null
//! 3. Dereference `parent_program` URLs for subplan hierarchy resolution
//!
//! Fetch failures here are the only fatal errors in the pipeline; a run that
//! cannot read upstream data must not mutate local state.

use super::types::{RemoteProgram, SearchPage};
use crate::config::ImportConfig;
use crate::error::ImportError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Read access to the remote program catalog.
///
/// The importer consumes this seam rather than a concrete client so that runs
/// can be driven from a fixed in-process source in tests.
#[async_trait]
pub trait ProgramSource: Send + Sync {
    /// Fetches every page of program results and the server-reported total.
    async fn fetch_all(&self) -> Result<(Vec<RemoteProgram>, u64), ImportError>;

    /// Resolves the remote id of a subplan's parent program, or `None` when
    /// the program is a plan or the parent cannot be resolved. Never fatal.
    async fn parent_program_id(&self, program: &RemoteProgram) -> Option<u64>;
}

/// Client for fetching degree program data from the Search Service.
pub struct SearchClient {
    client: Client,
    config: ImportConfig,
    /// Parent URL -> remote id, memoized for the life of the client so that
    /// subplans sharing a parent cost one dereference instead of one each.
    parent_ids: Mutex<HashMap<String, u64>>,
}

impl SearchClient {
    /// Creates a new client from the run configuration.
    pub fn new(config: &ImportConfig) -> Result<Self, ImportError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ImportError::Network {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
            parent_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Builds the first-page search URL, with the API key and any additional
    /// filter parameters applied.
    fn search_url(&self) -> Result<Url, ImportError> {
        let mut url = Url::parse(&self.config.search_endpoint())?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.config.api_key);
            for (key, value) in &self.config.extra_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetches one page of program results.
    ///
    /// Returns the next-page URL (null on the last page), the page's results,
    /// and the server-reported total count. An empty first page is fatal;
    /// empty later pages simply end pagination at the caller.
    pub async fn fetch_page(
        &self,
        url: &str,
        first_page: bool,
    ) -> Result<(Option<String>, Vec<RemoteProgram>, Option<u64>), ImportError> {
        debug!(url = %url, "Fetching search results page");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() >= 400 {
            return Err(ImportError::ApiParse {
                url: url.to_string(),
                message: format!("unexpected status {}", status),
            });
        }

        let body = response.text().await?;
        let page = parse_page(url, &body)?;

        if first_page && page.results.is_empty() {
            return Err(ImportError::ApiEmptyResults);
        }

        Ok((page.next, page.results, page.count))
    }

    /// Fetches a single program object, e.g. to dereference a parent
    /// reference. Failures are recoverable and logged, never raised.
    pub async fn fetch_program(&self, url: &str) -> Option<RemoteProgram> {
        let keyed_url = match Url::parse(url) {
            Ok(mut parsed) => {
                parsed
                    .query_pairs_mut()
                    .append_pair("key", &self.config.api_key);
                parsed
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Skipping unparseable program URL");
                return None;
            }
        };

        let response = match self.client.get(keyed_url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(url = %url, status = %response.status(), "Program dereference failed");
                return None;
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Program dereference failed");
                return None;
            }
        };

        match response.json::<RemoteProgram>().await {
            Ok(program) => Some(program),
            Err(e) => {
                warn!(url = %url, error = %e, "Program dereference returned unparseable data");
                None
            }
        }
    }
}

#[async_trait]
impl ProgramSource for SearchClient {
    async fn fetch_all(&self) -> Result<(Vec<RemoteProgram>, u64), ImportError> {
        let mut results = Vec::new();
        let mut next = Some(self.search_url()?.to_string());
        let mut first_page = true;
        let mut total = 0u64;

        while let Some(url) = next {
            let (page_next, mut page_results, count) =
                self.fetch_page(&url, first_page).await?;

            if first_page {
                total = count.unwrap_or(0);
                first_page = false;
            }
            if page_results.is_empty() {
                break;
            }

            results.append(&mut page_results);
            next = page_next;
        }

        info!(count = total, fetched = results.len(), "API results fetched");

        Ok((results, total))
    }

    async fn parent_program_id(&self, program: &RemoteProgram) -> Option<u64> {
        let parent = program.parent_program.as_ref()?;

        if let Some(id) = parent.id {
            return Some(id);
        }

        if let Some(id) = self
            .parent_ids
            .lock()
            .expect("parent id cache poisoned")
            .get(&parent.url)
        {
            return Some(*id);
        }

        let id = self.fetch_program(&parent.url).await.map(|p| p.id)?;
        self.parent_ids
            .lock()
            .expect("parent id cache poisoned")
            .insert(parent.url.clone(), id);
        Some(id)
    }
}

/// Parses one page body into a [`SearchPage`].
///
/// Any body that is not JSON containing a `results` array is a parse failure.
fn parse_page(url: &str, body: &str) -> Result<SearchPage, ImportError> {
    serde_json::from_str(body).map_err(|e| ImportError::ApiParse {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_with_results() {
        let body = r#"{
            "count": 2,
            "next": "https://search.example.edu/programs/search/?page=2",
            "results": [
                {"id": 1, "name": "Biology", "plan_code": "BIO"},
                {"id": 2, "name": "Chemistry", "plan_code": "CHM"}
            ]
        }"#;
        let page = parse_page("https://search.example.edu/", body).unwrap();
        assert_eq!(page.results.len(), 2);
        assert_eq!(page.count, Some(2));
        assert!(page.next.is_some());
    }

    #[test]
    fn test_parse_page_missing_results_is_parse_error() {
        let body = r#"{"detail": "Invalid API key."}"#;
        let err = parse_page("https://search.example.edu/", body).unwrap_err();
        assert!(matches!(err, ImportError::ApiParse { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_parse_page_non_json_is_parse_error() {
        let err = parse_page("https://search.example.edu/", "<html>504</html>").unwrap_err();
        assert!(matches!(err, ImportError::ApiParse { .. }));
    }
}
