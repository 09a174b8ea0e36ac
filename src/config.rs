//! Configuration for an import run.

use std::time::Duration;

/// Configuration for one import run, constructed once by the caller and
/// passed by reference into the importer. Core logic performs no ambient
/// settings lookups.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Base URL of the Search Service, always stored with a trailing slash.
    pub base_url: String,
    /// API key appended to every request as the `key` query parameter.
    pub api_key: String,
    /// Additional query parameters applied to the program search.
    pub extra_params: Vec<(String, String)>,
    /// Whether description/profile data is pushed back upstream as each
    /// record is saved during the run.
    pub do_writebacks: bool,
    /// Whether subplan records are parented under their plan record. When
    /// disabled, every record is created top-level.
    pub preserve_hierarchy: bool,
    /// Whether stale records bypass the trash when removed.
    pub force_delete_stale: bool,
    /// Whether per-record changesets are tracked and reported.
    pub verbose: bool,
    /// Public base URL of the local site, used to build the profile URL sent
    /// upstream by writebacks. Profile writebacks are skipped when unset.
    pub site_base_url: Option<String>,
    /// Search Service description type id targeted by writebacks.
    pub writeback_desc_type: u64,
    /// Search Service profile type id targeted by writebacks.
    pub writeback_profile_type: u64,
    /// Per-request read timeout.
    pub timeout: Duration,
    /// Per-request connect timeout.
    pub connect_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl ImportConfig {
    /// Creates a configuration with default tuning for the given service.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.to_string(),
            extra_params: Vec::new(),
            do_writebacks: false,
            preserve_hierarchy: true,
            force_delete_stale: true,
            verbose: false,
            site_base_url: None,
            writeback_desc_type: 1,
            writeback_profile_type: 1,
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("degsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Full URL of the paginated program search endpoint.
    pub fn search_endpoint(&self) -> String {
        format!("{}programs/search/", self.base_url)
    }

    /// Full URL of an upstream collection endpoint, e.g. `descriptions/create/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

fn normalize_base_url(base_url: &str) -> String {
    if base_url.is_empty() || base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let config = ImportConfig::new("https://search.example.edu", "abc");
        assert_eq!(config.base_url, "https://search.example.edu/");
        assert_eq!(
            config.search_endpoint(),
            "https://search.example.edu/programs/search/"
        );
    }

    #[test]
    fn test_base_url_slash_not_doubled() {
        let config = ImportConfig::new("https://search.example.edu/", "abc");
        assert_eq!(config.base_url, "https://search.example.edu/");
    }
}
