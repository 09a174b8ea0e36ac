//! Upstream writebacks to the Search Service.
//!
//! While writebacks are enabled for a run, each saved record pushes its
//! description text and public URL back to the service. Every operation here
//! is best-effort: a writeback failure is logged and never affects the import
//! run's outcome.

use super::types::RemoteProgram;
use crate::config::ImportConfig;
use crate::error::ImportError;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Client for pushing description/profile data back to the Search Service.
pub struct WritebackClient {
    client: Client,
    config: ImportConfig,
}

impl WritebackClient {
    /// Creates a writeback client from the run configuration.
    pub fn new(config: &ImportConfig) -> Result<Self, ImportError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ImportError::Network {
                message: format!("Failed to build writeback HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Pushes a saved record's description and profile URL upstream.
    ///
    /// The program entry is re-fetched by plan/subplan so the push targets
    /// current `update_url`s rather than whatever the import run started with.
    pub async fn sync_record(
        &self,
        plan_code: &str,
        subplan_code: &str,
        description: Option<&str>,
        profile_url: Option<&str>,
    ) {
        if description.is_none() && profile_url.is_none() {
            return;
        }

        let Some(program) = self.lookup_program(plan_code, subplan_code).await else {
            warn!(
                plan_code = %plan_code,
                subplan_code = %subplan_code,
                "Writeback skipped; program not found upstream"
            );
            return;
        };

        if let Some(content) = description {
            self.push_description(&program, content).await;
        }
        if let Some(url) = profile_url {
            self.push_profile(&program, url).await;
        }
    }

    /// Looks up the single program matching the given plan/subplan codes.
    ///
    /// The service's search filters are prefix-ish; the result set is scanned
    /// for an exact code match before anything is written.
    async fn lookup_program(&self, plan_code: &str, subplan_code: &str) -> Option<RemoteProgram> {
        let mut url = match Url::parse(&self.config.search_endpoint()) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Writeback lookup skipped; bad base URL");
                return None;
            }
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.config.api_key);
            pairs.append_pair("plan_code", plan_code);
            if subplan_code.is_empty() {
                pairs.append_pair("subplan_code__isnull", "True");
            } else {
                pairs.append_pair("subplan_code", subplan_code);
            }
        }

        let response = match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!(status = %response.status(), "Writeback lookup failed");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Writeback lookup failed");
                return None;
            }
        };

        let results = match response.json::<serde_json::Value>().await {
            Ok(body) => match body.get("results") {
                Some(results) => {
                    serde_json::from_value::<Vec<RemoteProgram>>(results.clone()).ok()?
                }
                None => return None,
            },
            Err(_) => return None,
        };

        results.into_iter().find(|program| {
            program.plan_code == plan_code && program.subplan_code() == subplan_code
        })
    }

    /// Updates or creates the targeted description entry upstream.
    async fn push_description(&self, program: &RemoteProgram, content: &str) -> bool {
        let target_type = self.config.writeback_desc_type;
        let existing = program
            .descriptions
            .iter()
            .find(|entry| entry.description_type.id == target_type);

        let (method, url, body) = match existing {
            Some(entry) => (
                reqwest::Method::PUT,
                entry.update_url.clone(),
                serde_json::json!({
                    "description_type": entry.description_type,
                    "description": content,
                    "primary": entry.primary,
                    "program": program.id,
                }),
            ),
            None => (
                reqwest::Method::POST,
                self.config.endpoint("descriptions/create/"),
                serde_json::json!({
                    "description_type": target_type,
                    "description": content,
                    "primary": false,
                    "program": program.id,
                }),
            ),
        };

        self.push("description", method, &url, &body).await
    }

    /// Updates or creates the targeted profile entry upstream.
    async fn push_profile(&self, program: &RemoteProgram, profile_url: &str) -> bool {
        let target_type = self.config.writeback_profile_type;
        let existing = program
            .profiles
            .iter()
            .find(|entry| entry.profile_type.id == target_type);

        let (method, url, body) = match existing {
            Some(entry) => (
                reqwest::Method::PUT,
                entry.update_url.clone(),
                serde_json::json!({
                    "profile_type": entry.profile_type,
                    "url": profile_url,
                    "primary": entry.primary,
                    "program": program.id,
                }),
            ),
            None => (
                reqwest::Method::POST,
                self.config.endpoint("profiles/create/"),
                serde_json::json!({
                    "profile_type": target_type,
                    "url": profile_url,
                    "primary": false,
                    "program": program.id,
                }),
            ),
        };

        self.push("profile", method, &url, &body).await
    }

    /// Sends one writeback request with the API key applied.
    async fn push(
        &self,
        kind: &str,
        method: reqwest::Method,
        url: &str,
        body: &serde_json::Value,
    ) -> bool {
        let keyed_url = match Url::parse(url) {
            Ok(mut parsed) => {
                parsed
                    .query_pairs_mut()
                    .append_pair("key", &self.config.api_key);
                parsed
            }
            Err(e) => {
                warn!(kind = %kind, url = %url, error = %e, "Writeback skipped; bad URL");
                return false;
            }
        };

        match self
            .client
            .request(method, keyed_url)
            .json(body)
            .send()
            .await
        {
            Ok(response) if response.status().as_u16() < 400 => {
                debug!(kind = %kind, url = %url, "Writeback succeeded");
                true
            }
            Ok(response) => {
                warn!(kind = %kind, url = %url, status = %response.status(), "Writeback rejected");
                false
            }
            Err(e) => {
                warn!(kind = %kind, url = %url, error = %e, "Writeback failed");
                false
            }
        }
    }
}
