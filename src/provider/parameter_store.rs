//! Parameter Store REST Client
//!
//! Native REST implementation of [`ParameterSource`] using reqwest.
//!
//! Endpoints:
//! - `GET {base}/v1/organizations/{org}/projects`
//! - `GET {base}/v1/organizations/{org}/projects/{project}/parameters?environment=&tag=&search=`
//!
//! Requests carry a bearer token when one is configured.

use crate::config::ParameterStoreConfig;
use crate::provider::{ParameterQuery, ParameterRecord, ParameterSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, debug_span, Instrument};

// ============================================================================
// Response Structures
// ============================================================================

/// Response of the project listing endpoint
#[derive(Debug, Deserialize)]
struct ListProjectsResponse {
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    name: String,
}

/// Response of the parameter listing endpoint
#[derive(Debug, Deserialize)]
struct ListParametersResponse {
    #[serde(default)]
    parameters: Vec<ParameterRecord>,
}

/// Error body returned by the parameter store on failure
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Parameter store REST client
pub struct ParameterStoreClient {
    http_client: Client,
    base_url: String,
    organization: String,
    environment: Option<String>,
    tag: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for ParameterStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStoreClient")
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .field("environment", &self.environment)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl ParameterStoreClient {
    /// Create a client for the configured organization
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &ParameterStoreConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            organization: config.organization.clone(),
            environment: config.environment.clone(),
            tag: config.tag.clone(),
            token: config.token.clone(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/v1/organizations/{}/{}",
            self.base_url, self.organization, path
        );
        let request = self.http_client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: for<'de> Deserialize<'de>>(request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to request {what}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &error_text))
                .with_context(|| format!("Failed to fetch {what}"));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {what} response"))
    }
}

fn error_from_response(status: StatusCode, error_text: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorResponse>(error_text) {
        Ok(error) => anyhow::anyhow!("HTTP {}: {}", status.as_u16(), error.message),
        Err(_) => anyhow::anyhow!("HTTP {}: {}", status.as_u16(), error_text),
    }
}

#[async_trait]
impl ParameterSource for ParameterStoreClient {
    async fn project_names(&self) -> Result<Vec<String>> {
        let span = debug_span!("parameter_store.projects", organization = %self.organization);
        async move {
            let response: ListProjectsResponse =
                Self::send(self.get("projects"), "project list").await?;
            debug!(count = response.projects.len(), "Listed projects");
            Ok(response.projects.into_iter().map(|p| p.name).collect())
        }
        .instrument(span)
        .await
    }

    async fn parameters(
        &self,
        project: &str,
        query: &ParameterQuery,
    ) -> Result<Vec<ParameterRecord>> {
        let span = debug_span!("parameter_store.parameters", project);
        async move {
            let mut params: Vec<(&str, &str)> = Vec::new();
            if let Some(environment) = query.environment.as_deref().or(self.environment.as_deref()) {
                params.push(("environment", environment));
            }
            if let Some(tag) = query.tag.as_deref().or(self.tag.as_deref()) {
                params.push(("tag", tag));
            }
            if let Some(search) = query.search_term.as_deref() {
                params.push(("search", search));
            }

            let request = self
                .get(&format!("projects/{project}/parameters"))
                .query(&params);
            let response: ListParametersResponse =
                Self::send(request, &format!("parameters of project '{project}'")).await?;

            // Keys only; values may be secret
            debug!(count = response.parameters.len(), "Fetched parameters");
            Ok(response.parameters)
        }
        .instrument(span)
        .await
    }
}
