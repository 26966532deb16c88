use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use prospera_core::config::VectorConfig;
use prospera_core::domain::ids::RealtorId;

#[derive(Clone, Debug, Error)]
pub enum VectorSearchError {
    #[error("vector service is not configured")]
    Disabled,
    #[error("vector service timed out")]
    Timeout,
    #[error("vector service http failure: {0}")]
    Http(String),
    #[error("vector service returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VectorHit {
    pub project_id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub content: String,
}

impl VectorHit {
    /// Project display name from whichever metadata field the indexer used.
    pub fn display_name(&self) -> String {
        for key in ["project_name", "name", "title", "property_name"] {
            if let Some(serde_json::Value::String(name)) = self.metadata.get(key) {
                let trimmed = name.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_owned();
                }
            }
        }
        self.project_id.clone()
    }
}

/// Similarity search scoped to one realtor's catalog.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        realtor: &RealtorId,
    ) -> Result<Vec<VectorHit>, VectorSearchError>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    realtor_id: &'a str,
    limit: u32,
    threshold: f32,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<VectorHit>,
}

/// HTTP client for the external vector microservice. Performs exactly one
/// bounded retry with fixed backoff before surfacing failure.
pub struct HttpVectorSearch {
    client: reqwest::Client,
    base_url: Option<String>,
    limit: u32,
    threshold: f32,
    backoff: Duration,
}

impl HttpVectorSearch {
    pub fn from_config(config: &VectorConfig) -> Result<Self, VectorSearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| VectorSearchError::Http(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.service_url.as_ref().map(|url| url.trim_end_matches('/').to_owned()),
            limit: config.search_limit,
            threshold: config.score_threshold,
            backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// A client with no endpoint; every search reports `Disabled`.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
            limit: 5,
            threshold: 0.35,
            backoff: Duration::from_millis(0),
        }
    }

    async fn attempt(
        &self,
        base_url: &str,
        query: &str,
        realtor: &RealtorId,
    ) -> Result<Vec<VectorHit>, VectorSearchError> {
        let request = SearchRequest {
            query: query.trim(),
            realtor_id: &realtor.0,
            limit: self.limit,
            threshold: self.threshold,
        };

        let response = self
            .client
            .post(format!("{base_url}/vectors/search"))
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    VectorSearchError::Timeout
                } else {
                    VectorSearchError::Http(error.to_string())
                }
            })?;

        let response = response
            .error_for_status()
            .map_err(|error| VectorSearchError::Http(error.to_string()))?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|error| VectorSearchError::InvalidResponse(error.to_string()))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(
        &self,
        query: &str,
        realtor: &RealtorId,
    ) -> Result<Vec<VectorHit>, VectorSearchError> {
        let Some(base_url) = self.base_url.as_deref() else {
            return Err(VectorSearchError::Disabled);
        };

        match self.attempt(base_url, query, realtor).await {
            Ok(hits) => Ok(hits),
            Err(first_error) => {
                tracing::warn!(
                    error = %first_error,
                    realtor = %realtor.0,
                    "vector search failed, retrying once"
                );
                tokio::time::sleep(self.backoff).await;
                self.attempt(base_url, query, realtor).await
            }
        }
    }
}

/// Fixed-result search for tests and offline evaluation.
#[derive(Clone, Debug, Default)]
pub struct StaticVectorSearch {
    hits: Vec<VectorHit>,
}

impl StaticVectorSearch {
    pub fn new(hits: Vec<VectorHit>) -> Self {
        Self { hits }
    }

    pub fn hit(project_id: &str, name: &str, content: &str) -> VectorHit {
        let mut metadata = BTreeMap::new();
        metadata
            .insert("project_name".to_owned(), serde_json::Value::String(name.to_owned()));
        VectorHit {
            project_id: project_id.to_owned(),
            score: 0.9,
            metadata,
            content: content.to_owned(),
        }
    }
}

#[async_trait]
impl VectorSearch for StaticVectorSearch {
    async fn search(
        &self,
        _query: &str,
        _realtor: &RealtorId,
    ) -> Result<Vec<VectorHit>, VectorSearchError> {
        Ok(self.hits.clone())
    }
}

#[cfg(test)]
mod tests {
    use prospera_core::config::VectorConfig;
    use prospera_core::domain::ids::RealtorId;

    use super::{HttpVectorSearch, StaticVectorSearch, VectorSearch, VectorSearchError};

    #[tokio::test]
    async fn unconfigured_client_reports_disabled() {
        let client = HttpVectorSearch::disabled();
        let result = client.search("proyectos", &RealtorId("r-1".to_owned())).await;
        assert!(matches!(result, Err(VectorSearchError::Disabled)));
    }

    #[tokio::test]
    async fn config_without_url_builds_a_disabled_client() {
        let config = VectorConfig {
            service_url: None,
            timeout_secs: 5,
            search_limit: 5,
            score_threshold: 0.35,
            retry_backoff_ms: 100,
        };
        let client = HttpVectorSearch::from_config(&config).expect("client");
        let result = client.search("proyectos", &RealtorId("r-1".to_owned())).await;
        assert!(matches!(result, Err(VectorSearchError::Disabled)));
    }

    #[tokio::test]
    async fn static_search_returns_seeded_hits() {
        let search = StaticVectorSearch::new(vec![StaticVectorSearch::hit(
            "p-1",
            "Mirador del Valle",
            "Departamentos desde 2.500 UF en la zona norte.",
        )]);
        let hits = search.search("mirador", &RealtorId("r-1".to_owned())).await.expect("hits");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].display_name(), "Mirador del Valle");
    }

    #[test]
    fn display_name_falls_back_to_project_id() {
        let hit = super::VectorHit {
            project_id: "p-9".to_owned(),
            score: 0.5,
            metadata: Default::default(),
            content: String::new(),
        };
        assert_eq!(hit.display_name(), "p-9");
    }
}
