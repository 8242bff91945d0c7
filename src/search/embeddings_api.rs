//! HTTP embedding provider
//!
//! Talks to any OpenAI-compatible `/embeddings` endpoint. Every transport,
//! status or decoding failure maps to [`RagError::EmbeddingUnavailable`].
//! Retries are left to the caller.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};
use crate::search::embeddings::{EmbeddingProvider, HashEmbedder, QueryEmbedding, l2_normalize};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// Dense embeddings from a remote endpoint
pub struct HttpEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dims: usize,
    /// Remote APIs return dense vectors only; sparse weights are computed locally
    sparse: Option<HashEmbedder>,
}

impl HttpEmbeddingProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dims: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("embedding http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: None,
            dims,
            sparse: None,
        })
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.api_url.as_deref().ok_or_else(|| {
            RagError::MissingConfig("embedding.api_url is required for the api backend".into())
        })?;
        let mut provider = Self::new(
            base_url,
            config.api_model.clone(),
            config.dims,
            Duration::from_millis(config.timeout_ms),
        )?;
        if let Some(var) = &config.api_key_env {
            provider.api_key = std::env::var(var).ok().filter(|k| !k.is_empty());
            if provider.api_key.is_none() {
                warn!(var = %var, "embedding api key variable is unset");
            }
        }
        if config.sparse {
            provider.sparse = Some(HashEmbedder::new(config.dims));
        }
        Ok(provider)
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_local_sparse(mut self) -> Self {
        self.sparse = Some(HashEmbedder::new(self.dims));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request_dense(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbedRequest {
            model: &self.model,
            input: [text],
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("HTTP error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingUnavailable(format!(
                "API returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::EmbeddingUnavailable(format!("JSON parse error: {e}")))?;

        let mut dense = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RagError::EmbeddingUnavailable("empty response".into()))?;

        if dense.len() != self.dims {
            return Err(RagError::EmbeddingUnavailable(format!(
                "expected {} dimensions, got {}",
                self.dims,
                dense.len()
            )));
        }
        l2_normalize(&mut dense);
        Ok(dense)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<QueryEmbedding> {
        let dense = self.request_dense(text).await?;
        debug!(model = %self.model, dims = dense.len(), "remote embedding received");
        Ok(QueryEmbedding {
            dense,
            sparse: self.sparse.as_ref().map(|s| s.embed_sparse(text)),
        })
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "api"
    }
}
