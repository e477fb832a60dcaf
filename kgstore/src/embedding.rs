use crate::config::EmbeddingConfig;
use crate::errors::{Result, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;
}

pub struct NullEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        Ok(vec![vec![]; texts.len()])
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f64>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

pub struct OpenAIProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(model: String, api_key: String) -> Self {
        Self::with_base_url(model, api_key, crate::config::DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(model: String, api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            model,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            StorageError::Config("OPENAI_API_KEY is required for the OpenAI embedding provider".into())
        })?;
        Ok(Self::with_base_url(
            config.model.clone(),
            api_key,
            &config.base_url,
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();

        let request_payload = OpenAIRequest {
            input: texts,
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request_payload)
            .send()
            .await
            .map_err(|e| StorageError::Embedding(format!("OpenAI API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StorageError::Embedding(format!(
                "OpenAI API returned {}: {}",
                status, error_body
            )));
        }

        let openai_response = response.json::<OpenAIResponse>().await.map_err(|e| {
            StorageError::Embedding(format!("Failed to parse OpenAI response: {}", e))
        })?;

        let embeddings: Vec<Vec<f64>> = openai_response
            .data
            .into_iter()
            .map(|data| data.embedding)
            .collect();

        if embeddings.len() != expected {
            return Err(StorageError::Embedding(format!(
                "OpenAI API returned {} embeddings for {} inputs",
                embeddings.len(),
                expected
            )));
        }

        Ok(embeddings)
    }
}
