use serde::Deserialize;
use std::str::FromStr;

use crate::errors::{Result, StorageError};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for the Neo4j instance backing the knowledge graph.
#[derive(Deserialize, Debug, Clone)]
pub struct GraphStoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub database: Option<String>,
}

impl GraphStoreConfig {
    pub fn new(
        uri: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            database: None,
        }
    }

    /// Reads `NEO4J_URI`, `NEO4J_USER`, `NEO4J_PASSWORD` and `NEO4J_DATABASE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let uri = non_empty(lookup("NEO4J_URI"))
            .ok_or_else(|| StorageError::Config("NEO4J_URI must be set".into()))?;
        let user = non_empty(lookup("NEO4J_USER")).unwrap_or_else(|| "neo4j".to_string());
        let password = non_empty(lookup("NEO4J_PASSWORD"))
            .ok_or_else(|| StorageError::Config("NEO4J_PASSWORD must be set".into()))?;
        Ok(Self {
            uri,
            user,
            password,
            database: non_empty(lookup("NEO4J_DATABASE")),
        })
    }
}

/// How a freshly computed vector is combined with one already stored on a node.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMergePolicy {
    /// Concatenate onto the existing vector.
    #[default]
    Append,
    /// Overwrite the existing vector.
    Replace,
}

impl FromStr for EmbeddingMergePolicy {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(StorageError::Config(format!(
                "unsupported embedding merge policy '{other}', expected append or replace"
            ))),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    #[serde(default)]
    pub merge_policy: EmbeddingMergePolicy,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            merge_policy: EmbeddingMergePolicy::default(),
        }
    }
}

impl EmbeddingConfig {
    /// Reads `OPENAI_API_KEY`, `OPENAI_EMBEDDING_MODEL`, `OPENAI_BASE_URL`
    /// and `EMBEDDING_MERGE_POLICY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let merge_policy = match non_empty(lookup("EMBEDDING_MERGE_POLICY")) {
            Some(raw) => raw.parse()?,
            None => defaults.merge_policy,
        };
        Ok(Self {
            api_key: non_empty(lookup("OPENAI_API_KEY")),
            model: non_empty(lookup("OPENAI_EMBEDDING_MODEL")).unwrap_or(defaults.model),
            base_url: non_empty(lookup("OPENAI_BASE_URL"))
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            merge_policy,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
