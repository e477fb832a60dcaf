use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::config::EmbeddingMergePolicy;
use crate::embedding::EmbeddingProvider;
use crate::errors::{Result, StorageError};
use crate::models::{EMBEDDING_KEY, NATURAL_KEY, Properties, id_pattern};
use crate::store::GraphStore;

/// Per-label list of node properties that feed the embedding text.
#[derive(Debug, Clone, Default)]
pub struct IndexedProperties {
    labels: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct IndexedLabelRecord {
    label: String,
    props: Vec<String>,
}

impl IndexedProperties {
    pub fn builtin() -> Self {
        Self::from_entries([
            ("atlassian_user", vec!["id", "display_name"]),
            ("jira_comment", vec!["text", "author_id", "issue_id"]),
            ("jira_issue", vec!["description", "title", "issue_type", "status"]),
            ("slack_user", vec!["id", "name"]),
            ("slack_message", vec!["text", "user"]),
            (
                "jira_project",
                vec!["id", "project_key", "title", "description", "assignee_id"],
            ),
        ])
    }

    pub fn from_entries<L, P>(entries: impl IntoIterator<Item = (L, Vec<P>)>) -> Self
    where
        L: Into<String>,
        P: Into<String>,
    {
        Self {
            labels: entries
                .into_iter()
                .map(|(label, props)| (label.into(), props.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Loads a `[{"label": ..., "props": [...]}]` document.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<IndexedLabelRecord> = serde_json::from_str(&raw)?;
        Ok(Self::from_entries(
            records.into_iter().map(|record| (record.label, record.props)),
        ))
    }

    pub fn properties(&self, label: &str) -> Option<&[String]> {
        self.labels.get(label).map(|props| props.as_slice())
    }

    pub fn is_indexed(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }
}

/// JSON layout of the embedding input: `", "` and `": "` separators, with
/// non-ASCII characters written as `\uXXXX` escapes.
struct EmbeddingTextFormatter;

impl Formatter for EmbeddingTextFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

/// Builds the embedding input: the node's indexed properties that are present,
/// as one JSON object in configured order.
pub fn embedding_text(node: &Properties, indexed: &[String]) -> Result<String> {
    let selected: Properties = indexed
        .iter()
        .filter_map(|key| node.get(key).map(|value| (key.clone(), value.clone())))
        .collect();
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, EmbeddingTextFormatter);
    Value::Object(selected).serialize(&mut serializer)?;
    String::from_utf8(out)
        .map_err(|e| StorageError::Embedding(format!("embedding text is not UTF-8: {e}")))
}

pub fn merge_embedding(
    existing: Option<&Value>,
    fresh: Vec<f64>,
    policy: EmbeddingMergePolicy,
) -> Vec<f64> {
    match (policy, existing.and_then(Value::as_array)) {
        (EmbeddingMergePolicy::Append, Some(prior)) if !prior.is_empty() => {
            let mut combined: Vec<f64> = prior.iter().filter_map(Value::as_f64).collect();
            combined.extend(fresh);
            combined
        }
        _ => fresh,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingOutcome {
    Updated { dimensions: usize },
    NodeNotFound,
}

/// Computes embeddings for indexed nodes and writes them back onto the graph.
pub struct EmbeddingUpdater {
    store: Arc<dyn GraphStore>,
    provider: Arc<dyn EmbeddingProvider>,
    indexed: IndexedProperties,
    policy: EmbeddingMergePolicy,
}

impl EmbeddingUpdater {
    pub fn new(
        store: Arc<dyn GraphStore>,
        provider: Arc<dyn EmbeddingProvider>,
        indexed: IndexedProperties,
        policy: EmbeddingMergePolicy,
    ) -> Self {
        Self {
            store,
            provider,
            indexed,
            policy,
        }
    }

    pub fn is_indexed(&self, label: &str) -> bool {
        self.indexed.is_indexed(label)
    }

    fn indexed_properties(&self, label: &str) -> Result<&[String]> {
        self.indexed.properties(label).ok_or_else(|| {
            StorageError::Config(format!("no indexed properties configured for label '{label}'"))
        })
    }

    /// Refreshes the embedding of one node. A missing node is logged, not an error.
    pub async fn update(&self, label: &str, node_id: &Value) -> Result<EmbeddingOutcome> {
        self.update_matching(label, &id_pattern(node_id)).await
    }

    /// Like [`update`](Self::update), for the node carrying every property of
    /// `pattern`. Used after all-property merges, where several nodes may
    /// share one `id`.
    pub async fn update_matching(
        &self,
        label: &str,
        pattern: &Properties,
    ) -> Result<EmbeddingOutcome> {
        let indexed = self.indexed_properties(label)?;
        let node_id = pattern.get(NATURAL_KEY).cloned().unwrap_or_default();
        let Some(node) = self.store.find_matching(label, pattern).await? else {
            log::error!("No node found for label {} with id {}", label, node_id);
            return Ok(EmbeddingOutcome::NodeNotFound);
        };
        let dimensions = self.embed_node(label, pattern, &node, indexed).await?;
        log::info!("Updated embedding for node: {} with id: {}", label, node_id);
        Ok(EmbeddingOutcome::Updated { dimensions })
    }

    /// Refreshes every node carrying `label`; stops at the first failure.
    pub async fn update_label(&self, label: &str) -> Result<usize> {
        let indexed = self.indexed_properties(label)?;
        let nodes = self.store.nodes_with_label(label).await?;
        if nodes.is_empty() {
            log::error!("No node found for label {}", label);
            return Ok(0);
        }

        let mut updated = 0;
        for node in &nodes {
            if !node.contains_key(NATURAL_KEY) {
                log::warn!("Skipping {} node without an '{}' property", label, NATURAL_KEY);
                continue;
            }
            let pattern: Properties = node
                .iter()
                .filter(|(key, _)| key.as_str() != EMBEDDING_KEY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            self.embed_node(label, &pattern, node, indexed).await?;
            updated += 1;
        }
        log::info!("Updated embeddings for {} {} node(s)", updated, label);
        Ok(updated)
    }

    async fn embed_node(
        &self,
        label: &str,
        pattern: &Properties,
        node: &Properties,
        indexed: &[String],
    ) -> Result<usize> {
        let text = embedding_text(node, indexed)?;
        let fresh = self
            .provider
            .embed(vec![text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Embedding("provider returned no vector".into()))?;
        let combined = merge_embedding(node.get(EMBEDDING_KEY), fresh, self.policy);
        self.store
            .set_embedding_matching(label, pattern, &combined)
            .await?;
        Ok(combined.len())
    }
}
