use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, StorageError};
use crate::models::{EMBEDDING_KEY, NATURAL_KEY, NodeRef, Properties, id_pattern, non_null};

/// How a node event is matched against nodes already in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeMergeMode {
    /// Match on every non-null property, creating a new node when any differs.
    #[default]
    AllProperties,
    /// Match on the natural key and set every other non-null property.
    /// Events without a natural key fall back to `AllProperties`.
    NaturalKey,
}

/// Write and lookup operations the pipeline needs from a property graph.
///
/// Every write is a merge: it matches an existing pattern or creates it, so
/// replaying the same events leaves the graph unchanged.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn merge_node(
        &self,
        label: &str,
        properties: &Properties,
        mode: NodeMergeMode,
    ) -> Result<()>;

    /// Merges both endpoints (creating placeholder nodes from their keys when
    /// absent) and the directed edge `start -[relationship]-> end`.
    async fn merge_relationship(
        &self,
        start: &NodeRef,
        relationship: &str,
        end: &NodeRef,
    ) -> Result<()>;

    /// First node of `label` carrying every property in `pattern`.
    async fn find_matching(
        &self,
        label: &str,
        pattern: &Properties,
    ) -> Result<Option<Properties>>;

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<Properties>>;

    /// Sets the embedding on every node of `label` matching `pattern`.
    async fn set_embedding_matching(
        &self,
        label: &str,
        pattern: &Properties,
        embedding: &[f64],
    ) -> Result<()>;

    async fn find_node(&self, label: &str, id: &Value) -> Result<Option<Properties>> {
        self.find_matching(label, &id_pattern(id)).await
    }

    async fn set_embedding(&self, label: &str, id: &Value, embedding: &[f64]) -> Result<()> {
        self.set_embedding_matching(label, &id_pattern(id), embedding)
            .await
    }
}

/// Labels, relationship types and property keys are spliced into statements,
/// so they must be plain identifiers.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidArg(format!("invalid {kind} '{name}'")))
    }
}

pub(crate) fn validate_keys(properties: &Properties) -> Result<()> {
    for key in properties.keys() {
        validate_identifier("property name", key)?;
    }
    Ok(())
}

/// An empty pattern would match every node of the label.
pub(crate) fn validate_pattern(label: &str, pattern: &Properties) -> Result<()> {
    validate_identifier("label", label)?;
    validate_keys(pattern)?;
    if pattern.is_empty() {
        return Err(StorageError::InvalidArg(format!(
            "lookup on '{label}' needs at least one property"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    pub label: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRelationship {
    pub start: StoredNode,
    pub relationship: String,
    pub end: StoredNode,
}

#[derive(Default)]
struct MemoryGraph {
    nodes: Vec<StoredNode>,
    edges: Vec<(usize, String, usize)>,
}

impl StoredNode {
    fn matches(&self, label: &str, pattern: &Properties) -> bool {
        self.label == label
            && pattern
                .iter()
                .all(|(key, value)| self.properties.get(key) == Some(value))
    }
}

impl MemoryGraph {
    fn positions(&self, label: &str, pattern: &Properties) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.matches(label, pattern))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Every node matching the pattern, or a new node built from it.
    fn merge_pattern(&mut self, label: &str, pattern: Properties) -> Vec<usize> {
        let found = self.positions(label, &pattern);
        if !found.is_empty() {
            return found;
        }
        self.nodes.push(StoredNode {
            label: label.to_string(),
            properties: pattern,
        });
        vec![self.nodes.len() - 1]
    }
}

/// Graph store held in process memory, with the same merge semantics as the
/// Neo4j statements: a pattern binds every matching node, so duplicates left
/// by all-property merges each receive the edge. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryGraphStore {
    graph: Mutex<MemoryGraph>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_graph<T>(&self, f: impl FnOnce(&mut MemoryGraph) -> T) -> Result<T> {
        let mut guard = self
            .graph
            .lock()
            .map_err(|_| StorageError::Graph("memory graph mutex poisoned".into()))?;
        Ok(f(&mut guard))
    }

    pub fn nodes(&self) -> Result<Vec<StoredNode>> {
        self.with_graph(|graph| graph.nodes.clone())
    }

    pub fn node_count(&self, label: &str) -> Result<usize> {
        self.with_graph(|graph| graph.nodes.iter().filter(|n| n.label == label).count())
    }

    pub fn relationships(&self) -> Result<Vec<StoredRelationship>> {
        self.with_graph(|graph| {
            graph
                .edges
                .iter()
                .map(|(start, relationship, end)| StoredRelationship {
                    start: graph.nodes[*start].clone(),
                    relationship: relationship.clone(),
                    end: graph.nodes[*end].clone(),
                })
                .collect()
        })
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn merge_node(
        &self,
        label: &str,
        properties: &Properties,
        mode: NodeMergeMode,
    ) -> Result<()> {
        validate_identifier("label", label)?;
        let properties = non_null(properties);
        validate_keys(&properties)?;
        if properties.is_empty() {
            return Err(StorageError::InvalidArg(format!(
                "node '{label}' has no non-null properties to merge on"
            )));
        }

        let natural_key = match mode {
            NodeMergeMode::NaturalKey => properties.get(NATURAL_KEY).cloned(),
            NodeMergeMode::AllProperties => None,
        };

        self.with_graph(|graph| match natural_key {
            Some(id) => {
                let mut key = Properties::new();
                key.insert(NATURAL_KEY.to_string(), id);
                for idx in graph.merge_pattern(label, key) {
                    let node = &mut graph.nodes[idx];
                    for (k, v) in &properties {
                        node.properties.insert(k.clone(), v.clone());
                    }
                }
            }
            None => {
                graph.merge_pattern(label, properties);
            }
        })
    }

    async fn merge_relationship(
        &self,
        start: &NodeRef,
        relationship: &str,
        end: &NodeRef,
    ) -> Result<()> {
        validate_identifier("label", &start.label)?;
        validate_identifier("label", &end.label)?;
        validate_identifier("relationship type", relationship)?;
        let start_keys = endpoint_keys(start)?;
        let end_keys = endpoint_keys(end)?;

        self.with_graph(|graph| {
            let starts = graph.merge_pattern(&start.label, start_keys);
            let ends = graph.merge_pattern(&end.label, end_keys);
            for &a in &starts {
                for &b in &ends {
                    let exists = graph
                        .edges
                        .iter()
                        .any(|(s, r, e)| *s == a && *e == b && r == relationship);
                    if !exists {
                        graph.edges.push((a, relationship.to_string(), b));
                    }
                }
            }
        })
    }

    async fn find_matching(
        &self,
        label: &str,
        pattern: &Properties,
    ) -> Result<Option<Properties>> {
        validate_pattern(label, pattern)?;
        self.with_graph(|graph| {
            graph
                .nodes
                .iter()
                .find(|node| node.matches(label, pattern))
                .map(|node| node.properties.clone())
        })
    }

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<Properties>> {
        self.with_graph(|graph| {
            graph
                .nodes
                .iter()
                .filter(|node| node.label == label)
                .map(|node| node.properties.clone())
                .collect()
        })
    }

    async fn set_embedding_matching(
        &self,
        label: &str,
        pattern: &Properties,
        embedding: &[f64],
    ) -> Result<()> {
        validate_pattern(label, pattern)?;
        let vector = Value::from(embedding.to_vec());
        self.with_graph(|graph| {
            for node in graph
                .nodes
                .iter_mut()
                .filter(|node| node.matches(label, pattern))
            {
                node.properties
                    .insert(EMBEDDING_KEY.to_string(), vector.clone());
            }
        })
    }
}

pub(crate) fn endpoint_keys(node: &NodeRef) -> Result<Properties> {
    let keys = node.match_keys();
    validate_keys(&keys)?;
    if keys.is_empty() {
        return Err(StorageError::InvalidArg(format!(
            "relationship endpoint '{}' has no non-null key properties",
            node.label
        )));
    }
    Ok(keys)
}
