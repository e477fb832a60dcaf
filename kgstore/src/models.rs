use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property bag of a node, in insertion order.
pub type Properties = Map<String, Value>;

/// Property used to identify a node within its label.
pub const NATURAL_KEY: &str = "id";

/// Node property holding the embedding vector.
pub const EMBEDDING_KEY: &str = "embedding";

/// Reference to a relationship endpoint: a label plus the key properties used to match it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    pub label: String,
    #[serde(flatten)]
    pub keys: Properties,
}

impl NodeRef {
    pub fn new(label: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        let mut keys = Properties::new();
        keys.insert(key.into(), value);
        Self {
            label: label.into(),
            keys,
        }
    }

    pub fn by_id(label: impl Into<String>, id: Value) -> Self {
        Self::new(label, NATURAL_KEY, id)
    }

    /// Key properties that carry a value; nulls never take part in a match pattern.
    pub fn match_keys(&self) -> Properties {
        non_null(&self.keys)
    }
}

/// One line of a graph event file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    Node {
        label: String,
        properties: Properties,
    },
    Relationship {
        start_node: NodeRef,
        end_node: NodeRef,
        relationship: String,
    },
}

impl GraphEvent {
    pub fn node(label: impl Into<String>, properties: Properties) -> Self {
        GraphEvent::Node {
            label: label.into(),
            properties,
        }
    }

    pub fn relationship(start: NodeRef, relationship: impl Into<String>, end: NodeRef) -> Self {
        GraphEvent::Relationship {
            start_node: start,
            end_node: end,
            relationship: relationship.into(),
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, GraphEvent::Node { .. })
    }
}

/// Match pattern `{id: <id>}`.
pub fn id_pattern(id: &Value) -> Properties {
    let mut pattern = Properties::new();
    pattern.insert(NATURAL_KEY.to_string(), id.clone());
    pattern
}

/// Copies the entries of `properties` whose value is not null.
pub fn non_null(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
