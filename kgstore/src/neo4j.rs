use async_trait::async_trait;
use neo4rs::{BoltNull, BoltType, ConfigBuilder, Graph, Query, query};
use serde_json::Value;

use crate::config::GraphStoreConfig;
use crate::errors::{Result, StorageError};
use crate::models::{EMBEDDING_KEY, NATURAL_KEY, NodeRef, Properties, non_null};
use crate::store::{
    GraphStore, NodeMergeMode, endpoint_keys, validate_identifier, validate_keys,
    validate_pattern,
};

/// A Cypher statement with its parameters kept as JSON until execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cypher: String,
    pub params: Vec<(String, Value)>,
}

impl Statement {
    fn into_query(self) -> Result<Query> {
        let mut q = query(&self.cypher);
        for (name, value) in &self.params {
            q = q.param(name, to_bolt(value)?);
        }
        Ok(q)
    }
}

fn to_bolt(value: &Value) -> Result<BoltType> {
    Ok(match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                BoltType::from(i)
            } else if let Some(f) = n.as_f64() {
                BoltType::from(f)
            } else {
                return Err(StorageError::InvalidArg(format!(
                    "number {n} cannot be stored as a graph property"
                )));
            }
        }
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => {
            let list = items.iter().map(to_bolt).collect::<Result<Vec<_>>>()?;
            BoltType::from(list)
        }
        // Nested maps are not valid property values.
        Value::Object(_) => BoltType::from(value.to_string()),
    })
}

fn pattern(prefix: &str, keys: &Properties) -> (String, Vec<(String, Value)>) {
    let mut fields = Vec::with_capacity(keys.len());
    let mut params = Vec::with_capacity(keys.len());
    for (key, value) in keys {
        let param = format!("{prefix}_{key}");
        fields.push(format!("{key}: ${param}"));
        params.push((param, value.clone()));
    }
    (fields.join(", "), params)
}

pub fn node_merge_statement(
    label: &str,
    properties: &Properties,
    mode: NodeMergeMode,
) -> Result<Statement> {
    validate_identifier("label", label)?;
    let properties = non_null(properties);
    validate_keys(&properties)?;
    if properties.is_empty() {
        return Err(StorageError::InvalidArg(format!(
            "node '{label}' has no non-null properties to merge on"
        )));
    }

    let statement = match (mode, properties.get(NATURAL_KEY)) {
        (NodeMergeMode::NaturalKey, Some(id)) => {
            let mut params = vec![(format!("p_{NATURAL_KEY}"), id.clone())];
            let mut assignments = Vec::new();
            for (key, value) in properties.iter().filter(|(k, _)| *k != NATURAL_KEY) {
                assignments.push(format!("n.{key} = $p_{key}"));
                params.push((format!("p_{key}"), value.clone()));
            }
            let mut cypher = format!("MERGE (n:{label} {{{NATURAL_KEY}: $p_{NATURAL_KEY}}})");
            if !assignments.is_empty() {
                cypher.push_str(" SET ");
                cypher.push_str(&assignments.join(", "));
            }
            Statement { cypher, params }
        }
        _ => {
            let (fields, params) = pattern("p", &properties);
            Statement {
                cypher: format!("MERGE (n:{label} {{{fields}}})"),
                params,
            }
        }
    };
    Ok(statement)
}

pub fn relationship_merge_statement(
    start: &NodeRef,
    relationship: &str,
    end: &NodeRef,
) -> Result<Statement> {
    validate_identifier("label", &start.label)?;
    validate_identifier("label", &end.label)?;
    validate_identifier("relationship type", relationship)?;
    let (start_fields, mut params) = pattern("a", &endpoint_keys(start)?);
    let (end_fields, end_params) = pattern("b", &endpoint_keys(end)?);
    params.extend(end_params);
    Ok(Statement {
        cypher: format!(
            "MERGE (a:{} {{{}}}) MERGE (b:{} {{{}}}) MERGE (a)-[r:{}]->(b)",
            start.label, start_fields, end.label, end_fields, relationship
        ),
        params,
    })
}

pub fn node_lookup_statement(label: &str, keys: &Properties) -> Result<Statement> {
    validate_pattern(label, keys)?;
    let (fields, params) = pattern("p", keys);
    Ok(Statement {
        cypher: format!("MATCH (n:{label} {{{fields}}}) RETURN n LIMIT 1"),
        params,
    })
}

pub fn set_embedding_statement(
    label: &str,
    keys: &Properties,
    embedding: &[f64],
) -> Result<Statement> {
    validate_pattern(label, keys)?;
    let (fields, mut params) = pattern("p", keys);
    params.push((EMBEDDING_KEY.to_string(), Value::from(embedding.to_vec())));
    Ok(Statement {
        cypher: format!("MATCH (n:{label} {{{fields}}}) SET n.{EMBEDDING_KEY} = ${EMBEDDING_KEY}"),
        params,
    })
}

/// Graph store backed by a Neo4j database reached over Bolt.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self> {
        let mut builder = ConfigBuilder::default()
            .uri(config.uri.as_str())
            .user(config.user.as_str())
            .password(config.password.as_str());
        if let Some(database) = &config.database {
            builder = builder.db(database.as_str());
        }
        let graph = Graph::connect(builder.build()?).await?;
        log::info!("Connected to graph store at {}", config.uri);
        Ok(Self { graph })
    }

    async fn run(&self, statement: Statement) -> Result<()> {
        log::debug!("Running statement: {}", statement.cypher);
        self.graph.run(statement.into_query()?).await?;
        Ok(())
    }

    async fn fetch_nodes(&self, statement: Statement) -> Result<Vec<Properties>> {
        let mut result = self.graph.execute(statement.into_query()?).await?;
        let mut nodes = Vec::new();
        while let Some(row) = result.next().await? {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| StorageError::Graph(format!("failed to decode node: {e}")))?;
            nodes.push(node_properties(&node));
        }
        Ok(nodes)
    }
}

fn node_properties(node: &neo4rs::Node) -> Properties {
    let mut properties = Properties::new();
    for key in node.keys() {
        let value = node
            .get::<String>(key)
            .map(Value::from)
            .or_else(|_| node.get::<i64>(key).map(Value::from))
            .or_else(|_| node.get::<f64>(key).map(Value::from))
            .or_else(|_| node.get::<bool>(key).map(Value::from))
            .or_else(|_| node.get::<Vec<f64>>(key).map(Value::from))
            .or_else(|_| node.get::<Vec<String>>(key).map(Value::from));
        match value {
            Ok(value) => {
                properties.insert(key.to_string(), value);
            }
            Err(err) => log::debug!("Skipping unsupported property '{}': {}", key, err),
        }
    }
    properties
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn merge_node(
        &self,
        label: &str,
        properties: &Properties,
        mode: NodeMergeMode,
    ) -> Result<()> {
        self.run(node_merge_statement(label, properties, mode)?).await
    }

    async fn merge_relationship(
        &self,
        start: &NodeRef,
        relationship: &str,
        end: &NodeRef,
    ) -> Result<()> {
        self.run(relationship_merge_statement(start, relationship, end)?)
            .await
    }

    async fn find_matching(
        &self,
        label: &str,
        pattern: &Properties,
    ) -> Result<Option<Properties>> {
        let statement = node_lookup_statement(label, pattern)?;
        Ok(self.fetch_nodes(statement).await?.into_iter().next())
    }

    async fn nodes_with_label(&self, label: &str) -> Result<Vec<Properties>> {
        validate_identifier("label", label)?;
        let statement = Statement {
            cypher: format!("MATCH (n:{label}) RETURN n"),
            params: Vec::new(),
        };
        self.fetch_nodes(statement).await
    }

    async fn set_embedding_matching(
        &self,
        label: &str,
        pattern: &Properties,
        embedding: &[f64],
    ) -> Result<()> {
        self.run(set_embedding_statement(label, pattern, embedding)?)
            .await
    }
}
