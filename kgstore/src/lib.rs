pub mod config;
pub mod embedding;
pub mod errors;
pub mod loader;
pub mod models;
pub mod neo4j;
pub mod store;
pub mod updater;

pub use crate::config::{EmbeddingConfig, EmbeddingMergePolicy, GraphStoreConfig};
pub use crate::embedding::{EmbeddingProvider, NullEmbeddingProvider, OpenAIProvider};
pub use crate::errors::{Result, StorageError};
pub use crate::loader::{GraphLoader, LoadReport};
pub use crate::models::{GraphEvent, NodeRef, Properties};
pub use crate::neo4j::Neo4jStore;
pub use crate::store::{GraphStore, MemoryGraphStore, NodeMergeMode};
pub use crate::updater::{EmbeddingOutcome, EmbeddingUpdater, IndexedProperties};

use std::sync::Arc;

/// Storage side of the export pipeline: a property graph plus the embedding
/// service that annotates its indexed nodes.
///
/// `KgStore` bundles the connected [`GraphStore`] with a [`GraphLoader`] and,
/// once embeddings are enabled, an [`EmbeddingUpdater`], so callers can replay
/// graph event files and refresh embeddings through one handle.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kgstore::{
///     EmbeddingConfig, GraphStoreConfig, IndexedProperties, KgStore, NodeMergeMode,
///     OpenAIProvider,
/// };
///
/// #[tokio::main]
/// async fn main() {
///     let graph = GraphStoreConfig::from_env().unwrap();
///     let embedding = EmbeddingConfig::from_env().unwrap();
///     let provider = Arc::new(OpenAIProvider::from_config(&embedding).unwrap());
///     let store = KgStore::connect(&graph)
///         .await
///         .unwrap()
///         .with_merge_mode(NodeMergeMode::NaturalKey)
///         .with_embeddings(provider, IndexedProperties::builtin(), embedding.merge_policy);
///     let report = store.loader.load(std::path::Path::new("graph_output")).await.unwrap();
///     println!("{} nodes loaded", report.nodes);
/// }
/// ```
pub struct KgStore {
    pub graph: Arc<dyn GraphStore>,
    pub loader: GraphLoader,
    pub updater: Option<EmbeddingUpdater>,
}

impl KgStore {
    /// Wraps an already-built graph, e.g. the in-memory one. Embeddings stay off.
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self {
            loader: GraphLoader::new(Arc::clone(&graph)),
            graph,
            updater: None,
        }
    }

    /// Connects to the Neo4j instance described by `config`.
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self> {
        let graph: Arc<dyn GraphStore> = Arc::new(Neo4jStore::connect(config).await?);
        Ok(Self::new(graph))
    }

    /// Refreshes the embeddings of indexed nodes as they are loaded.
    pub fn with_embeddings(
        mut self,
        provider: Arc<dyn EmbeddingProvider>,
        indexed: IndexedProperties,
        policy: EmbeddingMergePolicy,
    ) -> Self {
        self.updater = Some(EmbeddingUpdater::new(
            Arc::clone(&self.graph),
            Arc::clone(&provider),
            indexed.clone(),
            policy,
        ));
        self.loader = self.loader.with_updater(EmbeddingUpdater::new(
            Arc::clone(&self.graph),
            provider,
            indexed,
            policy,
        ));
        self
    }

    pub fn with_merge_mode(mut self, mode: NodeMergeMode) -> Self {
        self.loader = self.loader.with_merge_mode(mode);
        self
    }
}
