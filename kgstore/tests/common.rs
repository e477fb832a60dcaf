use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kgstore::{
    EmbeddingMergePolicy, EmbeddingProvider, IndexedProperties, KgStore, MemoryGraphStore,
    StorageError,
};
use tempfile::TempDir;

/// Deterministic provider: one vector `[text length, call number]` per input.
#[derive(Default)]
pub struct CountingEmbeddingProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for CountingEmbeddingProvider {
    async fn embed(&self, texts: Vec<String>) -> kgstore::Result<Vec<Vec<f64>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(texts
            .iter()
            .map(|text| vec![text.len() as f64, call as f64])
            .collect())
    }
}

/// Provider standing in for an unreachable embedding service.
pub struct FailingEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed(&self, _texts: Vec<String>) -> kgstore::Result<Vec<Vec<f64>>> {
        Err(StorageError::Embedding("service unavailable".into()))
    }
}

#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub graph: Arc<MemoryGraphStore>,
    pub provider: Arc<CountingEmbeddingProvider>,
    pub store: KgStore,
}

pub fn init_test_context(policy: EmbeddingMergePolicy) -> anyhow::Result<TestContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    let temp_dir = tempfile::tempdir()?;
    let graph = Arc::new(MemoryGraphStore::new());
    let provider = Arc::new(CountingEmbeddingProvider::default());
    let store = KgStore::new(graph.clone()).with_embeddings(
        provider.clone(),
        IndexedProperties::builtin(),
        policy,
    );
    Ok(TestContext {
        temp_dir,
        graph,
        provider,
        store,
    })
}

#[allow(dead_code)]
pub fn write_events(path: &Path, lines: &[&str]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}
