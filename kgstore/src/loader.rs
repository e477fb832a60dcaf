use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::errors::{Result, StorageError};
use crate::models::{GraphEvent, NATURAL_KEY, NodeRef, Properties, id_pattern, non_null};
use crate::store::{GraphStore, NodeMergeMode};
use crate::updater::{EmbeddingOutcome, EmbeddingUpdater};

/// Counters collected while replaying graph event files into a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub files: usize,
    pub nodes: usize,
    pub relationships: usize,
    pub embeddings_updated: usize,
    pub embedding_failures: usize,
    pub skipped: usize,
}

impl LoadReport {
    fn absorb(&mut self, other: LoadReport) {
        self.files += other.files;
        self.nodes += other.nodes;
        self.relationships += other.relationships;
        self.embeddings_updated += other.embeddings_updated;
        self.embedding_failures += other.embedding_failures;
        self.skipped += other.skipped;
    }
}

/// Replays newline-delimited graph events into a [`GraphStore`].
///
/// Node events are upserted and, when their label is indexed, followed by an
/// embedding refresh. Embedding failures are logged and counted; store
/// failures abort the load.
pub struct GraphLoader {
    store: Arc<dyn GraphStore>,
    updater: Option<EmbeddingUpdater>,
    mode: NodeMergeMode,
}

impl GraphLoader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            updater: None,
            mode: NodeMergeMode::default(),
        }
    }

    pub fn with_updater(mut self, updater: EmbeddingUpdater) -> Self {
        self.updater = Some(updater);
        self
    }

    pub fn with_merge_mode(mut self, mode: NodeMergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Loads every file below `dir`, visiting paths in sorted order.
    pub async fn load(&self, dir: &Path) -> Result<LoadReport> {
        if !dir.is_dir() {
            return Err(StorageError::NotFound(format!(
                "graph event directory {} does not exist",
                dir.display()
            )));
        }
        let mut report = LoadReport::default();
        for path in event_files(dir)? {
            report.absorb(self.load_file(&path).await?);
        }
        log::info!(
            "Loaded {} file(s) from {}: {} node(s), {} relationship(s)",
            report.files,
            dir.display(),
            report.nodes,
            report.relationships
        );
        Ok(report)
    }

    pub async fn load_file(&self, path: &Path) -> Result<LoadReport> {
        log::info!("Loading graph events from {}", path.display());
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut report = LoadReport {
            files: 1,
            ..LoadReport::default()
        };

        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let event: GraphEvent = serde_json::from_str(&line).map_err(|e| {
                StorageError::InvalidArg(format!(
                    "{}:{}: invalid graph event: {}",
                    path.display(),
                    line_no,
                    e
                ))
            })?;
            self.apply(event, &mut report).await?;
        }
        Ok(report)
    }

    async fn apply(&self, event: GraphEvent, report: &mut LoadReport) -> Result<()> {
        match event {
            GraphEvent::Node { label, properties } => {
                self.apply_node(&label, &properties, report).await
            }
            GraphEvent::Relationship {
                start_node,
                end_node,
                relationship,
            } => {
                self.apply_relationship(&start_node, &relationship, &end_node, report)
                    .await
            }
        }
    }

    async fn apply_node(
        &self,
        label: &str,
        properties: &Properties,
        report: &mut LoadReport,
    ) -> Result<()> {
        let properties = non_null(properties);
        if properties.is_empty() {
            log::warn!("Skipping {} node without properties", label);
            report.skipped += 1;
            return Ok(());
        }
        self.store.merge_node(label, &properties, self.mode).await?;
        report.nodes += 1;

        let (Some(updater), Some(id)) = (&self.updater, properties.get(NATURAL_KEY)) else {
            return Ok(());
        };
        if !updater.is_indexed(label) {
            return Ok(());
        }
        // An all-property merge may leave a placeholder sharing this id, so
        // the node just written is looked up by its full pattern.
        let pattern = match self.mode {
            NodeMergeMode::NaturalKey => id_pattern(id),
            NodeMergeMode::AllProperties => properties.clone(),
        };
        match updater.update_matching(label, &pattern).await {
            Ok(EmbeddingOutcome::Updated { .. }) => report.embeddings_updated += 1,
            Ok(EmbeddingOutcome::NodeNotFound) => report.embedding_failures += 1,
            Err(err) => {
                log::error!("Failed to update embedding for {} {}: {}", label, id, err);
                report.embedding_failures += 1;
            }
        }
        Ok(())
    }

    async fn apply_relationship(
        &self,
        start: &NodeRef,
        relationship: &str,
        end: &NodeRef,
        report: &mut LoadReport,
    ) -> Result<()> {
        if start.match_keys().is_empty() || end.match_keys().is_empty() {
            log::warn!(
                "Skipping {} relationship {} -> {} with an unkeyed endpoint",
                relationship,
                start.label,
                end.label
            );
            report.skipped += 1;
            return Ok(());
        }
        self.store
            .merge_relationship(start, relationship, end)
            .await?;
        report.relationships += 1;
        Ok(())
    }
}

fn event_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
