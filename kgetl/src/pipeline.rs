use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::{DateTime, Utc};
use exportfetcher::{transform, FieldMap, GenerateReport, GraphGenerator, SourceSystem};
use kgstore::{GraphLoader, LoadReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

/// `airbyte/jira/issues/2024_05_01_0.csv` → `jira/issues`.
pub fn source_key_for(object_key: &str) -> Option<String> {
    let segments: Vec<&str> = object_key.split('/').collect();
    match segments.get(1..3) {
        Some([system, entity]) if !system.is_empty() && !entity.is_empty() => {
            Some(format!("{system}/{entity}"))
        }
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("notification carries no records")]
    NoRecords,
    #[error("invalid notification: {0}")]
    Json(#[from] serde_json::Error),
}

/// Object-store notification announcing a newly written export file.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEvent {
    #[serde(rename = "Records")]
    records: Vec<TriggerRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct TriggerRecord {
    s3: ObjectLocation,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectLocation {
    bucket: BucketRef,
    object: ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
struct BucketRef {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ObjectRef {
    key: String,
}

impl TriggerEvent {
    pub fn from_json(raw: &str) -> Result<Self, TriggerError> {
        let event: TriggerEvent = serde_json::from_str(raw)?;
        if event.records.is_empty() {
            return Err(TriggerError::NoRecords);
        }
        Ok(event)
    }

    /// Bucket and key of the first record.
    pub fn object(&self) -> Option<(&str, &str)> {
        self.records
            .first()
            .map(|record| (record.s3.bucket.name.as_str(), record.s3.object.key.as_str()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub object_key: String,
    pub source_key: String,
    pub system: Option<SourceSystem>,
    pub rows: usize,
    pub generated: Option<GenerateReport>,
    pub loaded: Option<LoadReport>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Processed(ProcessSummary),
    Skipped { object_key: String },
    Failed { object_key: String, message: String },
}

impl PipelineOutcome {
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineOutcome::Processed(_) | PipelineOutcome::Skipped { .. } => 200,
            PipelineOutcome::Failed { .. } => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            PipelineOutcome::Processed(summary) if summary.loaded.is_some() => {
                "File transformed, graph generated, and uploaded successfully".to_string()
            }
            PipelineOutcome::Processed(_) => "File transformed, no graph generator matched".to_string(),
            PipelineOutcome::Skipped { object_key } => format!("Skipped file {object_key}"),
            PipelineOutcome::Failed { message, .. } => format!("Error processing file: {message}"),
        }
    }

    /// `{"statusCode": .., "body": ..}` as returned to the triggering platform.
    pub fn to_response(&self) -> JsonValue {
        json!({
            "statusCode": self.status_code(),
            "body": self.message(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }
}

/// File-arrival handler: transform one export file, generate its graph
/// events and load them.
pub struct Pipeline {
    field_map: FieldMap,
    loader: GraphLoader,
    work_root: PathBuf,
    keep_work_dir: bool,
}

impl Pipeline {
    pub fn new(field_map: FieldMap, loader: GraphLoader, work_root: impl Into<PathBuf>) -> Self {
        Self {
            field_map,
            loader,
            work_root: work_root.into(),
            keep_work_dir: false,
        }
    }

    pub fn keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    /// Never returns an error; failures are folded into the outcome.
    pub async fn process(&self, object_key: &str, local_file: &Path) -> PipelineOutcome {
        info!("Processing object {}", object_key);
        let Some(source_key) = source_key_for(object_key).filter(|key| self.field_map.can_map(key))
        else {
            info!("Skipping {} as it does not match any field map key", object_key);
            return PipelineOutcome::Skipped {
                object_key: object_key.to_string(),
            };
        };

        let work_dir = self.work_root.join(uuid::Uuid::new_v4().to_string());
        let result = self.run(object_key, &source_key, local_file, &work_dir).await;
        if !self.keep_work_dir && work_dir.exists() {
            if let Err(err) = tokio::fs::remove_dir_all(&work_dir).await {
                error!("Failed to remove work directory {}: {}", work_dir.display(), err);
            }
        }

        match result {
            Ok(summary) => PipelineOutcome::Processed(summary),
            Err(err) => {
                error!("Error processing file {}: {:#}", object_key, err);
                PipelineOutcome::Failed {
                    object_key: object_key.to_string(),
                    message: format!("{err:#}"),
                }
            }
        }
    }

    async fn run(
        &self,
        object_key: &str,
        source_key: &str,
        local_file: &Path,
        work_dir: &Path,
    ) -> anyhow::Result<ProcessSummary> {
        let started_at = Utc::now();
        let clock = Instant::now();

        let transformed_dir = work_dir.join("transformed").join(
            source_key
                .split('/')
                .next()
                .context("source key has no system segment")?,
        );
        let entity = source_key
            .rsplit('/')
            .next()
            .context("source key has no entity segment")?;
        let transformed = transformed_dir.join(format!("{entity}.jsonl"));
        let report = transform(&self.field_map, local_file, &transformed, source_key)
            .with_context(|| format!("failed to transform {}", local_file.display()))?;
        info!("File transformed and saved to: {}", transformed.display());

        let system = SourceSystem::detect(object_key);
        let (generated, loaded) = match system {
            Some(system) => {
                info!("Selected {} graph generator for {}", system.name(), object_key);
                let graph_output = work_dir.join("graph_output");
                let generated = GraphGenerator::new(system)
                    .generate(&transformed_dir, &graph_output)
                    .context("graph generation failed")?;
                let loaded = self
                    .loader
                    .load(&graph_output)
                    .await
                    .context("graph load failed")?;
                (Some(generated), Some(loaded))
            }
            None => {
                info!("No graph generator matched for {}", object_key);
                (None, None)
            }
        };

        Ok(ProcessSummary {
            object_key: object_key.to_string(),
            source_key: source_key.to_string(),
            system,
            rows: report.rows,
            generated,
            loaded,
            started_at,
            elapsed_ms: clock.elapsed().as_millis(),
        })
    }
}
