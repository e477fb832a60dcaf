pub mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use exportfetcher::{FieldMap, GraphGenerator, SourceSystem};
use kgstore::{
    EmbeddingConfig, EmbeddingMergePolicy, EmbeddingOutcome, EmbeddingProvider, GraphStoreConfig,
    IndexedProperties, KgStore, MemoryGraphStore, NodeMergeMode, NullEmbeddingProvider,
    OpenAIProvider,
};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::pipeline::{Pipeline, TriggerEvent};

const DEFAULT_LOG_FILTER: &str = "kgetl=info,kgstore=info,exportfetcher=info";

/// Runs the command line interface for the export-to-graph pipeline.
pub async fn run_cli() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Transform(args)) => run_transform(args)?,
        Some(Command::Generate(args)) => run_generate(args)?,
        Some(Command::Load(args)) => run_load(args).await?,
        Some(Command::Embed(args)) => run_embed(args).await?,
        Some(Command::Process(args)) => run_process(args).await?,
        None => {
            println!("No subcommand provided. Use --help to see available commands.");
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Maps an export CSV into JSON-lines records
    Transform(TransformArgs),
    /// Turns per-entity record files into graph event files
    Generate(GenerateArgs),
    /// Loads graph event files into the graph store
    Load(LoadArgs),
    /// Recomputes embeddings for one node or a whole label
    Embed(EmbedArgs),
    /// Runs transform, generate and load for one arrived export file
    Process(ProcessArgs),
}

#[derive(Args)]
struct TransformArgs {
    /// Export CSV to read
    #[arg(long)]
    source: PathBuf,
    /// JSON-lines file to write
    #[arg(long)]
    output: PathBuf,
    /// Field map entry to apply, e.g. jira/issues
    #[arg(long)]
    source_key: String,
    #[command(flatten)]
    field_map: FieldMapArgs,
}

#[derive(Args)]
struct GenerateArgs {
    /// Export system whose graph shape to use (jira, confluence, slack)
    #[arg(long)]
    system: SourceSystem,
    /// Directory holding `{entity}.jsonl` files
    #[arg(long)]
    input: PathBuf,
    /// Directory receiving `{entity}_data.jsonl` event files
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args)]
struct LoadArgs {
    /// Directory of graph event files, visited recursively
    #[arg(long)]
    dir: PathBuf,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct EmbedArgs {
    /// Node label to embed
    #[arg(long)]
    label: String,
    /// Natural key of a single node; all nodes of the label when omitted
    #[arg(long)]
    id: Option<String>,
    /// Treat --id as a number instead of a string
    #[arg(long, default_value_t = false)]
    numeric_id: bool,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct ProcessArgs {
    /// Object key of the arrived export file, e.g. airbyte/jira/issues/2024_05_01_0.csv
    #[arg(long, required_unless_present = "event", conflicts_with = "event")]
    object_key: Option<String>,
    /// Object-store notification (JSON) naming the arrived file
    #[arg(long)]
    event: Option<PathBuf>,
    /// Local copy of the export file
    #[arg(long)]
    file: PathBuf,
    /// Directory under which each run gets its own work directory
    #[arg(long, env = "KGETL_WORK_ROOT", default_value = "/tmp/kgetl")]
    work_root: PathBuf,
    /// Keep intermediate files after the run
    #[arg(long, default_value_t = false)]
    keep_work_dir: bool,
    #[command(flatten)]
    field_map: FieldMapArgs,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct FieldMapArgs {
    /// JSON file overriding or extending the built-in field map
    #[arg(long, env = "KGETL_FIELD_MAP")]
    field_map: Option<PathBuf>,
}

impl FieldMapArgs {
    fn build(&self) -> anyhow::Result<FieldMap> {
        let builtin = FieldMap::builtin();
        match &self.field_map {
            Some(path) => {
                let overrides = FieldMap::from_json_file(path)
                    .with_context(|| format!("failed to read field map {}", path.display()))?;
                Ok(builtin.with_overrides(overrides))
            }
            None => Ok(builtin),
        }
    }
}

#[derive(Args)]
struct StoreArgs {
    /// Load into an in-memory graph instead of Neo4j
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Bolt URI of the Neo4j instance
    #[arg(long, env = "NEO4J_URI")]
    neo4j_uri: Option<String>,
    #[arg(long, env = "NEO4J_USER", default_value = "neo4j")]
    neo4j_user: String,
    #[arg(long, env = "NEO4J_PASSWORD", hide_env_values = true)]
    neo4j_password: Option<String>,
    #[arg(long, env = "NEO4J_DATABASE")]
    neo4j_database: Option<String>,
    /// Node merge strategy: all-properties or natural-key
    #[arg(long, default_value = "all-properties", value_parser = parse_merge_mode)]
    merge_mode: NodeMergeMode,
    /// Embedding merge policy: append or replace (defaults to EMBEDDING_MERGE_POLICY)
    #[arg(long)]
    merge_policy: Option<EmbeddingMergePolicy>,
    /// JSON file replacing the built-in indexed property table
    #[arg(long, env = "KGETL_INDEXED_PROPERTIES")]
    indexed_properties: Option<PathBuf>,
    /// Skip embedding updates while loading
    #[arg(long, default_value_t = false)]
    no_embeddings: bool,
}

fn parse_merge_mode(raw: &str) -> Result<NodeMergeMode, String> {
    serde_json::from_value(JsonValue::String(raw.to_string()))
        .map_err(|_| format!("unknown merge mode '{raw}', expected all-properties or natural-key"))
}

struct Services {
    store: KgStore,
    /// Set on dry runs, for the closing summary.
    memory: Option<Arc<MemoryGraphStore>>,
}

impl StoreArgs {
    fn graph_config(&self) -> anyhow::Result<GraphStoreConfig> {
        let uri = self
            .neo4j_uri
            .clone()
            .context("NEO4J_URI (or --neo4j-uri) is required unless --dry-run is set")?;
        let password = self
            .neo4j_password
            .clone()
            .context("NEO4J_PASSWORD (or --neo4j-password) is required unless --dry-run is set")?;
        let mut config = GraphStoreConfig::new(uri, self.neo4j_user.clone(), password);
        config.database = self.neo4j_database.clone();
        Ok(config)
    }

    fn indexed(&self) -> anyhow::Result<IndexedProperties> {
        match &self.indexed_properties {
            Some(path) => IndexedProperties::from_json_file(path)
                .with_context(|| format!("failed to read indexed properties {}", path.display())),
            None => Ok(IndexedProperties::builtin()),
        }
    }

    async fn connect(&self) -> anyhow::Result<Services> {
        let memory = self.dry_run.then(|| Arc::new(MemoryGraphStore::new()));
        let store = match &memory {
            Some(memory) => {
                info!("Dry run: loading into an in-memory graph");
                KgStore::new(memory.clone())
            }
            None => KgStore::connect(&self.graph_config()?)
                .await
                .context("failed to connect to Neo4j")?,
        }
        .with_merge_mode(self.merge_mode);

        if self.no_embeddings {
            return Ok(Services { store, memory });
        }
        let mut embedding = EmbeddingConfig::from_env()?;
        if let Some(policy) = self.merge_policy {
            embedding.merge_policy = policy;
        }
        let provider: Arc<dyn EmbeddingProvider> = match &embedding.api_key {
            Some(_) => Arc::new(OpenAIProvider::from_config(&embedding)?),
            None if self.dry_run => {
                warn!("OPENAI_API_KEY not set, dry run uses empty embeddings");
                Arc::new(NullEmbeddingProvider)
            }
            None => bail!("OPENAI_API_KEY is required for embedding updates (or pass --no-embeddings)"),
        };
        let store = store.with_embeddings(provider, self.indexed()?, embedding.merge_policy);
        Ok(Services { store, memory })
    }
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_memory_summary(memory: Option<&Arc<MemoryGraphStore>>) -> anyhow::Result<()> {
    if let Some(memory) = memory {
        let nodes = memory.nodes()?.len();
        let relationships = memory.relationships()?.len();
        info!(
            "In-memory graph holds {} node(s) and {} relationship(s)",
            nodes, relationships
        );
    }
    Ok(())
}

fn run_transform(args: TransformArgs) -> anyhow::Result<()> {
    let field_map = args.field_map.build()?;
    let report = exportfetcher::transform(&field_map, &args.source, &args.output, &args.source_key)
        .with_context(|| format!("failed to transform {}", args.source.display()))?;
    print_json(&report)
}

fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let report = GraphGenerator::new(args.system)
        .generate(&args.input, &args.output)
        .context("graph generation failed")?;
    print_json(&report)
}

async fn run_load(args: LoadArgs) -> anyhow::Result<()> {
    let services = args.store.connect().await?;
    let report = services.store.loader.load(&args.dir).await?;
    let memory = services.memory;
    print_memory_summary(memory.as_ref())?;
    print_json(&report)
}

async fn run_embed(args: EmbedArgs) -> anyhow::Result<()> {
    if args.store.no_embeddings {
        bail!("--no-embeddings cannot be combined with the embed command");
    }
    let services = args.store.connect().await?;
    let updater = services
        .store
        .updater
        .context("embedding updater is not configured")?;

    match args.id {
        Some(raw) => {
            let id = if args.numeric_id {
                let number: i64 = raw
                    .parse()
                    .with_context(|| format!("--id '{raw}' is not an integer"))?;
                JsonValue::from(number)
            } else {
                JsonValue::String(raw)
            };
            match updater.update(&args.label, &id).await? {
                EmbeddingOutcome::Updated { dimensions } => {
                    println!("Updated {} {} ({} dimensions)", args.label, id, dimensions)
                }
                EmbeddingOutcome::NodeNotFound => {
                    println!("No {} node with id {}", args.label, id)
                }
            }
        }
        None => {
            let updated = updater.update_label(&args.label).await?;
            println!("Updated {} {} node(s)", updated, args.label);
        }
    }
    Ok(())
}

async fn run_process(args: ProcessArgs) -> anyhow::Result<()> {
    let object_key = match (&args.object_key, &args.event) {
        (Some(key), _) => key.clone(),
        (None, Some(path)) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read event {}", path.display()))?;
            let event = TriggerEvent::from_json(&raw)?;
            let (bucket, key) = event.object().context("event names no object")?;
            info!("Bucket: {}, Object: {}", bucket, key);
            key.to_string()
        }
        (None, None) => bail!("either --object-key or --event is required"),
    };

    let field_map = args.field_map.build()?;
    let services = args.store.connect().await?;
    let memory = services.memory;
    let pipeline = Pipeline::new(field_map, services.store.loader, &args.work_root)
        .keep_work_dir(args.keep_work_dir);

    let outcome = pipeline.process(&object_key, &args.file).await;
    print_memory_summary(memory.as_ref())?;
    print_json(&outcome.to_response())?;
    if outcome.is_failure() {
        bail!("{}", outcome.message());
    }
    Ok(())
}
