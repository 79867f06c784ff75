use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use civicgraph_common::{
    CheckpointBackend, Config, FileConfig, Selection, SourceTable, SyncConfig, MAX_RECENT_HOURS,
};
use civicgraph_graph::{migrate::migrate, GraphClient, GraphWriter, Granularity, Period, TrendAggregator};
use civicgraph_sync::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PgCheckpointStore, PgRowSource,
    SyncOrchestrator,
};

#[derive(Parser)]
#[command(name = "civicgraph", about = "Mirror civic news and council records into the knowledge graph")]
struct Cli {
    /// TOML settings file
    #[arg(long, global = true, env = "CIVICGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Override the backlog/range batch size
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drain the backlog of each table, resuming from its checkpoint
    Sync {
        #[arg(long = "table")]
        tables: Vec<SourceTable>,
    },
    /// Re-sync rows stamped within the last N hours
    Recent {
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(i64).range(1..=MAX_RECENT_HOURS))]
        hours: i64,
        #[arg(long = "table")]
        tables: Vec<SourceTable>,
    },
    /// Sync rows stamped within a closed date range
    Range {
        #[arg(long)]
        start: NaiveDate,
        /// Defaults to today
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long = "table")]
        tables: Vec<SourceTable>,
    },
    /// Recompute topic trends for a period
    Trends {
        granularity: Granularity,
        /// Period key (2024-03-05, 2024-W10, 2024-03). Defaults to the last completed period.
        #[arg(long)]
        period: Option<String>,
    },
    /// Inspect or clear persisted cursors
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Create graph constraints and indexes
    Migrate,
}

#[derive(Subcommand)]
enum CheckpointAction {
    Show {
        #[arg(long)]
        table: Option<SourceTable>,
    },
    Reset {
        #[arg(long)]
        table: SourceTable,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("civicgraph=info".parse()?);
    if cli.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("civicgraph starting...");

    let mut settings = FileConfig::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(batch_size) = cli.batch_size {
        anyhow::ensure!(batch_size > 0, "--batch-size must be positive");
        settings.batch_size = batch_size;
    }

    match cli.command {
        Command::Sync { tables } => sync(&settings, tables, Selection::Backlog).await,
        Command::Recent { hours, tables } => sync(&settings, tables, Selection::recent(hours)?).await,
        Command::Range { start, end, tables } => {
            let end = end.unwrap_or_else(|| Utc::now().date_naive());
            sync(&settings, tables, Selection::for_days(start, end)?).await
        }
        Command::Trends { granularity, period } => trends(granularity, period.as_deref()).await,
        Command::Checkpoint { action } => checkpoint(&settings, action).await,
        Command::Migrate => {
            let client = connect_graph(&Config::graph_from_env()?).await?;
            migrate(&client).await.context("Graph migration failed")?;
            info!("Graph constraints and indexes are in place");
            Ok(())
        }
    }
}

async fn sync(settings: &FileConfig, tables: Vec<SourceTable>, selection: Selection) -> Result<()> {
    let config = Config::from_env()?;
    config.log_redacted();

    let source = PgRowSource::connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    let client = connect_graph(&config).await?;
    migrate(&client).await.context("Graph migration failed")?;

    let checkpoints = checkpoint_store(settings, &source).await?;
    let writer = GraphWriter::new(client).with_counter_mode(settings.counter_mode);

    let mut sync_config: SyncConfig = settings.sync_config();
    if !tables.is_empty() {
        sync_config.tables = tables;
    }

    info!(
        selection = %selection,
        tables = ?sync_config.tables,
        batch_size = sync_config.batch_size,
        counter_mode = ?settings.counter_mode,
        "Running sync"
    );

    let orchestrator =
        SyncOrchestrator::new(Arc::new(source), Arc::new(writer), checkpoints, sync_config);
    let report = orchestrator.run(&selection).await?;

    info!("{report}");
    Ok(())
}

async fn trends(granularity: Granularity, key: Option<&str>) -> Result<()> {
    let config = Config::graph_from_env()?;
    config.log_redacted();

    let period = match key {
        Some(key) => Period::parse(granularity, key)?,
        None => Period::last_completed(granularity, Utc::now().date_naive())?,
    };

    let client = connect_graph(&config).await?;
    let rows = TrendAggregator::new(client).aggregate(&period).await?;

    info!(period = %period, pairs = rows.len(), "Trends recomputed");
    for row in &rows {
        println!(
            "{:<24} {:<4} {:<32} {:>6}  {}",
            row.city,
            row.state,
            row.topic,
            row.mention_count,
            row.average_sentiment
                .map(|s| format!("{s:.3}"))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}

async fn checkpoint(settings: &FileConfig, action: CheckpointAction) -> Result<()> {
    let source = match settings.checkpoint {
        CheckpointBackend::Postgres => {
            let config = Config::from_env()?;
            Some(
                PgRowSource::connect(&config.database_url)
                    .await
                    .context("Failed to connect to Postgres")?,
            )
        }
        CheckpointBackend::File | CheckpointBackend::Memory => None,
    };
    let store = match &source {
        Some(source) => checkpoint_store(settings, source).await?,
        None => local_checkpoint_store(settings),
    };

    match action {
        CheckpointAction::Show { table } => {
            let tables = match table {
                Some(table) => vec![table],
                None => SourceTable::ALL.to_vec(),
            };
            for table in tables {
                let cursor = store.load(table).await?;
                if cursor.is_start() {
                    println!("{table}: (none)");
                } else {
                    println!("{table}: {cursor}");
                }
            }
        }
        CheckpointAction::Reset { table } => {
            store.reset(table).await?;
            info!(table = %table, "Checkpoint cleared, next sync starts from the beginning");
        }
    }
    Ok(())
}

async fn checkpoint_store(
    settings: &FileConfig,
    source: &PgRowSource,
) -> Result<Arc<dyn CheckpointStore>> {
    match settings.checkpoint {
        CheckpointBackend::Postgres => {
            let store = PgCheckpointStore::new(source.pool().clone());
            store
                .ensure_schema()
                .await
                .context("Failed to prepare checkpoint table")?;
            Ok(Arc::new(store))
        }
        CheckpointBackend::File | CheckpointBackend::Memory => Ok(local_checkpoint_store(settings)),
    }
}

fn local_checkpoint_store(settings: &FileConfig) -> Arc<dyn CheckpointStore> {
    match settings.checkpoint {
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(settings.checkpoint_dir.clone())),
        _ => Arc::new(MemoryCheckpointStore::new()),
    }
}

async fn connect_graph(config: &Config) -> Result<GraphClient> {
    GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
        .await
        .context("Failed to connect to Neo4j")
}
