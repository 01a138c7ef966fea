//! cellctl CLI - run command scripts against a simulated work cell.

use anyhow::{bail, Context, Result};
use cellctl_command::{parse, SchemaRegistry};
use cellctl_device::CellConfig;
use cellctl_execution::{EngineConfig, ProcManager, RecordBuilder, WorkingTask};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "cellctl")]
#[command(about = "Automation cell controller", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate commands without running them
    Check {
        /// Schema file (built-in schemas if omitted)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Cell file used to resolve device names
        #[arg(long, conflicts_with = "kind")]
        cell: Option<PathBuf>,
        /// Validate against this device type instead of a cell
        #[arg(long)]
        kind: Option<String>,
        /// Command text, e.g. "Z1.MA position:10"
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// Run commands on a simulated cell
    Run {
        /// Cell file
        #[arg(long)]
        cell: PathBuf,
        /// Schema file (built-in schemas if omitted)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Engine configuration file
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Run the commands concurrently instead of in order
        #[arg(long)]
        parallel: bool,
        /// Commit the commands as one batch on the cell's runner
        #[arg(long, conflicts_with = "parallel")]
        simultaneous: bool,
        /// Command text
        #[arg(required = true)]
        commands: Vec<String>,
    },
    /// List device types and their operations
    Schema {
        /// Schema file (built-in schemas if omitted)
        #[arg(long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    match cli.command {
        Commands::Check {
            schema,
            cell,
            kind,
            commands,
        } => {
            let schemas = load_schemas(schema.as_deref())?;
            if let Some(cell) = cell {
                let cell = CellConfig::from_path(&cell)
                    .with_context(|| format!("loading cell {}", cell.display()))?
                    .build()?;
                let builder = RecordBuilder::new(&schemas, cell.registry());
                for text in &commands {
                    let record = builder.build_text(text)?;
                    println!("{}", serde_json::to_string(&record)?);
                }
            } else if let Some(kind) = kind {
                for text in &commands {
                    let command = parse(text)?;
                    let checked = schemas.check(&command, &kind, None)?;
                    println!("{}", checked);
                }
            } else {
                bail!("check needs --cell or --kind");
            }
        }
        Commands::Run {
            cell,
            schema,
            engine,
            parallel,
            simultaneous,
            commands,
        } => {
            let schemas = load_schemas(schema.as_deref())?;
            let config = match engine {
                Some(path) => serde_json::from_str::<EngineConfig>(&std::fs::read_to_string(&path)?)
                    .with_context(|| format!("loading engine config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            let cell = CellConfig::from_path(&cell)
                .with_context(|| format!("loading cell {}", cell.display()))?
                .build()?;

            let builder = RecordBuilder::new(&schemas, cell.registry());
            let records = commands
                .iter()
                .map(|text| builder.build_text(text).with_context(|| format!("'{text}'")))
                .collect::<Result<Vec<_>>>()?;

            let root = if simultaneous {
                WorkingTask::simultaneous(records)?
            } else if records.len() == 1 {
                let mut records = records;
                WorkingTask::single(records.remove(0))
            } else {
                let leaves = records.into_iter().map(WorkingTask::single).collect();
                if parallel {
                    WorkingTask::parallel(leaves)?
                } else {
                    WorkingTask::serial(leaves)?
                }
            };

            let cell = Arc::new(cell);
            cell.start()?;
            let manager = ProcManager::new(Arc::clone(&cell), config);
            let (tx, mut rx) = mpsc::unbounded_channel();
            let id = manager.load_task(root, tx)?;
            info!("Submitted task {}", id);

            let event = tokio::select! {
                event = rx.recv() => event,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted, stopping");
                    manager.emergency_stop();
                    rx.recv().await
                }
            };
            cell.shutdown();

            let Some(event) = event else {
                bail!("task {} ended without reporting", id);
            };
            println!("{}", event);
            if !event.is_done() {
                bail!(
                    "task failed on {}",
                    event.failing_device.as_deref().unwrap_or("unknown device")
                );
            }
        }
        Commands::Schema { schema } => {
            let schemas = load_schemas(schema.as_deref())?;
            for (device_type, schema) in schemas.iter() {
                let operations: Vec<&str> =
                    schema.allowed_operations.iter().map(String::as_str).collect();
                println!("{}", device_type);
                println!("  operations: {}", operations.join(", "));
                for (name, ty) in &schema.allowed_parameters {
                    println!("  {}: {}", name, ty);
                }
            }
        }
    }

    Ok(())
}

fn load_schemas(path: Option<&Path>) -> Result<SchemaRegistry> {
    match path {
        Some(path) => SchemaRegistry::from_path(path)
            .with_context(|| format!("loading schema {}", path.display())),
        None => Ok(SchemaRegistry::builtin()),
    }
}
