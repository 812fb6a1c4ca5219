//! pubvar CLI - Command line interface for public_variable
//!
//! Creates, reads and writes variables kept in a single-file document store.
//! Every command prints one JSON object, so the binary can be wrapped by
//! other tools.

use clap::{Parser, Subcommand};
use public_variable::{
    Config, Controller, DocumentId, DocumentStore, FileStore, VariableFactory, VariableOptions,
    VariableParams,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pubvar")]
#[command(about = "Mutable, controller-owned variables over a versioned document store")]
#[command(version)]
struct Cli {
    /// Path to the store file (overrides config and PUBVAR_STORE)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Identity to act as (overrides config and PUBVAR_CONTROLLER)
    #[arg(short, long)]
    controller: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(clap::Args, Clone, Copy, Debug)]
struct ShapeArgs {
    /// Depth of the leaves
    #[arg(long)]
    max_depth: Option<u32>,
    /// Versions per leaf and fanout per internal fragment
    #[arg(long)]
    max_fragments: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new store file
    Init,

    /// Create a brand-new variable
    Create {
        /// Variable name
        name: String,
        #[command(flatten)]
        shape: ShapeArgs,
    },

    /// Get or create the variable with this name and controller
    Deterministic {
        /// Variable name
        name: String,
        #[command(flatten)]
        shape: ShapeArgs,
    },

    /// Read a variable's current value
    Get {
        /// Root id of the variable
        id: String,
    },

    /// Write a new value (parsed as JSON, otherwise stored as a string)
    Set {
        /// Root id of the variable
        id: String,
        /// The new value
        value: String,
    },

    /// Show the active path through a variable's tree
    Inspect {
        /// Root id of the variable
        id: String,
    },

    /// List every stored version of a document
    History {
        /// Document id
        id: String,
    },

    /// Show store status
    Status,

    /// Save the effective settings (flags included) as the config file
    Configure {
        #[command(flatten)]
        shape: ShapeArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    if let Some(controller) = &cli.controller {
        config.controller = Some(controller.clone());
    }

    match &cli.command {
        Commands::Init => {
            let existed = config.store_path.exists();
            let store = FileStore::open_or_create(&config.store_path)?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": if existed {
                        format!("Store already exists at {}", config.store_path.display())
                    } else {
                        format!("Created store at {}", config.store_path.display())
                    }
                }),
            );
        }

        Commands::Create { name, shape } => {
            apply_shape(&mut config, shape);
            let (store, factory) = open_store(&config, true)?;
            let variable = factory.create(name, &config.variable_options()?).await?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "id": variable.id().to_hex(),
                    "controller": variable.controller().to_string(),
                    "max_depth": variable.descriptor().max_depth,
                    "max_fragments": variable.descriptor().max_fragments
                }),
            );
        }

        Commands::Deterministic { name, shape } => {
            apply_shape(&mut config, shape);
            let (store, factory) = open_store(&config, true)?;
            let variable = factory
                .deterministic(name, &config.variable_options()?)
                .await?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "id": variable.id().to_hex(),
                    "controller": variable.controller().to_string(),
                    "max_depth": variable.descriptor().max_depth,
                    "max_fragments": variable.descriptor().max_fragments
                }),
            );
        }

        Commands::Get { id } => {
            let (_store, factory) = open_store(&config, false)?;
            let variable = factory.load(&parse_id(id)?, &read_options(&config)).await?;
            let value = variable.get_json().await?;
            output(
                cli.format,
                &serde_json::json!({
                    "id": id,
                    "value": value,
                    "is_set": value.is_some()
                }),
            );
        }

        Commands::Set { id, value } => {
            let (store, factory) = open_store(&config, false)?;
            let variable = factory.load(&parse_id(id)?, &read_options(&config)).await?;
            let value = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            let leaf = variable.set_json(value).await?;
            store.sync()?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "id": id,
                    "leaf": leaf.document.id.to_hex(),
                    "depth": leaf.coordinate.depth,
                    "index": leaf.coordinate.index,
                    "version": leaf.version_count()
                }),
            );
        }

        Commands::Inspect { id } => {
            let (_store, factory) = open_store(&config, false)?;
            let variable = factory.load(&parse_id(id)?, &read_options(&config)).await?;
            let snapshot = variable.inspect().await?;
            output(cli.format, &serde_json::to_value(&snapshot)?);
        }

        Commands::History { id } => {
            let (store, _factory) = open_store(&config, false)?;
            let versions = store.versions(&parse_id(id)?).await?;
            let items: Vec<_> = versions
                .iter()
                .map(|doc| {
                    serde_json::json!({
                        "version": doc.version_count,
                        "content": doc.content
                    })
                })
                .collect();
            output(
                cli.format,
                &serde_json::json!({
                    "id": id,
                    "count": items.len(),
                    "versions": items
                }),
            );
        }

        Commands::Status => {
            let (store, _factory) = open_store(&config, false)?;
            output(
                cli.format,
                &serde_json::json!({
                    "store": config.store_path.display().to_string(),
                    "documents": store.document_count(),
                    "records": store.record_count(),
                    "controller": config.controller
                }),
            );
        }

        Commands::Configure { shape } => {
            apply_shape(&mut config, shape);
            let path = Config::default_path()?;
            config.save(&path)?;
            output(
                cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "path": path.display().to_string(),
                    "config": config
                }),
            );
        }
    }

    Ok(())
}

fn apply_shape(config: &mut Config, shape: &ShapeArgs) {
    if let Some(depth) = shape.max_depth {
        config.max_depth = depth;
    }
    if let Some(fragments) = shape.max_fragments {
        config.max_fragments = fragments;
    }
}

/// Open the configured store. Only commands that create variables may create
/// the file; everything else needs it to exist already.
fn open_store(config: &Config, create: bool) -> anyhow::Result<(Arc<FileStore>, VariableFactory)> {
    let store = if create {
        FileStore::open_or_create(&config.store_path)?
    } else if config.store_path.exists() {
        FileStore::open(&config.store_path)?
    } else {
        anyhow::bail!("Store not found: {}", config.store_path.display());
    };
    let store = Arc::new(store);
    let caller = config.controller.clone().unwrap_or_default();
    let factory = VariableFactory::new(store.clone(), caller);
    Ok((store, factory))
}

/// Options for binding to an existing root. The shape comes from the root,
/// so only the caller identity and repair policy matter here.
fn read_options(config: &Config) -> VariableOptions {
    config.variable_options().unwrap_or_else(|_| {
        VariableOptions::new(VariableParams::new(
            Controller::new(""),
            config.max_depth,
            config.max_fragments,
        ))
    })
}

fn parse_id(id: &str) -> anyhow::Result<DocumentId> {
    DocumentId::from_hex(id).map_err(|_| anyhow::anyhow!("Invalid document id: {}", id))
}

fn output(format: OutputFormat, value: &serde_json::Value) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Text => serde_json::to_string_pretty(value),
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("failed to render output: {}", e),
    }
}
