//! Cardinal CLI - Command line interface for the graph engine

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use cardinal_core::Schema;
use cardinal_engine::{Engine, EngineConfig};
use cardinal_storage::RedbStore;
use commands::{completions, config as config_cmd, list, node, relate, schema};
use config::{config_file_path, Config};

#[derive(Parser)]
#[command(name = "cardinal")]
#[command(author, version, about = "Graph engine with cardinality-enforced relationships")]
pub struct Cli {
    /// Config file
    #[arg(long, global = true, env = "CARDINAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Schema file (TOML)
    #[arg(short, long, global = true)]
    pub schema: Option<PathBuf>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config_file_path)
    }

    /// Data directory: flag, then config file
    pub fn data_dir(&self, config: &Config) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| config.data_dir.clone())
    }

    /// Schema file: flag, then config file
    pub fn schema_path(&self, config: &Config) -> anyhow::Result<PathBuf> {
        self.schema
            .clone()
            .or_else(|| config.schema.clone())
            .context("No schema configured. Pass --schema or run `cardinal config set schema <path>`")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and inspect nodes
    Node(node::NodeArgs),
    /// Create and delete relationships
    Relate(relate::RelateArgs),
    /// List every committed entity of a type
    List(list::ListArgs),
    /// Inspect the schema
    Schema(schema::SchemaArgs),
    /// Manage configuration
    Config(config_cmd::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
    /// Start the REST server
    Serve {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Application context with the engine over the redb store
pub struct AppContext {
    pub engine: Arc<Engine<RedbStore>>,
    pub config: Config,
}

impl AppContext {
    pub async fn new(cli: &Cli, config: Config) -> anyhow::Result<Self> {
        let data_dir = cli.data_dir(&config);
        std::fs::create_dir_all(&data_dir)?;

        let schema_path = cli.schema_path(&config)?;
        let schema = Schema::load(&schema_path)
            .with_context(|| format!("Failed to load schema from {}", schema_path.display()))?;

        let db_path = data_dir.join("cardinal.redb");
        tracing::debug!("Using database at: {:?}", db_path);
        let store = RedbStore::open(&db_path)?;

        let engine_config =
            EngineConfig::default().with_max_conflict_retries(config.max_conflict_retries);
        let engine = Engine::with_config(Arc::new(store), Arc::new(schema), engine_config);

        Ok(Self {
            engine: Arc::new(engine),
            config,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting cardinal CLI");

    let config_path = cli.config_path();

    // Commands that never touch storage
    match &cli.command {
        Commands::Config(args) => return config_cmd::run(args, &config_path),
        Commands::Completions(args) => return completions::run(args),
        Commands::Schema(args) => {
            let config = Config::load(&config_path)?;
            return schema::run(args, &cli, &config);
        }
        _ => {}
    }

    let config = Config::load(&config_path)?;
    let ctx = AppContext::new(&cli, config).await?;

    match &cli.command {
        Commands::Node(args) => node::run(args, &cli, &ctx).await?,
        Commands::Relate(args) => relate::run(args, &cli, &ctx).await?,
        Commands::List(args) => list::run(args, &cli, &ctx).await?,
        Commands::Serve { bind } => {
            let addr = bind.clone().unwrap_or_else(|| ctx.config.bind.clone());
            tracing::info!("Starting REST server on {}", addr);
            cardinal_rest::serve(ctx.engine.clone(), &addr).await?;
        }
        Commands::Config(_) | Commands::Completions(_) | Commands::Schema(_) => {}
    }

    Ok(())
}
