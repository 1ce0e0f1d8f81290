//! toolrelay CLI: the main entry point.
//!
//! Commands:
//! - `agent`    : Run the tool loop on one message, or chat interactively
//! - `tools`    : List the tools each configured server offers
//! - `retrieve` : Rank documents against a query
//! - `config`   : Show, create, or locate the config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "Tool-calling agent over MCP servers",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file
    #[arg(short, long, global = true, env = "TOOLRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Skip the retrieval stage even if it is enabled in config
        #[arg(long)]
        no_retrieval: bool,
    },

    /// List tools exposed by the configured tool servers
    Tools,

    /// Rank documents from the configured directory against a query
    Retrieve {
        query: String,

        /// Number of documents to return (defaults to retrieval.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Document directory (defaults to retrieval.documents_dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets masked)
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the agent's answer
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config_path = cli
        .config
        .unwrap_or_else(toolrelay_config::AppConfig::config_path);

    match cli.command {
        Commands::Agent {
            message,
            no_retrieval,
        } => commands::agent::run(&config_path, message, no_retrieval).await?,
        Commands::Tools => commands::tools::run(&config_path).await?,
        Commands::Retrieve { query, top_k, dir } => {
            commands::retrieve::run(&config_path, &query, top_k, dir).await?
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(&config_path).await?,
            ConfigAction::Init { force } => commands::config_cmd::init(&config_path, force).await?,
            ConfigAction::Path => commands::config_cmd::path(&config_path).await?,
        },
    }

    Ok(())
}
