use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use resource_store::{Store, CONFIG_ENV};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Session;

#[derive(Parser)]
#[command(name = "edgectl")]
#[command(about = "Deploy and manage edge control planes, agents and connectors")]
#[command(version)]
struct Cli {
    /// State file path
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Namespace to act in; defaults to the configured default namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// More output; repeat for debug logs
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Give up on the whole command after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a namespace
    Create {
        #[command(subcommand)]
        command: commands::create::CreateCommands,
    },

    /// Deploy a control plane, agents or connectors
    Deploy {
        #[command(subcommand)]
        command: commands::deploy::DeployCommands,
    },

    /// Delete resources
    Delete {
        #[command(subcommand)]
        command: commands::delete::DeleteCommands,
    },

    /// List resources
    Get {
        #[command(subcommand)]
        command: commands::get::GetCommands,
    },

    /// Unbind an agent from its control plane, keeping it installed
    Detach {
        #[command(subcommand)]
        command: commands::attach::DetachCommands,
    },

    /// Bind a detached agent to a control plane
    Attach {
        #[command(subcommand)]
        command: commands::attach::AttachCommands,
    },

    /// Rename a resource
    Rename {
        #[command(subcommand)]
        command: commands::rename::RenameCommands,
    },

    /// Move an agent or microservice
    Move {
        #[command(subcommand)]
        command: commands::relocate::MoveCommands,
    },

    /// Upgrade an agent
    Upgrade {
        #[command(subcommand)]
        command: commands::upgrade::UpgradeCommands,
    },

    /// Change local settings
    Configure {
        #[command(subcommand)]
        command: commands::configure::ConfigureCommands,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(session: &Session<'_>, command: Commands) -> Result<()> {
    match command {
        Commands::Create { command } => commands::create::run(session, command).await,
        Commands::Deploy { command } => commands::deploy::run(session, command).await,
        Commands::Delete { command } => commands::delete::run(session, command).await,
        Commands::Get { command } => commands::get::run(session, command).await,
        Commands::Detach { command } => commands::attach::detach(session, command).await,
        Commands::Attach { command } => commands::attach::attach(session, command).await,
        Commands::Rename { command } => commands::rename::run(session, command).await,
        Commands::Move { command } => commands::relocate::run(session, command).await,
        Commands::Upgrade { command } => commands::upgrade::run(session, command).await,
        Commands::Configure { command } => commands::configure::run(session, command),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let path = match cli.config {
        Some(path) => path,
        None => Store::default_path().context("Failed to locate the state file")?,
    };
    let store = Store::load(&path)
        .with_context(|| format!("Failed to load state from {}", path.display()))?;

    let mut settings = provisioner::Settings::default();
    if let Some(secs) = cli.timeout {
        settings = settings.with_timeout(Duration::from_secs(secs));
    }
    let namespace = cli
        .namespace
        .unwrap_or_else(|| store.default_namespace());
    let session = Session::new(&store, settings, namespace);

    let outcome = dispatch(&session, cli.command).await;

    // Whatever succeeded before a failure is still recorded
    let flushed = store
        .flush()
        .with_context(|| format!("Failed to write state to {}", path.display()));
    match (outcome, flushed) {
        (Err(e), Err(flush)) => {
            eprintln!("Error: {:#}", flush);
            Err(e)
        }
        (Err(e), Ok(_)) => Err(e),
        (Ok(()), Err(flush)) => Err(flush),
        (Ok(()), Ok(written)) => {
            debug!("State file {}", if written { "updated" } else { "unchanged" });
            Ok(())
        }
    }
}
