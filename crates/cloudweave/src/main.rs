mod commands;
mod output;
mod snapshot;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Converge cloud firewall, NAS and DNS rules to what you declared", long_about = None)]
struct Cli {
    /// Log every merge decision
    #[arg(long, global = true)]
    debug: bool,

    /// Provider profile file (default: discovered, or CLOUDWEAVE_CONFIG_PATH)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    /// Security-group rules
    Secgroup,
    /// DNS record sets
    Dns,
    /// NAS access-group rules
    AccessGroup,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Provider whose profile applies
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Desired rules (JSON or YAML)
    #[arg(short, long)]
    pub local: PathBuf,

    /// Remote state (JSON or YAML)
    #[arg(short, long)]
    pub remote: PathBuf,

    /// Treat the provider as accepting allow rules only
    #[arg(long)]
    pub only_allow: bool,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare desired rules against a remote snapshot
    Diff {
        #[arg(value_enum)]
        resource: Resource,
        #[command(flatten)]
        args: SnapshotArgs,
    },
    /// Reconcile a remote snapshot in memory until it converges
    Reconcile {
        #[arg(value_enum)]
        resource: Resource,
        #[command(flatten)]
        args: SnapshotArgs,
        /// Write the converged remote state to this file
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
    /// List provider profiles
    Providers {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("cloudweave {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let registry = match commands::load_registry(cli.config.as_deref()) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Diff { resource, args } => {
            commands::diff::handle(resource, &args, &registry, cli.debug)?;
        }
        Commands::Reconcile {
            resource,
            args,
            write,
        } => {
            commands::reconcile::handle(resource, &args, write.as_deref(), registry, cli.debug)
                .await?;
        }
        Commands::Providers { json } => {
            commands::providers::handle(&registry, json)?;
        }
        Commands::Version => {
            unreachable!("Version is handled before loading profiles");
        }
    }

    Ok(())
}
