mod cmd;
mod output;

use clap::{Parser, Subcommand};
use fleetci_core::types::WorkflowKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fleetci",
    about = "Pipeline dashboard for a fleet of GitHub Actions workflows",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "FLEETCI_CONFIG", default_value = "fleetci.yaml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP / SSE / WebSocket server and the run monitor
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8787")]
        port: u16,
    },

    /// Load and validate the configuration
    Check,

    /// Aggregate once and print the current runs
    Dashboard {
        /// Only apps owned by this team
        #[arg(long)]
        team: Option<String>,
        /// Only runs on this branch
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show how a run name is interpreted
    Parse {
        /// Run display name, e.g. main-web-build-1.4.0
        name: String,
        /// Workflow kind the name belongs to
        #[arg(long, default_value = "build")]
        kind: WorkflowKind,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Serve { port } => cmd::serve::run(&cli.config, port),
        Commands::Check => cmd::check::run(&cli.config, cli.json),
        Commands::Dashboard { team, branch } => {
            cmd::dashboard::run(&cli.config, team.as_deref(), branch.as_deref(), cli.json)
        }
        Commands::Parse { name, kind } => cmd::parse::run(&name, kind, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
