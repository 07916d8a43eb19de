//! hookgraph CLI tool.

use clap::{Parser, Subcommand};
use hookgraph_config::SystemConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "hookgraph")]
#[command(about = "Inspect hookgraph configuration and topology", long_about = None)]
struct Cli {
    /// Service configuration file (KDL)
    #[arg(long, env = "HOOKGRAPH_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a local .taskclusterrc for an event and print the task graph
    Validate {
        /// Path to the configuration file
        #[arg(default_value = ".taskclusterrc")]
        path: PathBuf,
        /// Event type, e.g. pull_request.opened or push
        #[arg(long, default_value = "pull_request.opened")]
        event: String,
        #[arg(long, default_value = "local")]
        org: String,
        #[arg(long, default_value = "local")]
        repo: String,
        #[arg(long, default_value = "master")]
        branch: String,
        /// Head commit sha
        #[arg(long)]
        sha: Option<String>,
        /// Head user
        #[arg(long)]
        user: Option<String>,
    },
    /// Print the exchange reference document
    Reference {
        /// Exchange prefix (defaults to the configured one)
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the URL the config file is fetched from
    ConfigUrl {
        #[arg(long)]
        org: String,
        #[arg(long)]
        repo: String,
        #[arg(long)]
        branch: String,
    },
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SystemConfig::load(path)?,
        None => SystemConfig::default(),
    };

    match cli.command {
        Commands::Validate {
            path,
            event,
            org,
            repo,
            branch,
            sha,
            user,
        } => {
            let target = commands::validate::Target {
                event,
                organization: org,
                repository: repo,
                branch,
                sha,
                user,
            };
            commands::validate::run(&config, &path, target)?;
        }
        Commands::Reference { prefix } => {
            commands::reference(&config, prefix)?;
        }
        Commands::ConfigUrl { org, repo, branch } => {
            commands::config_url(&config, &org, &repo, &branch);
        }
    }

    Ok(())
}
