//! hookgraph worker binary

use anyhow::Context;
use clap::Parser;
use hookgraph_config::{GraphCompiler, SystemConfig};
use hookgraph_core::exchange::Exchanges;
use hookgraph_worker::services::{GitHubStatusClient, RawConfigFetcher, SchedulerClient};
use hookgraph_worker::{Classifier, JsonLinesListener, OutcomeReporter, ReporterSettings, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookgraph-worker")]
#[command(about = "Builds task graphs for GitHub events read from stdin", long_about = None)]
struct Args {
    /// Service configuration file (KDL)
    #[arg(long, env = "HOOKGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Log as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = match &args.config {
        Some(path) => SystemConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SystemConfig::default(),
    };

    let github_token = std::env::var("GITHUB_TOKEN").context("GITHUB_TOKEN must be set")?;
    let scheduler_token = std::env::var("SCHEDULER_ACCESS_TOKEN").ok();

    let fetcher = RawConfigFetcher::new(config.request_timeout)?;
    let scheduler = SchedulerClient::new(
        config.scheduler_url.clone(),
        scheduler_token,
        config.request_timeout,
    )?;
    let statuses = GitHubStatusClient::new(
        config.github_api_url.clone(),
        github_token,
        config.request_timeout,
    )?;

    let reporter = OutcomeReporter::new(
        GraphCompiler::new(config.compiler_options()),
        Arc::new(fetcher),
        Arc::new(scheduler),
        Arc::new(statuses),
        ReporterSettings::from_config(&config),
    );
    let classifier = Classifier::for_config(&config)?;
    let router = Router::new(Exchanges::github()?, &config, classifier, reporter);

    info!(
        scheduler = %config.scheduler_url,
        route_prefix = %config.route_prefix,
        "Worker starting, reading messages from stdin"
    );

    let mut listener = JsonLinesListener::stdin();
    router.run(&mut listener).await?;

    info!("Worker stopped");
    Ok(())
}
