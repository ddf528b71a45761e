use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use target_crawler_core::clients::build_http_client;
use target_crawler_core::producers::registry::Registry;
use target_crawler_core::run::{run as run_crawl, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::load_config::{load_config, Secrets};
use crate::pipeline_client::PipelineClient;

/// CLI for target-crawler: discover scan targets and dispatch them as pipelines.
#[derive(Parser)]
#[clap(
    name = "target-crawler",
    version,
    about = "Discover repositories and images from hosting providers and dispatch a paced scan pipeline for each"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl the configured source and dispatch one pipeline per discovered target
    Crawl {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// List the available crawlers
    List,
}

/// Async CLI entrypoint shared by main() and the integration tests
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::List => {
            for name in Registry::NAMES {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Crawl { config } => crawl(config).await,
    }
}

async fn crawl(path: PathBuf) -> Result<()> {
    let config = load_config(path)?;
    let secrets = Secrets::from_env(&config.orchestrator)?;

    let registry = Registry::new(build_http_client()?, secrets.providers);
    let producer = registry.build(&config.source)?;
    let jobs = PipelineClient::new(&config.orchestrator, secrets.orchestrator_token)?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        }
    });

    println!("Crawl starting...");
    let result = run_crawl(producer, &jobs, &config.run, &config.pagination, cancel).await;
    interrupt.abort();

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Crawl failed");
            eprintln!("[ERROR] Crawl failed: {}", e);
            Err(anyhow::Error::new(e))
        }
    }
}

fn print_report(report: &RunReport) {
    println!(
        "Crawl complete. crawler={} run_id={} dispatched={} succeeded={}",
        report.crawler, report.run_id, report.dispatched, report.succeeded
    );
    if report.is_clean() {
        info!(run_id = %report.run_id, "run finished without failures");
    } else {
        println!("{}", report.failures);
    }
}
