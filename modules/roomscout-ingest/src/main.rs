use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomscout_common::{Config, ValidationMode};
use roomscout_ingest::{bootstrap, DedupOptions};

/// Ingest one scraper dataset: classify, extract, persist, report.
#[derive(Parser, Debug)]
#[command(name = "roomscout-ingest", version)]
struct Args {
    /// Scraper dataset to ingest.
    #[arg(long, env = "DATASET_ID")]
    dataset_id: String,

    /// Extract exact duplicates too (redeliveries update their listing).
    #[arg(long)]
    keep_exact: bool,

    /// Drop similar duplicates before extraction.
    #[arg(long)]
    skip_similar: bool,

    /// Require both title and price before saving.
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roomscout=info".parse()?))
        .init();

    let args = Args::parse();
    info!("RoomScout ingest starting...");

    let mut config = Config::from_env()?;
    if args.strict {
        config.validation_mode = ValidationMode::Strict;
    }

    let services = bootstrap::connect(&config).await?;
    let options = DedupOptions {
        skip_exact: !args.keep_exact,
        skip_similar: args.skip_similar,
    };

    match services
        .pipeline
        .ingest_dataset(services.datasets.as_ref(), &args.dataset_id, options)
        .await
    {
        Ok(report) => {
            info!("{report}");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Ingest failed");
            Err(e.into())
        }
    }
}
