//! Production wiring shared by the CLI and the HTTP service.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ai_client::OpenRouter;
use apify_client::ApifyClient;
use roomscout_common::Config;

use crate::config::PipelineConfig;
use crate::extractor::ListingExtractor;
use crate::pipeline::IngestPipeline;
use crate::store::PgListingStore;
use crate::traits::{DatasetSource, ListingStore};

pub struct Services {
    pub store: Arc<dyn ListingStore>,
    pub datasets: Arc<dyn DatasetSource>,
    pub pipeline: Arc<IngestPipeline>,
}

/// Connect to Postgres, run migrations and assemble the pipeline.
pub async fn connect(config: &Config) -> Result<Services> {
    let store = PgListingStore::connect(&config.database_url).await?;
    store.migrate().await?;
    info!("Database migrations applied");

    let store: Arc<dyn ListingStore> = Arc::new(store);
    let pipeline_config = PipelineConfig::from_config(config);

    let completion = OpenRouter::new(&config.openrouter_api_key, &config.openrouter_chat_model)
        .with_app_name("roomscout");
    let extractor = ListingExtractor::new(
        Arc::new(completion),
        pipeline_config.extraction.clone(),
        pipeline_config.validation,
    );

    let pipeline = IngestPipeline::new(store.clone(), Arc::new(extractor), &pipeline_config);
    let datasets = ApifyClient::new(config.apify_api_token.clone());

    Ok(Services {
        store,
        datasets: Arc::new(datasets),
        pipeline: Arc::new(pipeline),
    })
}
