use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use apify_client::RunData;
use roomscout_common::RoomScoutError;
use roomscout_ingest::{DedupOptions, PipelineReport};

use crate::AppState;

/// Scraper run-finished webhook.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    resource: Option<RunData>,
    #[serde(default)]
    skip_exact_duplicates: Option<bool>,
    #[serde(default)]
    skip_similar_duplicates: Option<bool>,
}

impl WebhookRequest {
    fn dataset_id(&self) -> Option<&str> {
        self.resource.as_ref().and_then(RunData::dataset_id)
    }

    fn options(&self) -> DedupOptions {
        let defaults = DedupOptions::default();
        DedupOptions {
            skip_exact: self.skip_exact_duplicates.unwrap_or(defaults.skip_exact),
            skip_similar: self.skip_similar_duplicates.unwrap_or(defaults.skip_similar),
        }
    }
}

pub async fn api_webhook(
    State(state): State<Arc<AppState>>,
    body: Result<Json<WebhookRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected webhook body");
            return fatal(RoomScoutError::Input(format!(
                "Invalid request body: {}",
                rejection.body_text()
            )));
        }
    };

    let Some(dataset_id) = body.dataset_id() else {
        return fatal(RoomScoutError::Input(
            "Missing defaultDatasetId in request body".to_string(),
        ));
    };
    info!(dataset_id, "Webhook received");

    match state
        .pipeline
        .ingest_dataset(state.datasets.as_ref(), dataset_id, body.options())
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => fatal(e),
    }
}

fn fatal(error: RoomScoutError) -> Response {
    let status = match &error {
        RoomScoutError::Input(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(%status, error = %error, "Webhook failed");
    let report = PipelineReport::fatal(Uuid::new_v4(), error.detail());
    (status, Json(report)).into_response()
}
