use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use roomscout_common::Config;
use roomscout_ingest::bootstrap;
use roomscout_ingest::traits::{DatasetSource, ListingStore};
use roomscout_ingest::IngestPipeline;

mod rest;

pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub datasets: Arc<dyn DatasetSource>,
    pub store: Arc<dyn ListingStore>,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Scraper webhook
        .route("/api/webhook", post(rest::api_webhook))
        .route("/api/hostels/{id}", delete(rest::api_delete_hostel))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        // Logging layer: method + path + status + latency
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("roomscout=info".parse()?))
        .init();

    let config = Config::from_env()?;
    let services = bootstrap::connect(&config).await?;

    let state = Arc::new(AppState {
        pipeline: services.pipeline,
        datasets: services.datasets,
        store: services.store,
    });

    let addr = format!("{}:{}", config.api_host, config.api_port);
    info!("RoomScout API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use roomscout_ingest::testing::{
        fields, listing_for, post, scraper_item, MockDatasetSource, MockExtractor, MockListingStore,
    };
    use roomscout_ingest::PipelineConfig;

    fn app(store: Arc<MockListingStore>, extractor: MockExtractor, source: MockDatasetSource) -> Router {
        let config = PipelineConfig::default().without_delays();
        let pipeline = IngestPipeline::new(store.clone(), Arc::new(extractor), &config);
        router(Arc::new(AppState {
            pipeline: Arc::new(pipeline),
            datasets: Arc::new(source),
            store,
        }))
    }

    fn webhook(body: Value) -> Request<Body> {
        Request::post("/api/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_check_says_ok() {
        let app = app(
            Arc::new(MockListingStore::new()),
            MockExtractor::new(),
            MockDatasetSource::new(),
        );
        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn webhook_runs_pipeline_and_returns_report() {
        let store = Arc::new(MockListingStore::new());
        let app = app(
            store.clone(),
            MockExtractor::new().accept("p1", fields("Phòng Cầu Giấy", 2_500_000)),
            MockDatasetSource::new().on_dataset("ds-1", vec![scraper_item("p1", "phòng 2tr5")]),
        );

        let response = app
            .oneshot(webhook(serde_json::json!({
                "resource": { "defaultDatasetId": "ds-1" }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["stats"]["totalPosts"], 1);
        assert_eq!(body["stats"]["databaseSave"]["successful"], 1);
        assert!(store.get("p1").is_some());
    }

    #[tokio::test]
    async fn webhook_honors_duplicate_flags() {
        let store = Arc::new(MockListingStore::new());
        store.insert(listing_for(&post("p1", "phòng 2tr5")));
        let app = app(
            store.clone(),
            MockExtractor::new().accept("p1", fields("Phòng mới", 2_200_000)),
            MockDatasetSource::new().on_dataset("ds-1", vec![scraper_item("p1", "phòng 2tr2")]),
        );

        let response = app
            .oneshot(webhook(serde_json::json!({
                "resource": { "defaultDatasetId": "ds-1" },
                "skipExactDuplicates": false
            })))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["stats"]["databaseSave"]["updated"], 1);
        assert_eq!(store.get("p1").map(|l| l.price), Some(2_200_000));
    }

    #[tokio::test]
    async fn missing_dataset_id_is_bad_request() {
        let app = app(
            Arc::new(MockListingStore::new()),
            MockExtractor::new(),
            MockDatasetSource::new(),
        );

        let response = app
            .oneshot(webhook(serde_json::json!({ "resource": {} })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Missing defaultDatasetId in request body");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let app = app(
            Arc::new(MockListingStore::new()),
            MockExtractor::new(),
            MockDatasetSource::new(),
        );

        let request = Request::post("/api/webhook")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn unresolvable_dataset_is_server_error() {
        let app = app(
            Arc::new(MockListingStore::new()),
            MockExtractor::new(),
            MockDatasetSource::new(),
        );

        let response = app
            .oneshot(webhook(serde_json::json!({
                "resource": { "defaultDatasetId": "gone" }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to fetch dataset"));
    }

    #[tokio::test]
    async fn delete_marks_listing_unavailable() {
        let store = Arc::new(MockListingStore::new());
        store.insert(listing_for(&post("p1", "phòng")));
        let app = app(store.clone(), MockExtractor::new(), MockDatasetSource::new());

        let response = app
            .oneshot(Request::delete("/api/hostels/p1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let row = store.get("p1").unwrap();
        assert!(!row.available);
        assert_eq!(row.title, "Listing p1");
    }

    #[tokio::test]
    async fn delete_unknown_listing_is_not_found() {
        let app = app(
            Arc::new(MockListingStore::new()),
            MockExtractor::new(),
            MockDatasetSource::new(),
        );

        let response = app
            .oneshot(Request::delete("/api/hostels/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
