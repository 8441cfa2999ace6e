use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use tracing::{info, warn};

use crate::AppState;

/// Soft delete: the row stays, `available` flips to false.
pub async fn api_delete_hostel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.soft_delete(&id).await {
        Ok(true) => {
            info!(%id, "Listing marked unavailable");
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": true, "id": id})),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": "Listing not found"})),
        ),
        Err(e) => {
            warn!(%id, error = %e, "Soft delete failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"success": false, "error": e.to_string()})),
            )
        }
    }
}
