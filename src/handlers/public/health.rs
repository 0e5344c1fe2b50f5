use axum::extract::State;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// GET /health - liveness plus database reachability
pub async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    let database = match &state.database {
        None => "in-memory",
        Some(db) => match db.health_check().await {
            Ok(()) => "connected",
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                "unavailable"
            }
        },
    };

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "environment": state.config.environment,
        "database": database,
    })))
}
