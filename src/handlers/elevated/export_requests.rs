use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;

use crate::app::AppState;
use crate::auth::Identity;
use crate::database::models::{ExportRequestRecord, ExportStatus};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::Action;

#[derive(Debug, Deserialize)]
pub struct UpdateExportRequest {
    pub status: String,
}

/// GET /dashboard/export-requests/ - every export request, newest first
pub async fn list_export_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<ExportRequestRecord>> {
    state.policy.require(&identity, Action::ListExportRequests, None)?;

    let mut requests = state.stores.export_requests.list_all().await?;
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(ApiResponse::success(requests))
}

/// PATCH /dashboard/export-requests/:id - approve or reject a pending request
pub async fn update_export_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateExportRequest>,
) -> ApiResult<ExportRequestRecord> {
    state.policy.require(&identity, Action::UpdateExportRequest, None)?;

    let status: ExportStatus = body
        .status
        .parse()
        .map_err(|_| ApiError::invalid_field("status", "Must be approved or rejected"))?;
    if status == ExportStatus::Pending {
        return Err(ApiError::invalid_field("status", "Must be approved or rejected"));
    }

    let request = state
        .stores
        .export_requests
        .update_status(id, status, Some(identity.subject_id))
        .await?;

    info!(export_request_id = id, status = %status, decided_by = identity.subject_id, "Export request decided");
    Ok(ApiResponse::success(request))
}
