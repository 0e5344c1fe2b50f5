use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::info;

use crate::app::AppState;
use crate::auth::Identity;
use crate::database::models::{ExportRequestRecord, NewExportRequest};
use crate::error::ApiError;
use crate::handlers::public::required;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::Action;

#[derive(Debug, Deserialize)]
pub struct CreateExportRequest {
    pub data_type: String,
    pub record_count: i64,
    pub reason: String,
}

/// POST /dashboard/export-requests/ - file a pending export request as the caller
pub async fn create_export_request(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<CreateExportRequest>,
) -> ApiResult<ExportRequestRecord> {
    state.policy.require(&identity, Action::CreateExportRequest, None)?;

    let data_type = required("data_type", &body.data_type)?;
    let reason = required("reason", &body.reason)?;
    if body.record_count < 0 {
        return Err(ApiError::invalid_field("record_count", "Must not be negative"));
    }

    let requester = state
        .stores
        .dashboard_users
        .get_by_id(identity.subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let request = state
        .stores
        .export_requests
        .create(NewExportRequest {
            requester_id: requester.id,
            requester_name: requester.name,
            requester_phone: requester.phone,
            data_type,
            record_count: body.record_count,
            reason,
        })
        .await?;

    info!(export_request_id = request.id, requester_id = request.requester_id, "Export request created");
    Ok(ApiResponse::created(request))
}

/// GET /dashboard/export-requests/user/:id - one requester's export requests
pub async fn list_user_export_requests(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(user_id): Path<i64>,
) -> ApiResult<Vec<ExportRequestRecord>> {
    state
        .policy
        .require(&identity, Action::ViewUserExportRequests, Some(user_id))?;

    let requests = state.stores.export_requests.list_by_requester(user_id).await?;
    Ok(ApiResponse::success(requests))
}
