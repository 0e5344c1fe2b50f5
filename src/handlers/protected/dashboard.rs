use axum::extract::State;
use axum::Extension;

use crate::app::AppState;
use crate::auth::Identity;
use crate::database::models::DashboardUserRecord;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::Action;

/// GET /dashboard/me - the caller's own dashboard account
pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<DashboardUserRecord> {
    state
        .policy
        .require(&identity, Action::ViewOwnProfile, Some(identity.subject_id))?;

    let user = state
        .stores
        .dashboard_users
        .get_by_id(identity.subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::success(user))
}
