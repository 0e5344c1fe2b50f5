use axum::extract::{Path, State};
use axum::Extension;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::Identity;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::Action;

/// DELETE /lessonplan/:id - remove the blob, then the record.
///
/// A failed blob delete does not block the record delete; the orphaned path is logged.
pub async fn delete_lesson_plan(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    state.policy.require(&identity, Action::DeleteLessonPlan, None)?;

    let plan = state
        .stores
        .lesson_plans
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson plan not found"))?;

    if let Err(e) = state.storage.delete_object(&plan.storage_path).await {
        warn!(
            lesson_plan_id = id,
            path = %plan.storage_path,
            error = %e,
            "Blob delete failed; blob is orphaned and needs manual cleanup"
        );
    }

    if !state.stores.lesson_plans.delete(id).await? {
        return Err(ApiError::not_found("Lesson plan not found"));
    }

    info!(lesson_plan_id = id, deleted_by = identity.subject_id, "Lesson plan deleted");
    Ok(ApiResponse::success(json!({
        "success": true,
        "message": "Lesson plan deleted successfully",
    })))
}
