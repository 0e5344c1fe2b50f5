use axum::extract::{Path, State};
use axum::Extension;
use std::collections::HashMap;

use crate::app::AppState;
use crate::auth::Identity;
use crate::database::models::{AttendanceView, LessonPlanRecord, UserRecord};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::policy::Action;

/// GET /registrations - every registered field user
pub async fn list_registrations(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<UserRecord>> {
    state.policy.require(&identity, Action::ListRegistrations, None)?;

    let users = state.stores.users.list_all().await?;
    Ok(ApiResponse::success(state.policy.mask(&identity, users)))
}

/// GET /attendances - attendance joined with the submitting user by phone
pub async fn list_attendances(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<AttendanceView>> {
    state.policy.require(&identity, Action::ListAttendance, None)?;

    let users: HashMap<String, UserRecord> = state
        .stores
        .users
        .list_all()
        .await?
        .into_iter()
        .map(|user| (user.phone.clone(), user))
        .collect();

    let views: Vec<AttendanceView> = state
        .stores
        .attendance
        .list_all()
        .await?
        .into_iter()
        .map(|attendance| {
            let user = users.get(&attendance.phone);
            AttendanceView {
                user_id: user.map(|u| u.id),
                teacher_name: user.map(|u| u.name.clone()),
                school: user.map(|u| u.school.clone()),
                attendance,
            }
        })
        .collect();

    Ok(ApiResponse::success(state.policy.mask(&identity, views)))
}

/// GET /users/:id - one field user; fieldworkers only see their own id
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<UserRecord> {
    state.policy.require(&identity, Action::ViewUser, Some(id))?;

    let user = state
        .stores
        .users
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(ApiResponse::success(state.policy.mask(&identity, user)))
}

/// GET /lessonplans
pub async fn list_lesson_plans(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<LessonPlanRecord>> {
    state.policy.require(&identity, Action::ListLessonPlans, None)?;
    Ok(ApiResponse::success(state.stores.lesson_plans.list_all().await?))
}
