use axum::{extract::State, Json};
use serde::Deserialize;

use super::required;
use crate::app::AppState;
use crate::database::models::{AttendanceRecord, NewAttendance};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct AttendanceRequest {
    pub phone: String,
    pub students_present: i32,
    pub students_absent: i32,
    pub absence_reason: String,
    #[serde(alias = "topic_covered")]
    pub subject: String,
    pub district: String,
}

/// POST /attendance - record one attendance submission
pub async fn submit_attendance(
    State(state): State<AppState>,
    Json(body): Json<AttendanceRequest>,
) -> ApiResult<AttendanceRecord> {
    let phone = state.normalizer.normalize(&body.phone)?;
    if body.students_present < 0 {
        return Err(ApiError::invalid_field("students_present", "Must not be negative"));
    }
    if body.students_absent < 0 {
        return Err(ApiError::invalid_field("students_absent", "Must not be negative"));
    }

    let record = state
        .stores
        .attendance
        .create(NewAttendance {
            phone,
            students_present: body.students_present,
            students_absent: body.students_absent,
            absence_reason: body.absence_reason.trim().to_string(),
            subject: required("subject", &body.subject)?,
            district: required("district", &body.district)?,
        })
        .await?;

    tracing::info!(attendance_id = record.id, "Attendance submitted");
    Ok(ApiResponse::created(record))
}
