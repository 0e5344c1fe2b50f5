use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::{required, OtpRequest, PhoneRequest};
use crate::app::AppState;
use crate::auth::{Identity, Role};
use crate::database::models::{DashboardUserRecord, NewDashboardUser};
use crate::database::DatabaseError;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

const ALREADY_REGISTERED: &str = "User with this phone number already exists";

#[derive(Debug, Deserialize)]
pub struct DashboardRegisterRequest {
    pub phone: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub user_id: i64,
    pub role: Role,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// POST /dashboard/send-registration-otp
pub async fn send_registration_otp(
    State(state): State<AppState>,
    Json(body): Json<PhoneRequest>,
) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    if state.stores.dashboard_users.find_by_phone(&phone).await?.is_some() {
        return Err(ApiError::conflict(ALREADY_REGISTERED));
    }

    state.otp.issue(&phone).await?;
    Ok(ApiResponse::success(json!({
        "success": true,
        "message": "OTP sent successfully",
    })))
}

/// POST /dashboard/verify-registration-otp
pub async fn verify_registration_otp(
    State(state): State<AppState>,
    Json(body): Json<OtpRequest>,
) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    if !state.otp.verify(&phone, body.otp.trim()).await? {
        return Err(ApiError::invalid_otp());
    }
    Ok(ApiResponse::success(json!({ "verified": true })))
}

/// POST /dashboard/register - needs a verified registration OTP, which it consumes
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<DashboardRegisterRequest>,
) -> ApiResult<DashboardUserRecord> {
    let phone = state.normalizer.normalize(&body.phone)?;
    let name = required("name", &body.name)?;
    let role: Role = body
        .role
        .parse()
        .map_err(|e: crate::auth::ParseRoleError| ApiError::invalid_field("role", e.to_string()))?;

    if state.stores.dashboard_users.find_by_phone(&phone).await?.is_some() {
        return Err(ApiError::conflict(ALREADY_REGISTERED));
    }
    if !state.otp.take_verified(&phone).await? {
        return Err(ApiError::bad_request("Phone number must be verified before registering"));
    }

    let user = state
        .stores
        .dashboard_users
        .create(NewDashboardUser {
            phone,
            name,
            role,
            is_verified: true,
        })
        .await
        .map_err(|e| match e {
            DatabaseError::DuplicateKey(_) => ApiError::conflict(ALREADY_REGISTERED),
            other => other.into(),
        })?;

    info!(dashboard_user_id = user.id, role = %user.role, "Registered dashboard user");
    Ok(ApiResponse::created(user))
}

/// POST /dashboard/send-login-otp
pub async fn send_login_otp(State(state): State<AppState>, Json(body): Json<PhoneRequest>) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    if state.stores.dashboard_users.find_by_phone(&phone).await?.is_none() {
        return Err(ApiError::not_found("User not found. Please register first."));
    }

    state.otp.issue(&phone).await?;
    Ok(ApiResponse::success(json!({
        "success": true,
        "message": "OTP sent successfully",
    })))
}

/// POST /dashboard/login - exchange a login OTP for a session token
pub async fn login(State(state): State<AppState>, Json(body): Json<OtpRequest>) -> ApiResult<LoginResponse> {
    let phone = state.normalizer.normalize(&body.phone)?;
    let user = state
        .stores
        .dashboard_users
        .find_by_phone(&phone)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !state.otp.verify(&phone, body.otp.trim()).await? {
        return Err(ApiError::invalid_otp());
    }
    state.otp.take_verified(&phone).await?;

    let identity = Identity {
        subject_id: user.id,
        role: user.role,
    };
    let session = state.sessions.issue(&identity)?;
    info!(dashboard_user_id = user.id, role = %user.role, "Issued session");

    Ok(ApiResponse::success(LoginResponse {
        access_token: session.token,
        token_type: "bearer",
        user_id: user.id,
        role: user.role,
        expires_at: session.expires_at,
    }))
}
