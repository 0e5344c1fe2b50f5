use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::{OtpRequest, PhoneRequest};
use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

/// POST /send-otp - issue a passcode for a field user's phone
pub async fn send_otp(State(state): State<AppState>, Json(body): Json<PhoneRequest>) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    state.otp.issue(&phone).await?;

    Ok(ApiResponse::success(json!({
        "success": true,
        "message": "OTP sent successfully",
    })))
}

/// POST /verify-otp - check a passcode; every failure kind answers the same
pub async fn verify_otp(State(state): State<AppState>, Json(body): Json<OtpRequest>) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    if !state.otp.verify(&phone, body.otp.trim()).await? {
        return Err(ApiError::invalid_otp());
    }

    Ok(ApiResponse::success(json!({
        "success": true,
        "verified": true,
    })))
}
