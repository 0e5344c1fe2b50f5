// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Field-user OTP, registration and submissions, plus dashboard onboarding and
// login. Every phone number is normalised before any store or gateway is touched.
pub mod attendance;
pub mod dashboard;
pub mod health;
pub mod lesson_plan;
pub mod otp;
pub mod registration;

use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
    pub otp: String,
}

/// Trimmed value of a required text field
pub(crate) fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::invalid_field(field, "This field is required"));
    }
    Ok(value.to_string())
}
