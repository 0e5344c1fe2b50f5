// HTTP API Error Types
use axum::{
    extract::multipart::MultipartError,
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::SessionError;
use crate::database::DatabaseError;
use crate::otp::OtpError;
use crate::phone::PhoneError;
use crate::policy::PolicyError;
use crate::storage::StorageError;

/// Generic message for failures whose detail stays in the server log
const UPSTREAM_MESSAGE: &str = "An error occurred while processing your request";

/// Returned for every OTP failure kind so callers cannot tell them apart
pub const INVALID_OTP_MESSAGE: &str = "Invalid or expired OTP";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
        }
    }

    /// Stable reason string for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.error_code(),
            "message": self.message(),
        });

        if let ApiError::ValidationError {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            body["field_errors"] = json!(field_errors);
        }
        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// A validation error naming one offending field
    pub fn invalid_field(field: &str, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), problem.into());
        Self::validation_error(format!("Invalid field: {}", field), Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn invalid_otp() -> Self {
        ApiError::BadRequest(INVALID_OTP_MESSAGE.to_string())
    }

    /// Log `detail` and answer with a generic 500
    pub fn upstream(context: &str, detail: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, detail);
        ApiError::InternalServerError(UPSTREAM_MESSAGE.to_string())
    }
}

// Convert domain errors to ApiError
impl From<PhoneError> for ApiError {
    fn from(err: PhoneError) -> Self {
        ApiError::invalid_field("phone", err.to_string())
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::DeliveryFailed(detail) => ApiError::upstream("OTP delivery failed", detail),
            OtpError::Store(detail) => ApiError::upstream("OTP store error", detail),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidToken | SessionError::InvalidClaims => {
                ApiError::unauthorized("Invalid or expired token")
            }
            SessionError::TokenGeneration(_) | SessionError::InvalidSecret => {
                ApiError::upstream("Session issuer error", err)
            }
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        ApiError::forbidden(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DuplicateKey(_) => ApiError::conflict("Record already exists"),
            DatabaseError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            DatabaseError::InvalidTransition { current } => {
                ApiError::conflict(format!("Export request is already {}", current))
            }
            // Don't expose internal SQL errors to clients
            DatabaseError::Sqlx(_) | DatabaseError::ConfigMissing(_) => ApiError::upstream("Database error", err),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnsupportedFileType(_) => ApiError::invalid_field("file", err.to_string()),
            _ => ApiError::upstream("Object storage error", err),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let mut response = (status, Json(self.to_json())).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ExportStatus;

    #[test]
    fn duplicate_key_is_conflict() {
        let err: ApiError = DatabaseError::DuplicateKey("users.phone".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.message(), "Record already exists");
    }

    #[test]
    fn terminal_transition_is_conflict() {
        let err: ApiError = DatabaseError::InvalidTransition {
            current: ExportStatus::Approved,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn upstream_detail_is_not_leaked() {
        let err: ApiError = OtpError::DeliveryFailed("twilio 401: bad credentials".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message().contains("twilio"));
    }

    #[test]
    fn phone_error_names_field() {
        let err: ApiError = PhoneError::InvalidPhoneFormat("123".to_string()).into();
        let body = err.to_json();
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert!(body["field_errors"]["phone"].is_string());
    }

    #[test]
    fn unauthorized_carries_challenge() {
        let response = ApiError::unauthorized("Missing Authorization header").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
