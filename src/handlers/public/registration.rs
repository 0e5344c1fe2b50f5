use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::required;
use crate::app::AppState;
use crate::database::models::NewUser;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct RegistrationRequest {
    pub phone: String,
    pub name: String,
    pub school: String,
    pub district: String,
    pub language: String,
}

/// POST /register - register a field user; one registration per phone
pub async fn register(State(state): State<AppState>, Json(body): Json<RegistrationRequest>) -> ApiResult<Value> {
    let phone = state.normalizer.normalize(&body.phone)?;
    let user = NewUser {
        phone,
        name: required("name", &body.name)?,
        school: required("school", &body.school)?,
        district: required("district", &body.district)?,
        language: required("language", &body.language)?,
    };

    let record = state.stores.users.create(user).await.map_err(|e| match e {
        crate::database::DatabaseError::DuplicateKey(_) => {
            ApiError::conflict("User with this phone number already exists")
        }
        other => other.into(),
    })?;
    info!(user_id = record.id, "Registered field user");

    Ok(ApiResponse::created(json!({
        "success": true,
        "id": record.id,
        "message": format!("Registered {} successfully", record.name),
    })))
}
