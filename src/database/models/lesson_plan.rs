use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::phone::PhoneKey;

/// A reviewed lesson plan image. `storage_path` names the blob in object storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LessonPlanRecord {
    pub id: i64,
    pub phone: String,
    pub score: i32,
    pub subject: String,
    pub feedback: String,
    pub storage_path: String,
    pub original_filename: String,
    pub public_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLessonPlan {
    pub phone: PhoneKey,
    pub score: i32,
    pub subject: String,
    pub feedback: String,
    pub storage_path: String,
    pub original_filename: String,
    pub public_url: String,
}
