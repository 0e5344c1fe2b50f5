use axum::extract::{Multipart, State};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::required;
use crate::app::AppState;
use crate::database::models::NewLessonPlan;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct LessonPlanForm {
    file: Option<UploadedFile>,
    phone: Option<String>,
    score: Option<String>,
    subject: Option<String>,
    feedback: Option<String>,
}

impl LessonPlanForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?.to_vec();
                    form.file = Some(UploadedFile {
                        filename,
                        content_type,
                        bytes,
                    });
                }
                "phone" => form.phone = Some(field.text().await?),
                "score" => form.score = Some(field.text().await?),
                "subject" => form.subject = Some(field.text().await?),
                "feedback" => form.feedback = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }
}

fn missing(field: &str) -> ApiError {
    ApiError::invalid_field(field, "This field is required")
}

/// POST /lessonplan/upload - store a lesson plan image and its review.
///
/// The blob is written first; if the row cannot be written afterwards the blob
/// is deleted again so no record ever points at a missing image.
pub async fn upload_lesson_plan(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Value> {
    let form = LessonPlanForm::read(multipart).await?;

    let phone = state
        .normalizer
        .normalize(form.phone.as_deref().ok_or_else(|| missing("phone"))?)?;
    let score: i32 = form
        .score
        .as_deref()
        .ok_or_else(|| missing("score"))?
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_field("score", "Must be an integer"))?;
    let subject = required("subject", form.subject.as_deref().unwrap_or_default())?;
    let feedback = form.feedback.unwrap_or_default().trim().to_string();

    let file = form.file.ok_or_else(|| missing("file"))?;
    if file.bytes.is_empty() {
        return Err(ApiError::invalid_field("file", "File is empty"));
    }

    let stored = state
        .storage
        .upload(file.bytes, &file.filename, file.content_type.as_deref())
        .await?;

    let created = state
        .stores
        .lesson_plans
        .create(NewLessonPlan {
            phone,
            score,
            subject,
            feedback,
            storage_path: stored.path.clone(),
            original_filename: file.filename,
            public_url: stored.url.clone(),
        })
        .await;

    let record = match created {
        Ok(record) => record,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_object(&stored.path).await {
                warn!(path = %stored.path, error = %cleanup, "Could not remove uploaded blob; blob is orphaned");
            }
            return Err(e.into());
        }
    };

    info!(lesson_plan_id = record.id, path = %record.storage_path, "Lesson plan uploaded");
    Ok(ApiResponse::success(json!({
        "success": true,
        "id": record.id,
        "image_url": record.public_url,
    })))
}
