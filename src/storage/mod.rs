//! Object storage for lesson plan images.
//!
//! Uploads land in a DigitalOcean Spaces bucket (S3-compatible) under
//! `lesson_plans/YYYY/MM/DD/<uuid><ext>` and are world-readable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::StorageConfig;

type HmacSha256 = Hmac<Sha256>;

pub const ALLOWED_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".webp", ".svg",
];

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object storage is not configured")]
    NotConfigured,

    #[error("File type '{0}' not allowed")]
    UnsupportedFileType(String),

    #[error("Storage request failed: {0}")]
    Transport(String),

    #[error("Storage rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Request signing failed: {0}")]
    Signing(String),
}

/// Where an uploaded blob lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub path: String,
    pub url: String,
}

/// Lower-cased extension of `filename`, including the dot
pub fn file_extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dot = name.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}

/// Build a fresh object path for an uploaded file, refusing non-image extensions
pub fn object_path(filename: &str, now: DateTime<Utc>) -> Result<String, StorageError> {
    let extension = file_extension(filename).unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(StorageError::UnsupportedFileType(extension));
    }

    Ok(format!(
        "lesson_plans/{}/{}{}",
        now.format("%Y/%m/%d"),
        Uuid::new_v4(),
        extension
    ))
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    async fn delete_object(&self, path: &str) -> Result<(), StorageError>;

    fn public_url(&self, path: &str) -> String;

    /// Store `bytes` under a generated path and return where it can be fetched
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        let path = object_path(filename, Utc::now())?;
        self.put_object(&path, bytes, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .await?;

        let url = self.public_url(&path);
        info!(path = %path, "Stored object");
        Ok(StoredObject { path, url })
    }
}

/// DigitalOcean Spaces client signing requests with AWS Signature Version 4
#[derive(Debug, Clone)]
pub struct SpacesStorage {
    client: Client,
    access_key: String,
    secret_key: String,
    region: String,
    bucket: String,
}

impl SpacesStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let (Some(access_key), Some(secret_key)) = (config.access_key.clone(), config.secret_key.clone())
        else {
            return Err(StorageError::NotConfigured);
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            access_key,
            secret_key,
            region: config.region.clone(),
            bucket: config.bucket.clone(),
        })
    }

    fn host(&self) -> String {
        format!("{}.{}.digitaloceanspaces.com", self.bucket, self.region)
    }

    fn object_url(&self, path: &str) -> String {
        format!("https://{}/{}", self.host(), uri_encode_path(path))
    }

    /// Headers to send, including `authorization`, for a request on `path`
    fn signed_headers(
        &self,
        method: &str,
        path: &str,
        payload: &[u8],
        extra: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, StorageError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(payload));

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), self.host()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        headers.extend(
            extra
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string())),
        );
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value))
            .collect();
        let signed_names = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n/{}\n\n{}\n{}\n{}",
            method,
            uri_encode_path(path),
            canonical_headers,
            signed_names,
            payload_hash
        );

        let scope = format!("{}/{}/s3/aws4_request", date, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let mut key = hmac(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes())?;
        for part in [self.region.as_str(), "s3", "aws4_request"] {
            key = hmac(&key, part.as_bytes())?;
        }
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        headers.push((
            "authorization".to_string(),
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
                self.access_key, scope, signed_names, signature
            ),
        ));
        Ok(headers)
    }

    async fn send(&self, request: reqwest::RequestBuilder, path: &str) -> Result<(), StorageError> {
        let response = request.send().await.map_err(|e| {
            error!(path = %path, "Request to Spaces failed: {}", e);
            StorageError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            error!(path = %path, "Spaces error ({}): {}", status, message);
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| StorageError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn uri_encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[async_trait]
impl ObjectStorage for SpacesStorage {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let extra = [("content-type", content_type), ("x-amz-acl", "public-read")];
        let headers = self.signed_headers("PUT", path, &bytes, &extra, Utc::now())?;

        let mut request = self.client.put(self.object_url(path)).body(bytes);
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        self.send(request, path).await
    }

    async fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        let headers = self.signed_headers("DELETE", path, b"", &[], Utc::now())?;

        let mut request = self.client.delete(self.object_url(path));
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            request = request.header(name.as_str(), value.as_str());
        }
        self.send(request, path).await?;
        info!(path = %path, "Deleted object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        self.object_url(path)
    }
}

/// Keeps objects in memory; can be switched into a failing mode
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn objects(&self) -> Result<MutexGuard<'_, HashMap<String, (Vec<u8>, String)>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Transport("memory storage lock poisoned".to_string()))
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Transport("storage unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.objects()?
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, path: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.objects()?.remove(path);
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn spaces() -> SpacesStorage {
        SpacesStorage::from_config(&StorageConfig {
            access_key: Some("AKIDEXAMPLE".to_string()),
            secret_key: Some("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string()),
            region: "sfo3".to_string(),
            bucket: "lessonplans".to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn extension_is_checked_case_insensitively() {
        assert_eq!(file_extension("Plan.PNG").as_deref(), Some(".png"));
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn object_path_is_dated_and_unique() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let first = object_path("plan.JPG", now).unwrap();
        let second = object_path("plan.JPG", now).unwrap();
        assert!(first.starts_with("lesson_plans/2024/03/07/"));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);
    }

    #[test]
    fn non_image_files_are_refused() {
        let result = object_path("notes.pdf", Utc::now());
        assert!(matches!(result, Err(StorageError::UnsupportedFileType(ext)) if ext == ".pdf"));
        assert!(object_path("noextension", Utc::now()).is_err());
    }

    #[test]
    fn spaces_requires_credentials() {
        let config = StorageConfig {
            access_key: None,
            secret_key: None,
            region: "sfo3".to_string(),
            bucket: "b".to_string(),
            timeout_secs: 5,
        };
        assert!(matches!(SpacesStorage::from_config(&config), Err(StorageError::NotConfigured)));
    }

    #[test]
    fn public_url_uses_bucket_subdomain() {
        assert_eq!(
            spaces().public_url("lesson_plans/2024/03/07/a.png"),
            "https://lessonplans.sfo3.digitaloceanspaces.com/lesson_plans/2024/03/07/a.png"
        );
    }

    #[test]
    fn signature_is_stable_for_fixed_time() {
        let storage = spaces();
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
        let extra = [("content-type", "image/png"), ("x-amz-acl", "public-read")];

        let first = storage.signed_headers("PUT", "a.png", b"data", &extra, now).unwrap();
        let second = storage.signed_headers("PUT", "a.png", b"data", &extra, now).unwrap();
        assert_eq!(first, second);

        let (_, authorization) = first.iter().find(|(name, _)| name == "authorization").unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240307/sfo3/s3/aws4_request, \
             SignedHeaders=content-type;host;x-amz-acl;x-amz-content-sha256;x-amz-date, Signature="
        ));

        let other = storage.signed_headers("PUT", "a.png", b"other", &extra, now).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn path_encoding_keeps_slashes() {
        assert_eq!(uri_encode_path("lesson_plans/a b.png"), "lesson_plans/a%20b.png");
    }

    #[tokio::test]
    async fn memory_storage_round_trip() {
        let storage = MemoryStorage::new();
        let stored = storage
            .upload(b"png".to_vec(), "plan.png", Some("image/png"))
            .await
            .unwrap();
        assert!(storage.contains(&stored.path));
        assert_eq!(stored.url, format!("memory://{}", stored.path));

        storage.delete_object(&stored.path).await.unwrap();
        assert!(storage.is_empty());

        storage.set_failing(true);
        assert!(storage.upload(b"png".to_vec(), "plan.png", None).await.is_err());
    }

    #[tokio::test]
    async fn poisoned_memory_storage_reports_failure() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        let holder = storage.clone();
        let _ = std::thread::spawn(move || {
            let _objects = holder.objects.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        let put = storage.put_object("a.png", b"png".to_vec(), "image/png").await;
        assert!(matches!(put, Err(StorageError::Transport(_))));
        assert!(matches!(storage.delete_object("a.png").await, Err(StorageError::Transport(_))));
    }
}
