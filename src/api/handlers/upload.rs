use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::Json;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::api::response::{ApiError, JSend};
use crate::crypto::cipher;
use crate::notify::DownloadLink;
use crate::storage::models::FileRecord;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub group_link: String,
}

/// A file already encrypted to durable storage, waiting for its record.
struct StagedFile {
    id: String,
    filename: String,
    original_name: String,
    relative_path: Option<String>,
    encrypted_path: PathBuf,
}

/// Removes written artifacts when an upload aborts partway. Disarmed once
/// every record is persisted.
#[derive(Default)]
struct UploadRollback {
    paths: Vec<PathBuf>,
}

impl UploadRollback {
    fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    fn disarm(mut self) {
        self.paths.clear();
    }
}

impl Drop for UploadRollback {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to roll back upload artifact");
                }
            }
        }
    }
}

// ============================================================================
// Handler
// ============================================================================

pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let key = state
        .keys
        .current()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut staged: Vec<StagedFile> = Vec::new();
    let mut rollback = UploadRollback::default();
    let mut expiration_field: Option<String> = None;
    let mut email: Option<String> = None;
    let mut send_type: Option<String> = None;
    let mut password: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "files" if field.file_name().is_some() => {
                if staged.len() >= state.config.limits.max_files {
                    return Err(ApiError::bad_request(format!(
                        "Upload exceeds the limit of {} files",
                        state.config.limits.max_files
                    )));
                }

                // Folder uploads arrive with the relative path as the name
                let supplied_name = field.file_name().unwrap_or("file").to_string();
                let relative_path = supplied_name.contains('/').then(|| supplied_name.clone());

                let id = uuid::Uuid::new_v4().to_string();
                let extension = Path::new(&supplied_name)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| format!(".{e}"))
                    .unwrap_or_default();
                let filename = format!("{id}{extension}");

                // Stage the plaintext, then encrypt it to its artifact
                let ingest = state.artifacts.ingest_path(&filename);
                rollback.track(ingest.clone());
                stream_to_file(&mut field, &ingest, state.config.limits.max_file_size).await?;

                let encrypted = state.artifacts.encrypted_path(&filename);
                rollback.track(encrypted.clone());
                let plaintext = tokio::fs::File::open(&ingest)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to read upload: {e}")))?;
                cipher::encrypt(plaintext, &encrypted, &key.material)
                    .await
                    .map_err(|e| ApiError::internal(format!("Failed to encrypt file: {e}")))?;

                if let Err(e) = state.artifacts.remove(&ingest).await {
                    tracing::warn!(path = %ingest.display(), error = %e, "Failed to remove staged plaintext");
                }

                staged.push(StagedFile {
                    id,
                    filename,
                    original_name: supplied_name,
                    relative_path,
                    encrypted_path: encrypted,
                });
            }
            "expiration" => {
                expiration_field = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Invalid expiration: {e}"))
                })?);
            }
            "email" => {
                email = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid email: {e}")))?,
                );
            }
            "sendType" => {
                send_type = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid sendType: {e}")))?,
                );
            }
            "password" => {
                password = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid password: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    if staged.is_empty() {
        return Err(ApiError::bad_request("No files uploaded."));
    }

    let expiration = match expiration_field.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => parse_expiration(raw)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid expiration date: {raw}")))?,
        None => Utc::now() + Duration::days(state.config.default_expiration_days),
    };

    let email = email.filter(|s| !s.is_empty());
    let password = password.filter(|s| !s.is_empty());
    let group_id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();

    // Records are inserted in the order the files were presented
    for file in &staged {
        let record = FileRecord {
            id: file.id.clone(),
            filename: file.filename.clone(),
            original_name: file.original_name.clone(),
            relative_path: file.relative_path.clone(),
            encrypted_path: file.encrypted_path.to_string_lossy().to_string(),
            key_id: key.id,
            expiration: Some(expiration),
            email: email.clone(),
            group_id: group_id.clone(),
            password: password.clone(),
            created_at: now,
        };
        state
            .db
            .insert_file(&record)
            .map_err(|e| ApiError::internal(e.to_string()))?;
    }

    rollback.disarm();

    let group_link = state.config.group_link(&group_id);
    tracing::debug!(group_id = %group_id, files = staged.len(), "Created upload group");

    // Notification is best-effort; a delivery failure never fails the upload
    if send_type.as_deref() == Some("email") {
        if let Some(recipient) = email.as_deref() {
            let links = [DownloadLink {
                url: group_link.clone(),
                label: "Download your files".to_string(),
            }];
            if let Err(e) = state.notifier.send_links(recipient, &links).await {
                tracing::warn!(recipient, error = %e, "Failed to send notification");
            }
        }
    }

    Ok(JSend::success(UploadResponse { group_link }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Stream a multipart field to disk, enforcing the per-file size limit
/// without ever buffering the whole file.
async fn stream_to_file(
    field: &mut Field<'_>,
    dest: &Path,
    max_file_size: u64,
) -> Result<u64, ApiError> {
    let mut output = tokio::fs::File::create(dest)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;

    let mut written: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?
    {
        written += chunk.len() as u64;
        if written > max_file_size {
            return Err(ApiError::payload_too_large(format!(
                "File exceeds maximum size of {max_file_size} bytes"
            )));
        }
        output
            .write_all(&chunk)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;
    }

    output
        .flush()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to stage upload: {e}")))?;
    Ok(written)
}

/// Accepts RFC 3339 timestamps or bare dates (midnight UTC).
fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
