use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ensure_group_access, supplied_password, PasswordParams};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::transfer::{self, GroupLookup};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub id: String,
    pub filename: String,
    pub original_name: String,
    pub relative_path: Option<String>,
    /// Encrypted-artifact size at resolution time
    pub size: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupListing {
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPasswordRequest {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPasswordResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPasswordResponse {
    pub has_password: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// List a group's live files. Gated, and distinguishes "never existed"
/// from "everything expired".
pub async fn list_group(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    AppQuery(params): AppQuery<PasswordParams>,
) -> Result<Json<JSend<GroupListing>>, ApiError> {
    let supplied = supplied_password(&headers, &params);
    ensure_group_access(&state, &group_id, supplied.as_deref())?;

    match transfer::resolve(&state.db, &state.artifacts, &group_id, Utc::now())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        GroupLookup::NotFound => Err(ApiError::not_found("No files found for this link.")),
        GroupLookup::AllExpired => Err(ApiError::gone("Link expired.")),
        GroupLookup::Live(files) => {
            let files = files
                .into_iter()
                .map(|f| FileDescriptor {
                    id: f.record.id,
                    filename: f.record.filename,
                    original_name: f.record.original_name,
                    relative_path: f.record.relative_path,
                    size: f.size,
                })
                .collect();
            Ok(JSend::success(GroupListing { files }))
        }
    }
}

/// Explicit password check used by the download page before it unlocks.
pub async fn verify_password(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    AppJson(req): AppJson<VerifyPasswordRequest>,
) -> Result<Json<JSend<VerifyPasswordResponse>>, ApiError> {
    let record = state
        .db
        .first_file_in_group(&group_id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    let valid = match record.password.as_deref() {
        None | Some("") => true,
        Some(stored) => req.password.as_deref() == Some(stored),
    };

    Ok(JSend::success(VerifyPasswordResponse { valid }))
}

/// Whether a group is password-gated at all, so the client knows to prompt.
pub async fn check_password(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
) -> Result<Json<JSend<CheckPasswordResponse>>, ApiError> {
    let record = state
        .db
        .first_file_in_group(&group_id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("Group not found"))?;

    let has_password = !record.password.as_deref().unwrap_or("").is_empty();

    Ok(JSend::success(CheckPasswordResponse { has_password }))
}
