mod admin;
mod download;
mod groups;
mod upload;

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::api::response::ApiError;
use crate::transfer::{self, Access, RetrieveError};
use crate::AppState;

pub use admin::{admin_purge, health};
pub use download::{download_file, download_legacy, download_zip};
pub use groups::{check_password, list_group, verify_password};
pub use upload::upload;

/// Password for gated routes, as a query-string fallback.
#[derive(Debug, Deserialize)]
pub struct PasswordParams {
    #[serde(default)]
    pub password: Option<String>,
}

/// The supplied password: `x-password` header first, query parameter second.
fn supplied_password(headers: &HeaderMap, params: &PasswordParams) -> Option<String> {
    headers
        .get("x-password")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .or_else(|| params.password.clone())
}

/// Run the access gate for a group; every listing and group download goes
/// through here before touching file content.
fn ensure_group_access(
    state: &AppState,
    group_id: &str,
    supplied: Option<&str>,
) -> Result<(), ApiError> {
    match transfer::authorize(&state.db, group_id, supplied)
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        Access::Allowed => Ok(()),
        Access::Denied => Err(ApiError::unauthorized("Invalid password")),
        Access::GroupNotFound => Err(ApiError::not_found("No files found for this link.")),
    }
}

/// Map a pipeline outcome to its HTTP shape.
fn retrieve_error(e: RetrieveError) -> ApiError {
    match e {
        RetrieveError::NotFound => ApiError::not_found("File not found."),
        RetrieveError::Gone => ApiError::gone("Link expired."),
        RetrieveError::ArtifactMissing => {
            ApiError::not_found("File is no longer available on the server.")
        }
        other => ApiError::internal(other.to_string()),
    }
}
