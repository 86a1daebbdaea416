use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use super::{ensure_group_access, retrieve_error, supplied_password, PasswordParams};
use crate::api::response::{ApiError, AppQuery};
use crate::transfer::{self, retrieve::FileDownload, GroupLookup};
use crate::AppState;

/// Stream one decrypted file from a group.
/// Route: GET /group/:group_id/download/:file_id
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((group_id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
    AppQuery(params): AppQuery<PasswordParams>,
) -> Result<Response, ApiError> {
    let supplied = supplied_password(&headers, &params);
    ensure_group_access(&state, &group_id, supplied.as_deref())?;

    let download = transfer::fetch_file(
        &state.db,
        &state.keys,
        &state.artifacts,
        &group_id,
        &file_id,
        Utc::now(),
    )
    .await
    .map_err(retrieve_error)?;

    Ok(file_response(download))
}

/// Stream a whole group as a zip archive built on the fly.
/// Route: GET /group/:group_id/download-zip
pub async fn download_zip(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    headers: HeaderMap,
    AppQuery(params): AppQuery<PasswordParams>,
) -> Result<Response, ApiError> {
    let supplied = supplied_password(&headers, &params);
    ensure_group_access(&state, &group_id, supplied.as_deref())?;

    let live = match transfer::resolve(&state.db, &state.artifacts, &group_id, Utc::now())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        GroupLookup::NotFound => {
            return Err(ApiError::not_found("No files found for this link."))
        }
        GroupLookup::AllExpired => return Err(ApiError::gone("Link expired.")),
        GroupLookup::Live(files) => files,
    };

    let bundle = transfer::fetch_bundle(&state.keys, &state.artifacts, &live)
        .await
        .map_err(retrieve_error)?;

    let mut response = (StatusCode::OK, Body::from_stream(bundle.stream)).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/zip"),
    );
    if let Ok(value) = format!("attachment; filename=\"securetransfer_{group_id}.zip\"").parse() {
        response_headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

/// Legacy direct-filename download for pre-group links. No password gate,
/// but expiration is still enforced.
/// Route: GET /download/:filename
pub async fn download_legacy(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    let download = transfer::fetch_legacy(
        &state.db,
        &state.keys,
        &state.artifacts,
        &filename,
        Utc::now(),
    )
    .await
    .map_err(retrieve_error)?;

    Ok(file_response(download))
}

fn file_response(download: FileDownload) -> Response {
    let mime = mime_guess::from_path(&download.original_name).first_or_octet_stream();

    let mut response =
        (StatusCode::OK, Body::from_stream(download.stream)).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        mime.as_ref()
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(download.content_length),
    );

    if let Ok(value) = format!("attachment; filename=\"{}\"", download.original_name).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    response
}
