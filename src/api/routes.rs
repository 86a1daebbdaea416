use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Upload; per-file sizes are enforced while streaming, so the
        // request body itself is unbounded here
        .route(
            "/upload",
            post(handlers::upload).layer(DefaultBodyLimit::disable()),
        )
        // Group listing and password probes
        .route("/api/group/:group_id", get(handlers::list_group))
        .route(
            "/api/verify-password/:group_id",
            post(handlers::verify_password),
        )
        .route(
            "/api/check-password/:group_id",
            get(handlers::check_password),
        )
        // Downloads
        .route(
            "/group/:group_id/download/:file_id",
            get(handlers::download_file),
        )
        .route(
            "/group/:group_id/download-zip",
            get(handlers::download_zip),
        )
        // Legacy pre-group links
        .route("/download/:filename", get(handlers::download_legacy))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled — purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
