// backupcenter/src/server/mod.rs
pub mod auth;
pub mod routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use crate::backup::BackupCoordinator;
use crate::catalog::ArchiveCatalog;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::restore::RestoreOrchestrator;
use crate::site::SiteContext;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ArchiveCatalog>,
    pub coordinator: Arc<BackupCoordinator>,
    pub orchestrator: Arc<RestoreOrchestrator>,
    pub admin_token: Arc<str>,
}

/// Wires the engine components from configuration.
pub fn build_state(cfg: &AppConfig) -> Result<AppState> {
    let catalog = Arc::new(ArchiveCatalog::open(&cfg.archive_root)?);
    let site = Arc::new(SiteContext::new(
        cfg.site.clone(),
        cfg.post_restore_cmd.clone(),
        cfg.subprocess_timeout,
    ));
    let coordinator = Arc::new(BackupCoordinator::new(
        Arc::clone(&catalog),
        Arc::clone(&site),
        cfg.database.clone(),
        cfg.subprocess_timeout,
    ));
    let orchestrator = Arc::new(RestoreOrchestrator::new(
        Arc::clone(&catalog),
        Arc::clone(&coordinator),
        site,
        cfg.database.clone(),
        cfg.subprocess_timeout,
    ));
    Ok(AppState {
        catalog,
        coordinator,
        orchestrator,
        admin_token: Arc::from(cfg.admin_token.as_str()),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/backup", post(routes::create_backup))
        .route("/api/archives", get(routes::list_archives))
        .route("/api/restore/upload", post(routes::restore_from_upload))
        .route("/api/restore/archive", post(routes::restore_from_archive))
        .route("/api/download", get(routes::download_archive_file))
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AppError::MissingDbFile => (
                StatusCode::BAD_REQUEST,
                "missing_db_file",
                self.to_string(),
            ),
            AppError::UrlParse(_) => (StatusCode::BAD_REQUEST, "validation_error", self.to_string()),
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, "not_found", format!("not found: {what}"))
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "forbidden".to_string()),
            AppError::PathTraversal(path) => {
                // Security event: an authenticated caller probed outside the
                // archive root. Logged distinctly, answered like any other
                // forbidden request.
                tracing::warn!(target: "security", path = %path, "download path traversal rejected");
                (StatusCode::FORBIDDEN, "forbidden", "forbidden".to_string())
            }
            AppError::InvalidStateTransition { .. } => (
                StatusCode::CONFLICT,
                "invalid_state_transition",
                self.to_string(),
            ),
            AppError::RestoreInProgress => (
                StatusCode::CONFLICT,
                "restore_in_progress",
                self.to_string(),
            ),
            AppError::DumpFailed { detail } => {
                // Raw tool output stays server-side for operators.
                tracing::error!(detail = %detail, "database dump failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "dump_failed",
                    "database dump failed; see server logs".to_string(),
                )
            }
            AppError::RestoreFailed(detail) => {
                tracing::error!(detail = %detail, "restore failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "restore_failed",
                    "restore failed; see server logs and the restore log".to_string(),
                )
            }
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::SerdeJson(_)
            | AppError::Anyhow(_) => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": code, "message": message })),
        )
            .into_response()
    }
}
