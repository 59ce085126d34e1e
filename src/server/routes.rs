// backupcenter/src/server/routes.rs
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::io::ReaderStream;

use crate::catalog::{ArchiveRecord, ArchiveSource};
use crate::errors::{AppError, Result};
use crate::restore::{RestoreCredentials, UploadRequest};
use crate::server::auth::RequireAdmin;
use crate::server::AppState;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    #[serde(default = "default_true")]
    pub include_files: bool,
    #[serde(default = "default_true")]
    pub bundle: bool,
}

#[derive(Debug, Serialize)]
pub struct FileRef {
    pub url: String,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BackupFiles {
    pub bundle: Option<FileRef>,
    pub db: Option<FileRef>,
    pub public: Option<FileRef>,
    pub private: Option<FileRef>,
    pub config: Option<FileRef>,
}

#[derive(Debug, Serialize)]
pub struct BackupCreatedResponse {
    pub name: String,
    pub title: String,
    pub files: BackupFiles,
}

#[derive(Debug, Serialize)]
pub struct Downloads {
    pub bundle: Option<String>,
    pub db: Option<String>,
    pub public: Option<String>,
    pub private: Option<String>,
    pub config: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveView {
    pub name: String,
    pub title: String,
    pub source: String,
    pub status: String,
    pub created_on: String,
    pub db_file_path: Option<String>,
    pub db_size: Option<u64>,
    pub public_file_path: Option<String>,
    pub public_size: Option<u64>,
    pub private_file_path: Option<String>,
    pub private_size: Option<u64>,
    pub bundle_file_path: Option<String>,
    pub bundle_size: Option<u64>,
    pub config_file_path: Option<String>,
    pub restore_log_url: Option<String>,
    pub downloads: Downloads,
}

#[derive(Debug, Deserialize)]
pub struct RestoreUploadRequest {
    pub db_file: Option<String>,
    pub public_file: Option<String>,
    pub private_file: Option<String>,
    pub db_root_password: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RestoreArchiveRequest {
    pub archive_name: String,
    pub db_root_password: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreResponse {
    pub restore_log_url: Option<String>,
    pub pre_restore_archive: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
}

fn download_url(rel_path: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("path", rel_path)
        .finish();
    format!("/api/download?{query}")
}

fn file_ref(rel_path: &Option<String>, size: Option<u64>) -> Option<FileRef> {
    rel_path.as_ref().map(|p| FileRef {
        url: download_url(p),
        size,
    })
}

fn archive_view(record: ArchiveRecord) -> ArchiveView {
    ArchiveView {
        downloads: Downloads {
            bundle: record.bundle_file_path.as_deref().map(download_url),
            db: record.db_file_path.as_deref().map(download_url),
            public: record.public_file_path.as_deref().map(download_url),
            private: record.private_file_path.as_deref().map(download_url),
            config: record.config_file_path.as_deref().map(download_url),
        },
        restore_log_url: record.restore_log_path.as_deref().map(download_url),
        name: record.name,
        title: record.title,
        source: record.source.as_str().to_string(),
        status: record.status.as_str().to_string(),
        created_on: record.created_on.to_rfc3339(),
        db_file_path: record.db_file_path,
        db_size: record.db_size,
        public_file_path: record.public_file_path,
        public_size: record.public_size,
        private_file_path: record.private_file_path,
        private_size: record.private_size,
        bundle_file_path: record.bundle_file_path,
        bundle_size: record.bundle_size,
        config_file_path: record.config_file_path,
    }
}

pub async fn create_backup(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<CreateBackupRequest>,
) -> Result<Json<BackupCreatedResponse>> {
    let record = state
        .coordinator
        .create_backup(
            ArchiveSource::Manual,
            None,
            crate::backup::BackupOptions {
                include_files: request.include_files,
                bundle: request.bundle,
            },
        )
        .await?;

    Ok(Json(BackupCreatedResponse {
        files: BackupFiles {
            bundle: file_ref(&record.bundle_file_path, record.bundle_size),
            db: file_ref(&record.db_file_path, record.db_size),
            public: file_ref(&record.public_file_path, record.public_size),
            private: file_ref(&record.private_file_path, record.private_size),
            config: file_ref(&record.config_file_path, None),
        },
        name: record.name,
        title: record.title,
    }))
}

pub async fn list_archives(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<Json<Vec<ArchiveView>>> {
    let records = state.catalog.list()?;
    Ok(Json(records.into_iter().map(archive_view).collect()))
}

pub async fn restore_from_upload(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<RestoreUploadRequest>,
) -> Result<Json<RestoreResponse>> {
    let outcome = state
        .orchestrator
        .restore_from_upload(
            UploadRequest {
                db_file: request.db_file,
                public_file: request.public_file,
                private_file: request.private_file,
            },
            RestoreCredentials {
                db_root_password: request.db_root_password,
                admin_password: request.admin_password,
            },
        )
        .await?;
    Ok(Json(RestoreResponse {
        restore_log_url: Some(download_url(&outcome.restore_log_path)),
        pre_restore_archive: outcome.pre_restore_archive,
    }))
}

pub async fn restore_from_archive(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Json(request): Json<RestoreArchiveRequest>,
) -> Result<Json<RestoreResponse>> {
    let outcome = state
        .orchestrator
        .restore_from_archive(
            &request.archive_name,
            RestoreCredentials {
                db_root_password: request.db_root_password,
                admin_password: request.admin_password,
            },
        )
        .await?;
    Ok(Json(RestoreResponse {
        restore_log_url: Some(download_url(&outcome.restore_log_path)),
        pre_restore_archive: outcome.pre_restore_archive,
    }))
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => "application/gzip",
        Some("json") => "application/json",
        Some("log") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Streams a cataloged artifact. The path goes through the catalog's
/// download sandbox; arbitrary filesystem paths are never served.
pub async fn download_archive_file(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let resolved = state.catalog.resolve_download(&query.path)?;
    let file = tokio::fs::File::open(&resolved).await?;
    let length = file.metadata().await?.len();
    let file_name = resolved
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("archive.bin")
        .to_string();

    let body = Body::from_stream(ReaderStream::new(file));
    let response = Response::builder()
        .header(CONTENT_TYPE, content_type_for(&resolved))
        .header(CONTENT_LENGTH, length)
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        )
        .body(body)
        .map_err(|e| AppError::Anyhow(anyhow::anyhow!("failed to build response: {e}")))?;
    Ok(response)
}
