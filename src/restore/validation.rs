// backupcenter/src/restore/validation.rs
use std::path::PathBuf;

use crate::catalog::{ArchiveCatalog, ArchiveStatus};
use crate::errors::{AppError, Result};
use crate::site::SiteContext;

const ALLOWED_DB_EXTENSIONS: &[&str] = &[".sql", ".sql.gz"];

/// Uploaded-file restore inputs, as received from the caller.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub db_file: Option<String>,
    pub public_file: Option<String>,
    pub private_file: Option<String>,
}

/// A validated restore source: resolved artifact paths plus, for archive
/// mode, the catalog record they came from.
#[derive(Debug, Clone)]
pub struct RestoreSource {
    pub db: PathBuf,
    pub public: Option<PathBuf>,
    pub private: Option<PathBuf>,
    pub source_archive: Option<String>,
}

impl RestoreSource {
    pub fn label(&self) -> &str {
        self.source_archive.as_deref().unwrap_or("upload")
    }
}

fn check_db_extension(name: &str) -> Result<()> {
    let lowered = name.to_lowercase();
    if ALLOWED_DB_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "database backup must be a .sql or .sql.gz file".into(),
        ))
    }
}

/// Validates an upload-mode restore: the db file is mandatory, every
/// reference must resolve inside the site root, and the dump must look like
/// a database export.
pub fn validate_upload(site: &SiteContext, request: &UploadRequest) -> Result<RestoreSource> {
    let db_ref = match request.db_file.as_deref() {
        Some(r) if !r.trim().is_empty() => r,
        _ => return Err(AppError::MissingDbFile),
    };
    let db = site.resolve_upload(db_ref)?;
    let file_name = db
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Validation("invalid database file name".into()))?;
    check_db_extension(file_name)?;

    let public = request
        .public_file
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(|r| site.resolve_upload(r))
        .transpose()?;
    let private = request
        .private_file
        .as_deref()
        .filter(|r| !r.trim().is_empty())
        .map(|r| site.resolve_upload(r))
        .transpose()?;

    Ok(RestoreSource {
        db,
        public,
        private,
        source_archive: None,
    })
}

/// Validates an archive-mode restore: the named record must exist, be in
/// `success`, and carry a database artifact. Artifact paths go through the
/// catalog's download sandbox.
pub fn validate_archive(catalog: &ArchiveCatalog, archive_name: &str) -> Result<RestoreSource> {
    let record = catalog.get(archive_name)?;
    if record.status != ArchiveStatus::Success {
        return Err(AppError::Validation(format!(
            "archive {} is in status {} and cannot be restored",
            record.name,
            record.status.as_str()
        )));
    }
    let db_rel = record.db_file_path.as_deref().ok_or_else(|| {
        AppError::Validation(format!(
            "archive {} is missing a database backup file",
            record.name
        ))
    })?;

    let db = catalog.resolve_download(db_rel)?;
    let public = record
        .public_file_path
        .as_deref()
        .map(|p| catalog.resolve_download(p))
        .transpose()?;
    let private = record
        .private_file_path
        .as_deref()
        .map(|p| catalog.resolve_download(p))
        .transpose()?;

    Ok(RestoreSource {
        db,
        public,
        private,
        source_archive: Some(record.name),
    })
}
