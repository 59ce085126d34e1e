// backupcenter/src/restore/db_restore.rs
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

use crate::backup::archive::gunzip_file;
use crate::backup::db_dump::redacted_db_url;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::utils::{find_executable, run_with_timeout, stderr_tail};

/// Credentials supplied with a restore request. Held only for the duration
/// of the subprocess invocation, never persisted or logged.
#[derive(Default, Clone)]
pub struct RestoreCredentials {
    pub db_root_password: Option<String>,
    pub admin_password: Option<String>,
}

/// Reimports the site database from a dump file using the platform's import
/// tool (psql-compatible invocation). `.sql.gz` dumps are decompressed to a
/// scratch file first. The root password, if given, is passed through
/// `PGPASSWORD`; the admin password through `SITE_ADMIN_PASSWORD`.
pub async fn restore_database(
    database: &DatabaseConfig,
    dump_path: &Path,
    credentials: &RestoreCredentials,
    timeout: Duration,
) -> Result<()> {
    let restore_bin = find_executable(&database.restore_bin)?;

    // Decompressed copy lives in a scratch dir that is removed on drop.
    let scratch = tempfile::tempdir()?;
    let sql_path = if dump_path.extension().and_then(|e| e.to_str()) == Some("gz") {
        gunzip_file(dump_path, &scratch.path().join("database.sql"))?
    } else {
        dump_path.to_path_buf()
    };

    tracing::info!(
        tool = %restore_bin.display(),
        database = %redacted_db_url(&database.url),
        dump = %dump_path.display(),
        "restoring database"
    );

    let mut command = Command::new(&restore_bin);
    command
        .arg("-X")
        .arg("-q")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-d")
        .arg(&database.url)
        .arg("-f")
        .arg(&sql_path);
    if let Some(password) = &credentials.db_root_password {
        command.env("PGPASSWORD", password);
    }
    if let Some(password) = &credentials.admin_password {
        command.env("SITE_ADMIN_PASSWORD", password);
    }

    let output = run_with_timeout(command, timeout)
        .await
        .map_err(|e| AppError::RestoreFailed(format!("database import: {e}")))?;

    if !output.status.success() {
        let detail = stderr_tail(&output);
        tracing::error!(status = %output.status, stderr_tail = %detail, "database restore failed");
        return Err(AppError::RestoreFailed(format!(
            "database import failed: {detail}"
        )));
    }
    Ok(())
}
