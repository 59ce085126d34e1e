// backupcenter/src/site/mod.rs
//
// Live-site collaborator: store paths, the config snapshot source, the
// maintenance-mode flag, upload resolution and the post-restore migrate hook.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use crate::config::SitePaths;
use crate::errors::{AppError, Result};
use crate::utils::{run_with_timeout, stderr_tail};

const MAINTENANCE_FLAG: &str = ".maintenance_mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Public,
    Private,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Public => "public",
            StoreKind::Private => "private",
        }
    }
}

pub struct SiteContext {
    paths: SitePaths,
    post_restore_cmd: Option<Vec<String>>,
    subprocess_timeout: Duration,
}

impl SiteContext {
    pub fn new(
        paths: SitePaths,
        post_restore_cmd: Option<Vec<String>>,
        subprocess_timeout: Duration,
    ) -> Self {
        SiteContext {
            paths,
            post_restore_cmd,
            subprocess_timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn config_file(&self) -> &Path {
        &self.paths.config_file
    }

    pub fn store_path(&self, kind: StoreKind) -> &Path {
        match kind {
            StoreKind::Public => &self.paths.public_store,
            StoreKind::Private => &self.paths.private_store,
        }
    }

    /// Maps an uploaded-file reference (site-relative path or URL) to an
    /// absolute path, refusing anything that resolves outside the site root.
    /// Only `/private/...` and `/files/...` locations are accepted, matching
    /// where the host platform's upload service places files.
    pub fn resolve_upload(&self, file_ref: &str) -> Result<PathBuf> {
        let path = match Url::parse(file_ref) {
            Ok(url) => url.path().to_string(),
            Err(_) => file_ref.to_string(),
        };
        if path.trim().is_empty() {
            return Err(AppError::Validation("empty upload file reference".into()));
        }
        let normalized = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        if !(normalized.starts_with("/private/") || normalized.starts_with("/files/")) {
            return Err(AppError::Validation(
                "only files uploaded to this site can be restored".into(),
            ));
        }

        let absolute = self.paths.root.join(normalized.trim_start_matches('/'));
        let resolved = absolute
            .canonicalize()
            .map_err(|_| AppError::NotFound(format!("uploaded file {file_ref}")))?;
        let root = self.paths.root.canonicalize()?;
        if !resolved.starts_with(&root) {
            return Err(AppError::Validation("invalid upload file location".into()));
        }
        if !resolved.is_file() {
            return Err(AppError::NotFound(format!("uploaded file {file_ref}")));
        }
        Ok(resolved)
    }

    pub fn maintenance_active(&self) -> bool {
        self.paths.root.join(MAINTENANCE_FLAG).is_file()
    }

    /// Flips the site into maintenance mode. The returned guard removes the
    /// flag on `exit()`; if the guard is dropped without an explicit exit,
    /// the flag is still cleared and the abnormal release is logged.
    pub fn enter_maintenance(self: &Arc<Self>, cause: &str) -> Result<MaintenanceGuard> {
        let flag = self.paths.root.join(MAINTENANCE_FLAG);
        fs::write(
            &flag,
            format!("{} {}\n", chrono::Utc::now().to_rfc3339(), cause),
        )?;
        tracing::info!(cause, "maintenance mode entered");
        Ok(MaintenanceGuard {
            site: Arc::clone(self),
            released: false,
        })
    }

    fn clear_maintenance(&self) -> Result<()> {
        let flag = self.paths.root.join(MAINTENANCE_FLAG);
        if flag.is_file() {
            fs::remove_file(&flag)?;
        }
        Ok(())
    }

    /// Runs the configured post-restore migration hook, if any.
    pub async fn run_post_restore_hook(&self) -> Result<()> {
        let Some(cmd) = &self.post_restore_cmd else {
            return Ok(());
        };
        tracing::info!(program = %cmd[0], "running post-restore hook");
        let mut command = Command::new(&cmd[0]);
        command.args(&cmd[1..]);
        let output = run_with_timeout(command, self.subprocess_timeout)
            .await
            .map_err(|e| AppError::RestoreFailed(format!("post-restore hook: {e}")))?;
        if !output.status.success() {
            tracing::error!(
                status = %output.status,
                stderr_tail = %stderr_tail(&output),
                "post-restore hook failed"
            );
            return Err(AppError::RestoreFailed(
                "post-restore migration hook failed".into(),
            ));
        }
        Ok(())
    }
}

pub struct MaintenanceGuard {
    site: Arc<SiteContext>,
    released: bool,
}

impl MaintenanceGuard {
    pub fn exit(mut self) -> Result<()> {
        self.released = true;
        self.site.clear_maintenance()?;
        tracing::info!("maintenance mode exited");
        Ok(())
    }
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.site.clear_maintenance() {
                tracing::error!(error = %e, "failed to clear maintenance mode on abnormal path");
            } else {
                tracing::error!("maintenance mode released on abnormal path");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site_fixture() -> (tempfile::TempDir, Arc<SiteContext>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        fs::create_dir_all(root.join("private/uploads")).expect("mkdir");
        fs::create_dir_all(root.join("files")).expect("mkdir");
        let paths = SitePaths {
            public_store: root.join("public/files"),
            private_store: root.join("private/files"),
            config_file: root.join("site_config.json"),
            root,
        };
        (
            dir,
            Arc::new(SiteContext::new(paths, None, Duration::from_secs(5))),
        )
    }

    #[test]
    fn test_resolve_upload_accepts_private_files() -> Result<()> {
        let (_dir, site) = site_fixture();
        let target = site.root().join("private/uploads/db.sql.gz");
        fs::write(&target, b"dump")?;

        let resolved = site.resolve_upload("/private/uploads/db.sql.gz")?;
        assert_eq!(resolved, target.canonicalize()?);

        // URL form with a host is accepted too; only the path matters.
        let resolved = site.resolve_upload("https://example.com/private/uploads/db.sql.gz")?;
        assert_eq!(resolved, target.canonicalize()?);
        Ok(())
    }

    #[test]
    fn test_resolve_upload_rejects_outside_locations() {
        let (_dir, site) = site_fixture();
        assert!(matches!(
            site.resolve_upload("/etc/passwd"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            site.resolve_upload("/private/../../etc/passwd"),
            Err(AppError::NotFound(_)) | Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_upload_missing_file_is_not_found() {
        let (_dir, site) = site_fixture();
        assert!(matches!(
            site.resolve_upload("/private/uploads/nope.sql"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_maintenance_guard_clears_flag_on_exit_and_drop() -> Result<()> {
        let (_dir, site) = site_fixture();

        let guard = site.enter_maintenance("restore bk-1")?;
        assert!(site.maintenance_active());
        guard.exit()?;
        assert!(!site.maintenance_active());

        // Dropped without exit (crash path): flag must still be cleared.
        let guard = site.enter_maintenance("restore bk-2")?;
        assert!(site.maintenance_active());
        drop(guard);
        assert!(!site.maintenance_active());
        Ok(())
    }
}
