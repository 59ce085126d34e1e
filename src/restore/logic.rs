// backupcenter/src/restore/logic.rs
//
// Restore state machine. Phases run in order:
//   Validating -> Snapshotting -> RestoringDb -> RestoringFiles -> Finalizing
// A global try-lock keeps at most one restore in flight; a losing request
// fails with RestoreInProgress before anything is touched. No restore
// proceeds without a pre-restore snapshot, and maintenance mode is entered
// only for the destructive phases with a guaranteed exit on every terminal
// path.

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backup::archive::extract_tar_gz;
use crate::backup::{BackupCoordinator, BackupOptions};
use crate::catalog::{ArchiveCatalog, ArchiveSource};
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::restore::db_restore::{restore_database, RestoreCredentials};
use crate::restore::validation::{self, RestoreSource, UploadRequest};
use crate::site::{SiteContext, StoreKind};

const RESTORE_LOG_DIRNAME: &str = "restore_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePhase {
    Validating,
    Snapshotting,
    RestoringDb,
    RestoringFiles,
    Finalizing,
}

impl RestorePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorePhase::Validating => "validating",
            RestorePhase::Snapshotting => "snapshotting",
            RestorePhase::RestoringDb => "restoring_db",
            RestorePhase::RestoringFiles => "restoring_files",
            RestorePhase::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub restore_log_path: String,
    pub pre_restore_archive: Option<String>,
}

/// Durable per-restore log, appended step by step so a crash mid-restore
/// still leaves the cause on disk.
struct RestoreLog {
    file: fs::File,
    rel_path: String,
}

impl RestoreLog {
    fn create(archive_root: &Path) -> Result<Self> {
        let dir = archive_root.join(RESTORE_LOG_DIRNAME);
        fs::create_dir_all(&dir)?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "restore_{}_{}.log",
            Utc::now().format("%Y%m%d_%H%M%S"),
            &suffix[..6]
        );
        let file = fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(dir.join(&file_name))?;
        Ok(RestoreLog {
            file,
            rel_path: format!("{RESTORE_LOG_DIRNAME}/{file_name}"),
        })
    }

    fn rel_path(&self) -> &str {
        &self.rel_path
    }

    fn step(&mut self, phase: &str, outcome: &str) {
        let line = format!("{} {}: {}\n", Utc::now().to_rfc3339(), phase, outcome);
        if let Err(e) = self.file.write_all(line.as_bytes()).and_then(|()| self.file.flush()) {
            tracing::warn!(error = %e, "failed to append to restore log");
        }
    }

    fn step_timed(&mut self, phase: &str, outcome: &str, started: Instant) {
        self.step(
            phase,
            &format!("{} ({:.1}s)", outcome, started.elapsed().as_secs_f64()),
        );
    }
}

pub struct RestoreOrchestrator {
    catalog: Arc<ArchiveCatalog>,
    coordinator: Arc<BackupCoordinator>,
    site: Arc<SiteContext>,
    database: DatabaseConfig,
    subprocess_timeout: Duration,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl RestoreOrchestrator {
    pub fn new(
        catalog: Arc<ArchiveCatalog>,
        coordinator: Arc<BackupCoordinator>,
        site: Arc<SiteContext>,
        database: DatabaseConfig,
        subprocess_timeout: Duration,
    ) -> Self {
        RestoreOrchestrator {
            catalog,
            coordinator,
            site,
            database,
            subprocess_timeout,
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn restore_from_upload(
        &self,
        request: UploadRequest,
        credentials: RestoreCredentials,
    ) -> Result<RestoreOutcome> {
        let source = validation::validate_upload(&self.site, &request)?;
        self.run(source, credentials).await
    }

    pub async fn restore_from_archive(
        &self,
        archive_name: &str,
        credentials: RestoreCredentials,
    ) -> Result<RestoreOutcome> {
        let source = validation::validate_archive(&self.catalog, archive_name)?;
        self.run(source, credentials).await
    }

    async fn run(
        &self,
        source: RestoreSource,
        credentials: RestoreCredentials,
    ) -> Result<RestoreOutcome> {
        // Validation is done; everything past this point runs under the
        // global restore lock. Contention fails fast instead of queueing.
        let _permit = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::RestoreInProgress)?;

        let mut log = RestoreLog::create(self.catalog.archive_root())?;
        log.step(RestorePhase::Validating.as_str(), &format!("ok source={}", source.label()));
        tracing::info!(source = source.label(), log = log.rel_path(), "restore started");

        let mut snapshot_name: Option<String> = None;
        let result = self
            .run_phases(&source, &credentials, &mut log, &mut snapshot_name)
            .await;

        match &result {
            Ok(()) => log.step("result", "success"),
            Err(e) => log.step("result", &format!("failed: {e}")),
        }

        // Link the log wherever a browsing operator would look for it.
        if let Some(snapshot) = &snapshot_name {
            if let Err(e) = self.catalog.attach_restore_log(snapshot, log.rel_path()) {
                tracing::warn!(archive = %snapshot, error = %e, "failed to attach restore log");
            }
        }
        if let Some(source_archive) = &source.source_archive {
            if let Err(e) = self.catalog.attach_restore_log(source_archive, log.rel_path()) {
                tracing::warn!(archive = %source_archive, error = %e, "failed to attach restore log");
            }
        }

        result.map(|()| RestoreOutcome {
            restore_log_path: log.rel_path().to_string(),
            pre_restore_archive: snapshot_name,
        })
    }

    async fn run_phases(
        &self,
        source: &RestoreSource,
        credentials: &RestoreCredentials,
        log: &mut RestoreLog,
        snapshot_name: &mut Option<String>,
    ) -> Result<()> {
        // Snapshotting: the safety invariant. Nothing is overwritten until a
        // recoverable snapshot of the current state exists.
        let started = Instant::now();
        let snapshot = self
            .coordinator
            .create_backup(
                ArchiveSource::PreRestore,
                Some(format!("Pre-restore backup ({})", source.label())),
                BackupOptions {
                    include_files: true,
                    bundle: true,
                },
            )
            .await;
        let snapshot = match snapshot {
            Ok(record) => {
                log.step_timed(
                    RestorePhase::Snapshotting.as_str(),
                    &format!("ok archive={}", record.name),
                    started,
                );
                record
            }
            Err(e) => {
                log.step_timed(RestorePhase::Snapshotting.as_str(), "failed", started);
                return Err(AppError::RestoreFailed(format!(
                    "pre-restore snapshot failed, nothing was touched: {e}"
                )));
            }
        };
        *snapshot_name = Some(snapshot.name.clone());

        // Destructive phases run in maintenance mode; the guard guarantees
        // the site comes back out on success and failure alike.
        let guard = self
            .site
            .enter_maintenance(&format!("restore from {}", source.label()))?;
        log.step("maintenance", "on");

        let result = self.apply(source, credentials, log).await;

        match guard.exit() {
            Ok(()) => log.step(
                "maintenance",
                if result.is_ok() { "off" } else { "off (after failure)" },
            ),
            Err(e) => {
                log.step("maintenance", &format!("failed to exit: {e}"));
                tracing::error!(error = %e, "failed to exit maintenance mode");
            }
        }
        result
    }

    async fn apply(
        &self,
        source: &RestoreSource,
        credentials: &RestoreCredentials,
        log: &mut RestoreLog,
    ) -> Result<()> {
        let started = Instant::now();
        match restore_database(&self.database, &source.db, credentials, self.subprocess_timeout)
            .await
        {
            Ok(()) => log.step_timed(RestorePhase::RestoringDb.as_str(), "ok", started),
            Err(e) => {
                log.step_timed(RestorePhase::RestoringDb.as_str(), "failed", started);
                return Err(e);
            }
        }

        for (kind, artifact) in [
            (StoreKind::Public, &source.public),
            (StoreKind::Private, &source.private),
        ] {
            let Some(archive_path) = artifact else {
                continue;
            };
            let started = Instant::now();
            match self.replace_store(kind, archive_path) {
                Ok(()) => log.step_timed(
                    RestorePhase::RestoringFiles.as_str(),
                    &format!("ok store={}", kind.as_str()),
                    started,
                ),
                Err(e) => {
                    log.step_timed(
                        RestorePhase::RestoringFiles.as_str(),
                        &format!("failed store={}", kind.as_str()),
                        started,
                    );
                    return Err(AppError::RestoreFailed(format!(
                        "replacing {} file store failed: {e}",
                        kind.as_str()
                    )));
                }
            }
        }

        let started = Instant::now();
        match self.site.run_post_restore_hook().await {
            Ok(()) => log.step_timed(RestorePhase::Finalizing.as_str(), "ok", started),
            Err(e) => {
                log.step_timed(RestorePhase::Finalizing.as_str(), "failed", started);
                return Err(e);
            }
        }
        Ok(())
    }

    fn replace_store(&self, kind: StoreKind, archive_path: &Path) -> Result<()> {
        let store = self.site.store_path(kind);
        if store.exists() {
            fs::remove_dir_all(store)?;
        }
        fs::create_dir_all(store)?;
        extract_tar_gz(archive_path, store)?;
        Ok(())
    }
}
