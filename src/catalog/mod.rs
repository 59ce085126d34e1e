// backupcenter/src/catalog/mod.rs
//
// Durable archive catalog. One JSON document per archive record, written
// atomically under `<archive_root>/catalog/`. The catalog exclusively owns
// record lifecycle; other components only read records or create new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::errors::{AppError, Result};

const CATALOG_DIRNAME: &str = "catalog";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveSource {
    Manual,
    PreRestore,
    Scheduled,
}

impl ArchiveSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveSource::Manual => "manual",
            ArchiveSource::PreRestore => "pre_restore",
            ArchiveSource::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ArchiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveStatus::Pending => "pending",
            ArchiveStatus::Running => "running",
            ArchiveStatus::Success => "success",
            ArchiveStatus::Failed => "failed",
        }
    }
}

/// A produced backup artifact, addressed relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub rel_path: String,
    pub size: u64,
}

/// The artifacts linked to a record when a backup succeeds.
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    pub db: Option<Artifact>,
    pub public_files: Option<Artifact>,
    pub private_files: Option<Artifact>,
    pub bundle: Option<Artifact>,
    pub config: Option<Artifact>,
}

/// One row per backup event. Artifact paths, once set, are immutable; a new
/// archive is created instead of overwriting. `restore_log_path` is the one
/// field populated after the terminal status, when the archive participates
/// in a restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub name: String,
    pub title: String,
    pub source: ArchiveSource,
    pub status: ArchiveStatus,
    pub created_on: DateTime<Utc>,
    pub db_file_path: Option<String>,
    pub db_size: Option<u64>,
    pub public_file_path: Option<String>,
    pub public_size: Option<u64>,
    pub private_file_path: Option<String>,
    pub private_size: Option<u64>,
    pub bundle_file_path: Option<String>,
    pub bundle_size: Option<u64>,
    pub config_file_path: Option<String>,
    pub restore_log_path: Option<String>,
    pub failure_reason: Option<String>,
}

pub struct ArchiveCatalog {
    archive_root: PathBuf,
    catalog_dir: PathBuf,
    // Serializes read-modify-write transitions on record files.
    write_lock: Mutex<()>,
}

impl ArchiveCatalog {
    pub fn open(archive_root: &Path) -> Result<Self> {
        let catalog_dir = archive_root.join(CATALOG_DIRNAME);
        fs::create_dir_all(&catalog_dir)?;
        Ok(ArchiveCatalog {
            archive_root: archive_root.to_path_buf(),
            catalog_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Creates a new record in `pending` with a unique name and a creation
    /// timestamp that is never mutated afterwards.
    pub fn create(&self, source: ArchiveSource, title: Option<String>) -> Result<ArchiveRecord> {
        let created_on = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "bk-{}-{}",
            created_on.format("%Y%m%d-%H%M%S"),
            &suffix[..8]
        );
        let record = ArchiveRecord {
            title: title.unwrap_or_else(|| {
                format!("Backup {}", created_on.format("%Y-%m-%d %H:%M:%S UTC"))
            }),
            name: name.clone(),
            source,
            status: ArchiveStatus::Pending,
            created_on,
            db_file_path: None,
            db_size: None,
            public_file_path: None,
            public_size: None,
            private_file_path: None,
            private_size: None,
            bundle_file_path: None,
            bundle_size: None,
            config_file_path: None,
            restore_log_path: None,
            failure_reason: None,
        };
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.persist(&record)?;
        Ok(record)
    }

    pub fn mark_running(&self, name: &str) -> Result<ArchiveRecord> {
        self.transition(name, &[ArchiveStatus::Pending], ArchiveStatus::Running, |_| {})
    }

    pub fn mark_success(&self, name: &str, artifacts: ArtifactSet) -> Result<ArchiveRecord> {
        self.transition(
            name,
            &[ArchiveStatus::Running],
            ArchiveStatus::Success,
            move |record| {
                record.db_file_path = artifacts.db.as_ref().map(|a| a.rel_path.clone());
                record.db_size = artifacts.db.as_ref().map(|a| a.size);
                record.public_file_path =
                    artifacts.public_files.as_ref().map(|a| a.rel_path.clone());
                record.public_size = artifacts.public_files.as_ref().map(|a| a.size);
                record.private_file_path =
                    artifacts.private_files.as_ref().map(|a| a.rel_path.clone());
                record.private_size = artifacts.private_files.as_ref().map(|a| a.size);
                record.bundle_file_path = artifacts.bundle.as_ref().map(|a| a.rel_path.clone());
                record.bundle_size = artifacts.bundle.as_ref().map(|a| a.size);
                record.config_file_path = artifacts.config.as_ref().map(|a| a.rel_path.clone());
            },
        )
    }

    pub fn mark_failed(&self, name: &str, reason: &str) -> Result<ArchiveRecord> {
        let reason = reason.to_string();
        self.transition(
            name,
            &[ArchiveStatus::Pending, ArchiveStatus::Running],
            ArchiveStatus::Failed,
            move |record| record.failure_reason = Some(reason),
        )
    }

    /// Links a restore log to an archive that participated in a restore,
    /// either as the source or as the pre-restore snapshot. A later restore
    /// of the same archive replaces the link with the newer log.
    pub fn attach_restore_log(&self, name: &str, rel_path: &str) -> Result<ArchiveRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = self.load(name)?;
        record.restore_log_path = Some(rel_path.to_string());
        self.persist(&record)?;
        Ok(record)
    }

    /// Fresh query each call, newest first.
    pub fn list(&self) -> Result<Vec<ArchiveRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.catalog_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_path(&path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable catalog entry");
                }
            }
        }
        records.sort_by(|a, b| {
            b.created_on
                .cmp(&a.created_on)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(records)
    }

    pub fn get(&self, name: &str) -> Result<ArchiveRecord> {
        self.load(name)
    }

    /// Resolves a catalog-relative path to an absolute filesystem path for
    /// download. This is a security boundary: the path must stay inside the
    /// archive root after normalization and must be registered on a known
    /// record.
    pub fn resolve_download(&self, rel_path: &str) -> Result<PathBuf> {
        let candidate = Path::new(rel_path);
        if rel_path.is_empty() || candidate.is_absolute() {
            return Err(AppError::PathTraversal(rel_path.to_string()));
        }
        for component in candidate.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(AppError::PathTraversal(rel_path.to_string())),
            }
        }

        if !self.is_registered(rel_path)? {
            return Err(AppError::NotFound(format!(
                "no archive references path {rel_path}"
            )));
        }

        let absolute = self.archive_root.join(candidate);
        let resolved = absolute
            .canonicalize()
            .map_err(|_| AppError::NotFound(format!("archive file missing: {rel_path}")))?;
        let root = self.archive_root.canonicalize()?;
        if !resolved.starts_with(&root) {
            // Registered path resolving outside the root means a symlink was
            // planted under it. Refuse.
            return Err(AppError::PathTraversal(rel_path.to_string()));
        }
        Ok(resolved)
    }

    fn is_registered(&self, rel_path: &str) -> Result<bool> {
        for record in self.list()? {
            let known = [
                record.db_file_path,
                record.public_file_path,
                record.private_file_path,
                record.bundle_file_path,
                record.config_file_path,
                record.restore_log_path,
            ];
            if known.iter().flatten().any(|p| p == rel_path) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn transition(
        &self,
        name: &str,
        allowed_from: &[ArchiveStatus],
        to: ArchiveStatus,
        apply: impl FnOnce(&mut ArchiveRecord),
    ) -> Result<ArchiveRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = self.load(name)?;
        if !allowed_from.contains(&record.status) {
            return Err(AppError::InvalidStateTransition {
                name: name.to_string(),
                from: record.status.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        record.status = to;
        apply(&mut record);
        self.persist(&record)?;
        Ok(record)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.catalog_dir.join(format!("{name}.json"))
    }

    fn load(&self, name: &str) -> Result<ArchiveRecord> {
        let path = self.record_path(name);
        if !path.is_file() {
            return Err(AppError::NotFound(format!("archive {name}")));
        }
        self.load_path(&path)
    }

    fn load_path(&self, path: &Path) -> Result<ArchiveRecord> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn persist(&self, record: &ArchiveRecord) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.catalog_dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(self.record_path(&record.name))
            .map_err(|e| AppError::Io(e.error))?;
        Ok(())
    }
}
