// backupcenter/src/backup/logic.rs
//
// Drives a full backup: database dump, optional file-tree archives, config
// snapshot, optional bundle. All artifacts are produced in a staging
// directory and moved into the archive root only after every step succeeded;
// a failed attempt leaves nothing visible to the catalog.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backup::archive::{archive_file_tree, bundle_artifacts, gzip_file};
use crate::backup::db_dump::dump_database;
use crate::catalog::{ArchiveCatalog, ArchiveRecord, ArchiveSource, Artifact, ArtifactSet};
use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::site::{SiteContext, StoreKind};

const DB_DUMP_NAME: &str = "database.sql";
const DB_ARTIFACT_NAME: &str = "database.sql.gz";
const PUBLIC_ARTIFACT_NAME: &str = "public_files.tar.gz";
const PRIVATE_ARTIFACT_NAME: &str = "private_files.tar.gz";
const CONFIG_ARTIFACT_NAME: &str = "site_config_backup.json";
const BUNDLE_ARTIFACT_NAME: &str = "bundle.tar.gz";

#[derive(Debug, Clone, Copy)]
pub struct BackupOptions {
    pub include_files: bool,
    pub bundle: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        BackupOptions {
            include_files: true,
            bundle: true,
        }
    }
}

pub struct BackupCoordinator {
    catalog: Arc<ArchiveCatalog>,
    site: Arc<SiteContext>,
    database: DatabaseConfig,
    subprocess_timeout: Duration,
}

impl BackupCoordinator {
    pub fn new(
        catalog: Arc<ArchiveCatalog>,
        site: Arc<SiteContext>,
        database: DatabaseConfig,
        subprocess_timeout: Duration,
    ) -> Self {
        BackupCoordinator {
            catalog,
            site,
            database,
            subprocess_timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<ArchiveCatalog> {
        &self.catalog
    }

    /// Creates a cataloged point-in-time backup. All-or-nothing: any step
    /// failure marks the record `failed` and discards the staged artifacts.
    pub async fn create_backup(
        &self,
        source: ArchiveSource,
        title: Option<String>,
        options: BackupOptions,
    ) -> Result<ArchiveRecord> {
        let record = self.catalog.create(source, title)?;
        tracing::info!(
            archive = %record.name,
            source = source.as_str(),
            include_files = options.include_files,
            bundle = options.bundle,
            "backup started"
        );

        match self.run(&record.name, options).await {
            Ok(artifacts) => {
                let record = self.catalog.mark_success(&record.name, artifacts)?;
                tracing::info!(archive = %record.name, "backup succeeded");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(archive = %record.name, error = %e, "backup failed");
                if let Err(mark_err) = self.catalog.mark_failed(&record.name, &e.to_string()) {
                    tracing::error!(archive = %record.name, error = %mark_err, "failed to mark record failed");
                }
                Err(e)
            }
        }
    }

    // Every step after record creation, the `running` transition included,
    // funnels into the `failed` terminal state; no record stays `pending`.
    async fn run(&self, name: &str, options: BackupOptions) -> Result<ArtifactSet> {
        self.catalog.mark_running(name)?;
        self.produce(name, options).await
    }

    async fn produce(&self, name: &str, options: BackupOptions) -> Result<ArtifactSet> {
        let staging = self.catalog.archive_root().join(format!(".staging-{name}"));
        fs::create_dir_all(&staging)?;

        let result = self.produce_into(&staging, name, options).await;
        match result {
            Ok(artifacts) => {
                fs::rename(&staging, self.catalog.archive_root().join(name))?;
                Ok(artifacts)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    tracing::warn!(path = %staging.display(), error = %cleanup, "failed to discard staging directory");
                }
                Err(e)
            }
        }
    }

    async fn produce_into(
        &self,
        staging: &Path,
        name: &str,
        options: BackupOptions,
    ) -> Result<ArtifactSet> {
        let mut artifacts = ArtifactSet::default();

        // Database dump, always. Gzipped like the platform's own backups.
        let plain_dump = staging.join(DB_DUMP_NAME);
        dump_database(&self.database, &plain_dump, self.subprocess_timeout).await?;
        let db_path = gzip_file(&plain_dump, &staging.join(DB_ARTIFACT_NAME))?;
        artifacts.db = Some(self.artifact(name, DB_ARTIFACT_NAME, &db_path)?);

        if options.include_files {
            let public = archive_file_tree(
                self.site.store_path(StoreKind::Public),
                &staging.join(PUBLIC_ARTIFACT_NAME),
            )?;
            artifacts.public_files = Some(self.artifact(name, PUBLIC_ARTIFACT_NAME, &public)?);

            let private = archive_file_tree(
                self.site.store_path(StoreKind::Private),
                &staging.join(PRIVATE_ARTIFACT_NAME),
            )?;
            artifacts.private_files = Some(self.artifact(name, PRIVATE_ARTIFACT_NAME, &private)?);
        }

        let config_source = self.site.config_file();
        if config_source.is_file() {
            let config_path = staging.join(CONFIG_ARTIFACT_NAME);
            fs::copy(config_source, &config_path)?;
            artifacts.config = Some(self.artifact(name, CONFIG_ARTIFACT_NAME, &config_path)?);
        } else {
            tracing::warn!(
                path = %config_source.display(),
                "site config file missing, skipping config snapshot"
            );
        }

        // With no file-tree artifacts a bundle would just wrap the dump, so
        // the db artifact stands as the direct download instead.
        if options.bundle && options.include_files {
            let mut members: Vec<&Path> = Vec::new();
            let db = staging.join(DB_ARTIFACT_NAME);
            let public = staging.join(PUBLIC_ARTIFACT_NAME);
            let private = staging.join(PRIVATE_ARTIFACT_NAME);
            let config = staging.join(CONFIG_ARTIFACT_NAME);
            members.push(&db);
            members.push(&public);
            members.push(&private);
            members.push(&config);
            let bundle = bundle_artifacts(&members, &staging.join(BUNDLE_ARTIFACT_NAME))?;
            artifacts.bundle = Some(self.artifact(name, BUNDLE_ARTIFACT_NAME, &bundle)?);
        }

        Ok(artifacts)
    }

    fn artifact(&self, archive_name: &str, file_name: &str, staged_path: &Path) -> Result<Artifact> {
        let size = fs::metadata(staged_path)?.len();
        Ok(Artifact {
            rel_path: format!("{archive_name}/{file_name}"),
            size,
        })
    }
}
