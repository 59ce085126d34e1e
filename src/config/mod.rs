// backupcenter/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8920";
const DEFAULT_SUBPROCESS_TIMEOUT_SECS: u64 = 600;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct RawDatabaseConfig {
    pub url: Option<String>,
    pub dump_bin: Option<String>,
    pub restore_bin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSiteConfig {
    pub root: Option<PathBuf>,
    pub public_store: Option<PathBuf>,
    pub private_store: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub listen_addr: Option<String>,
    pub admin_token: Option<String>,
    pub archive_root: Option<PathBuf>,
    pub site: Option<RawSiteConfig>,
    pub database: Option<RawDatabaseConfig>,
    pub post_restore_cmd: Option<Vec<String>>,
    pub subprocess_timeout_secs: Option<u64>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub dump_bin: String,
    pub restore_bin: String,
}

#[derive(Debug, Clone)]
pub struct SitePaths {
    pub root: PathBuf,
    pub public_store: PathBuf,
    pub private_store: PathBuf,
    pub config_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub admin_token: String,
    pub archive_root: PathBuf,
    pub site: SitePaths,
    pub database: DatabaseConfig,
    pub post_restore_cmd: Option<Vec<String>>,
    pub subprocess_timeout: Duration,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw: RawJsonConfig = serde_json::from_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let listen_addr = raw
            .listen_addr
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDR)
            .parse::<SocketAddr>()
            .context("listen_addr in config.json is not a valid socket address")?;

        let admin_token = raw
            .admin_token
            .as_ref()
            .context("admin_token must be set in config.json")?
            .clone();
        if admin_token.trim().is_empty() {
            anyhow::bail!("admin_token cannot be empty in config.json");
        }

        let archive_root = raw
            .archive_root
            .as_ref()
            .context("archive_root must be set in config.json")?
            .clone();
        if archive_root.as_os_str().is_empty() {
            anyhow::bail!("archive_root cannot be empty in config.json");
        }

        let site_raw = raw
            .site
            .as_ref()
            .context("site section must be set in config.json")?;
        let site_root = site_raw
            .root
            .as_ref()
            .context("site.root must be set in config.json")?
            .clone();
        let site = SitePaths {
            public_store: site_raw
                .public_store
                .clone()
                .unwrap_or_else(|| site_root.join("public/files")),
            private_store: site_raw
                .private_store
                .clone()
                .unwrap_or_else(|| site_root.join("private/files")),
            config_file: site_raw
                .config_file
                .clone()
                .unwrap_or_else(|| site_root.join("site_config.json")),
            root: site_root,
        };

        let db_raw = raw
            .database
            .as_ref()
            .context("database section must be set in config.json")?;
        let database = DatabaseConfig {
            url: db_raw
                .url
                .as_ref()
                .context("database.url must be set in config.json")?
                .clone(),
            dump_bin: db_raw
                .dump_bin
                .clone()
                .unwrap_or_else(|| "pg_dump".to_string()),
            restore_bin: db_raw
                .restore_bin
                .clone()
                .unwrap_or_else(|| "psql".to_string()),
        };

        if let Some(cmd) = &raw.post_restore_cmd {
            if cmd.is_empty() {
                anyhow::bail!("post_restore_cmd cannot be an empty command in config.json");
            }
        }

        Ok(AppConfig {
            listen_addr,
            admin_token,
            archive_root,
            site,
            database,
            post_restore_cmd: raw.post_restore_cmd,
            subprocess_timeout: Duration::from_secs(
                raw.subprocess_timeout_secs
                    .unwrap_or(DEFAULT_SUBPROCESS_TIMEOUT_SECS),
            ),
        })
    }
}
