pub mod archive; // tar.gz file-tree archiving and bundling
pub mod db_dump; // database dump subprocess driver
mod logic; // backup orchestration

pub use logic::{BackupCoordinator, BackupOptions};
