pub mod db_restore; // database import subprocess driver
mod logic; // restore state machine
pub mod validation; // restore input validation

pub use db_restore::RestoreCredentials;
pub use logic::{RestoreOrchestrator, RestoreOutcome, RestorePhase};
pub use validation::UploadRequest;
