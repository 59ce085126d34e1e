//! Site backup and restore orchestration engine.
//!
//! Sequences database dump/restore subprocesses, keeps a durable archive
//! catalog, enforces snapshot-before-overwrite restore semantics and exposes
//! the whole thing over a narrow, authorization-gated RPC surface.

pub mod backup;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod restore;
pub mod server;
pub mod site;
pub mod utils;
