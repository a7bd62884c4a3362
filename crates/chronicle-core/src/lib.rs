//! chronicle-core library.
//!
//! Versioned journals for domain entities: every save of a journaled entity
//! appends an immutable snapshot, and change sets are derived by diffing
//! adjacent snapshots. See [`journal::JournalManager`].
//!
//! # Conventions
//!
//! - **Errors**: [`error::JournalError`] for engine operations, `anyhow::Result`
//!   at the store-opening and configuration edges.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod db;
pub mod error;
pub mod journal;
pub mod model;

pub use journal::JournalManager;
