//! Media archive library.
//!
//! Exposes the archive modules for the CLI and for integration tests.

pub mod archive;
pub mod archive_store;
pub mod config;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use archive::{ArchiveError, ArchiveManager, ArchiveWatchdog, Repositories, Upload};
pub use archive_store::SqliteArchiveStore;
pub use config::{AppConfig, ArchiveConfig};
