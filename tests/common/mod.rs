//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestArchive;
//!
//! #[tokio::test]
//! async fn test_create_album() {
//!     let archive = TestArchive::new();
//!     let album = archive.create_album().await;
//!     assert!(!album.has_bundle);
//! }
//! ```

mod constants;
mod fixtures;

// Public API - this is what tests import
pub use constants::*;
pub use fixtures::TestArchive;
