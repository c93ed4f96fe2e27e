//! Artifact placement and record/file lifecycle coordination.

mod bundle;
mod error;
mod files;
mod manager;
mod placement;
mod provisioner;
mod upload;
mod watchdog;

pub use error::{ArchiveError, ArchiveResult};
pub use manager::{ArchiveManager, CreatedEntry, NewEntry, Repositories, StandaloneKind};
pub use placement::{
    candidate_placements, classify_content_type, resolve_placement, validate_id,
    ArtifactPlacement, MediaCategory, MediaFormat, PlacementIds,
};
pub use provisioner::ensure_directory;
pub use upload::Upload;
pub use watchdog::{ArchiveWatchdog, BundleFlagMismatch, ScanMode, ScanReport};
