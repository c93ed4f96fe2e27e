//! Filesystem side of artifact lifecycles.

use super::error::{ArchiveError, ArchiveResult};
use super::placement::ArtifactPlacement;
use super::provisioner::ensure_directory;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};

/// Stream `reader` into the placement's file, provisioning its directory first.
///
/// Data lands in a sibling temp file that is renamed over the target once
/// complete, so an existing artifact is replaced in one step and a failed
/// write leaves the previous one untouched. Returns the number of bytes written.
pub async fn write_stream(
    placement: &ArtifactPlacement,
    mut reader: Pin<Box<dyn AsyncRead + Send>>,
) -> ArchiveResult<u64> {
    ensure_directory(&placement.directory).await?;

    let target = placement.path();
    let temp = placement
        .directory
        .join(format!(".{}.upload", placement.file_name));

    let written = match copy_to(&temp, &mut reader).await {
        Ok(written) => written,
        Err(e) => {
            discard_temp(&temp).await;
            return Err(ArchiveError::storage(&target, e));
        }
    };

    if let Err(e) = fs::rename(&temp, &target).await {
        discard_temp(&temp).await;
        return Err(ArchiveError::storage(&target, e));
    }

    debug!("Wrote {} bytes to {:?}", written, target);
    Ok(written)
}

async fn discard_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to clean up partial upload {:?}: {}", temp, e);
        }
    }
}

async fn copy_to(
    path: &Path,
    reader: &mut Pin<Box<dyn AsyncRead + Send>>,
) -> std::io::Result<u64> {
    let mut file = fs::File::create(path).await?;
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

/// Remove a single artifact file. A file that is already gone is not an error.
/// Returns whether something was removed.
pub async fn remove_file(path: &Path) -> ArchiveResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {:?}", path);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Artifact {:?} was already gone", path);
            Ok(false)
        }
        Err(e) => Err(ArchiveError::storage(path, e)),
    }
}

/// Remove a directory and everything below it. A missing directory is not an error.
pub async fn remove_tree(path: &Path) -> ArchiveResult<bool> {
    match fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("Removed directory {:?}", path);
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ArchiveError::storage(path, e)),
    }
}

pub async fn exists(path: &Path) -> ArchiveResult<bool> {
    fs::try_exists(path)
        .await
        .map_err(|e| ArchiveError::storage(path, e))
}

/// The first of `placements` present on disk.
pub async fn find_existing(placements: &[ArtifactPlacement]) -> ArchiveResult<Option<PathBuf>> {
    for placement in placements {
        let path = placement.path();
        if exists(&path).await? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
