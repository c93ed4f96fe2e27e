//! Directory provisioning ahead of artifact writes.

use super::error::{ArchiveError, ArchiveResult};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Make sure `path` exists as a directory, creating missing parents.
///
/// Idempotent, and safe to race: a caller that loses the race to create the
/// directory observes success. Fails with `StorageUnavailable` when the path
/// cannot be created or is occupied by something other than a directory.
pub async fn ensure_directory(path: &Path) -> ArchiveResult<()> {
    if let Err(e) = fs::create_dir_all(path).await {
        // Another caller created it first.
        let lost_race = e.kind() == ErrorKind::AlreadyExists && is_dir(path).await;
        if !lost_race {
            return Err(ArchiveError::storage(path, e));
        }
    }

    if !is_dir(path).await {
        return Err(ArchiveError::storage(
            path,
            std::io::Error::new(ErrorKind::AlreadyExists, "path exists and is not a directory"),
        ));
    }

    debug!("Ensured directory {:?}", path);
    Ok(())
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("music").join("c1");

        ensure_directory(&path).await.unwrap();

        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("images");

        ensure_directory(&path).await.unwrap();
        ensure_directory(&path).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_concurrent_callers_all_succeed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("music").join("shared");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let path = path.clone();
            handles.push(tokio::spawn(
                async move { ensure_directory(&path).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn test_file_in_the_way_is_storage_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("videos");
        std::fs::write(&path, b"not a directory").unwrap();

        let result = ensure_directory(&path).await;

        assert!(matches!(
            result,
            Err(ArchiveError::StorageUnavailable { .. })
        ));
    }
}
