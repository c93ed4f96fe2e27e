//! Download bundle presence for collections.
//!
//! `has_bundle` is true iff `music/{id}/{id}.zip` exists. Raising the flag
//! requires the file to already be on disk; lowering it removes the file
//! first. The flag therefore only ever lags the file, never leads it.

use super::error::{ArchiveError, ArchiveResult};
use super::files;
use super::manager::{blocking, ArchiveManager};
use super::placement::{resolve_placement, MediaCategory, MediaFormat, PlacementIds};
use super::upload::Upload;
use crate::archive_store::{Collection, CollectionUpdate, RecordFilter};
use std::path::PathBuf;
use tracing::{error, info};

impl ArchiveManager {
    /// Where the collection's bundle lives, whether or not it exists.
    pub fn bundle_path(&self, collection_id: &str) -> ArchiveResult<PathBuf> {
        let placement = resolve_placement(
            &self.config,
            MediaFormat::Zip,
            &PlacementIds::collection(collection_id),
        )?;
        Ok(placement.path())
    }

    /// Bring the `has_bundle` flag in line with `present`.
    ///
    /// Fails with `BundleMissing` when asked to mark a bundle present that is
    /// not on disk. Marking absent deletes the file, tolerating its absence.
    pub async fn set_bundle_presence(
        &self,
        collection_id: &str,
        present: bool,
    ) -> ArchiveResult<Collection> {
        let path = self.bundle_path(collection_id)?;
        self.require_collection(collection_id).await?;

        if present {
            if !files::exists(&path).await? {
                return Err(ArchiveError::BundleMissing {
                    collection_id: collection_id.to_string(),
                });
            }
        } else {
            files::remove_file(&path).await?;
        }

        let filter = RecordFilter::ById(collection_id.to_string());
        let update = CollectionUpdate::HasBundle(present);
        let collection = blocking(&self.repos.collections, move |r| {
            r.update_fields(&filter, &update)
        })
        .await?
        .ok_or_else(|| ArchiveError::not_found("Collection", collection_id))?;

        info!(
            "Collection {} bundle marked {}",
            collection_id,
            if present { "present" } else { "absent" }
        );
        Ok(collection)
    }

    /// Store `upload` as the collection's bundle and raise the flag.
    pub async fn attach_bundle(
        &self,
        collection_id: &str,
        upload: Upload,
    ) -> ArchiveResult<Collection> {
        self.require_collection(collection_id).await?;

        let path = self
            .write_upload(
                MediaCategory::Bundle,
                PlacementIds::collection(collection_id),
                upload,
                true,
            )
            .await?;

        self.set_bundle_presence(collection_id, true)
            .await
            .inspect_err(|e| {
                error!(
                    "Bundle written to {:?} but flag for collection {} not raised: {}",
                    path, collection_id, e
                )
            })
    }

    /// Remove the collection's bundle and lower the flag.
    pub async fn detach_bundle(&self, collection_id: &str) -> ArchiveResult<Collection> {
        self.set_bundle_presence(collection_id, false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manager::Repositories;
    use crate::archive_store::{CollectionFields, SqliteArchiveStore};
    use crate::config::ArchiveConfig;
    use tempfile::TempDir;

    async fn manager_with_collection() -> (ArchiveManager, String, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteArchiveStore::new(temp_dir.path().join("archive.db")).unwrap();
        let manager = ArchiveManager::new(
            ArchiveConfig::new(temp_dir.path()),
            Repositories::sqlite(&store),
        );
        let collection = manager
            .create_collection(CollectionFields::default(), None)
            .await
            .unwrap();
        (manager, collection.id, temp_dir)
    }

    #[tokio::test]
    async fn test_flag_cannot_lead_the_file() {
        let (manager, id, _temp_dir) = manager_with_collection().await;

        let result = manager.set_bundle_presence(&id, true).await;
        assert!(matches!(result, Err(ArchiveError::BundleMissing { .. })));

        let collection = manager.find_collection(&id).await.unwrap().unwrap();
        assert!(!collection.has_bundle);
    }

    #[tokio::test]
    async fn test_flag_follows_existing_file() {
        let (manager, id, _temp_dir) = manager_with_collection().await;
        let bundle = manager.bundle_path(&id).unwrap();
        std::fs::create_dir_all(bundle.parent().unwrap()).unwrap();
        std::fs::write(&bundle, "zip").unwrap();

        let collection = manager.set_bundle_presence(&id, true).await.unwrap();
        assert!(collection.has_bundle);
    }

    #[tokio::test]
    async fn test_attach_then_detach() {
        let (manager, id, _temp_dir) = manager_with_collection().await;

        let collection = manager
            .attach_bundle(&id, Upload::from_bytes("application/zip", "PK"))
            .await
            .unwrap();
        assert!(collection.has_bundle);
        let bundle = manager.bundle_path(&id).unwrap();
        assert!(bundle.ends_with(format!("music/{id}/{id}.zip")));
        assert_eq!(std::fs::read(&bundle).unwrap(), b"PK");

        let collection = manager.detach_bundle(&id).await.unwrap();
        assert!(!collection.has_bundle);
        assert!(!bundle.exists());

        // Already gone is fine.
        let collection = manager.detach_bundle(&id).await.unwrap();
        assert!(!collection.has_bundle);
    }

    #[tokio::test]
    async fn test_attach_rejects_non_zip() {
        let (manager, id, _temp_dir) = manager_with_collection().await;
        let result = manager
            .attach_bundle(&id, Upload::from_bytes("application/pdf", "%PDF"))
            .await;
        assert!(matches!(
            result,
            Err(ArchiveError::CategoryMismatch {
                expected: MediaCategory::Bundle,
                ..
            })
        ));
        assert!(!manager.bundle_path(&id).unwrap().exists());
    }

    #[tokio::test]
    async fn test_bundle_for_unknown_collection() {
        let (manager, _id, _temp_dir) = manager_with_collection().await;
        let result = manager.detach_bundle("unknown").await;
        assert!(matches!(result, Err(ArchiveError::RecordNotFound { .. })));
    }
}
