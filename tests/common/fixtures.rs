//! Temporary archive fixture

use media_archive::archive::{ArchiveManager, ArchiveWatchdog, Repositories, Upload};
use media_archive::archive_store::{Collection, CollectionFields, SqliteArchiveStore, TrackFields};
use media_archive::config::ArchiveConfig;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use super::constants::*;

/// An archive rooted in a fresh temp directory, with its database alongside.
pub struct TestArchive {
    pub manager: ArchiveManager,
    pub db_path: PathBuf,
    root: PathBuf,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestArchive {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().join("archive");
        std::fs::create_dir_all(&root).expect("Failed to create archive root");
        let db_path = temp_dir.path().join("archive.db");
        let store = SqliteArchiveStore::new(&db_path).expect("Failed to open archive store");

        Self {
            manager: ArchiveManager::new(ArchiveConfig::new(&root), Repositories::sqlite(&store)),
            db_path,
            root,
            _temp_dir: temp_dir,
        }
    }

    /// Open a second manager over the same root and database.
    pub fn reopen(&self) -> ArchiveManager {
        let store = SqliteArchiveStore::new(&self.db_path).expect("Failed to reopen archive store");
        ArchiveManager::new(ArchiveConfig::new(&self.root), Repositories::sqlite(&store))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn watchdog(&self) -> ArchiveWatchdog {
        ArchiveWatchdog::new(
            self.manager.config().clone(),
            self.manager.repositories().clone(),
        )
    }

    pub fn album_fields() -> CollectionFields {
        CollectionFields {
            kind: "album".to_string(),
            name: ALBUM_NAME.to_string(),
            artist: ALBUM_ARTIST.to_string(),
            year: "1965".to_string(),
            label: "Impulse!".to_string(),
            record_number: "A-77".to_string(),
            ..Default::default()
        }
    }

    pub fn track_fields(title: &str) -> TrackFields {
        TrackFields {
            title: title.to_string(),
            composer: ALBUM_ARTIST.to_string(),
            lyrics: String::new(),
        }
    }

    /// A collection with cover art.
    pub async fn create_album(&self) -> Collection {
        self.manager
            .create_collection(
                Self::album_fields(),
                Some(Upload::from_bytes(JPEG, COVER_BYTES)),
            )
            .await
            .expect("Failed to create album")
    }

    /// Every file below the archive root, relative to it and sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(&self.root)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        files.sort();
        files
    }
}
