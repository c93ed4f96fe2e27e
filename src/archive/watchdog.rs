//! Archive consistency watchdog.
//!
//! Cross-checks records against the archive root and reports:
//! 1. Collections whose `has_bundle` flag disagrees with the bundle on disk
//! 2. Files and directories no record accounts for (orphan artifacts,
//!    including leftovers of interrupted uploads)
//!
//! In repair mode flags are brought in line with the disk and orphans are
//! deleted. Missing artifacts of existing records are not errors and are not
//! reported.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::manager::Repositories;
use super::placement::MediaCategory;
use crate::archive_store::{CollectionUpdate, RecordFilter, Repository, TrackSetFilter};
use crate::config::ArchiveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Report only.
    DryRun,
    /// Fix bundle flags and delete orphans.
    Repair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleFlagMismatch {
    pub collection_id: String,
    pub has_bundle: bool,
    pub file_present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub mode: ScanMode,
    pub collections_scanned: usize,
    pub standalone_records_scanned: usize,
    pub bundle_flag_mismatches: Vec<BundleFlagMismatch>,
    pub orphan_artifacts: Vec<PathBuf>,
    pub flags_repaired: usize,
    pub orphans_removed: usize,
    /// Orphans a repair pass tried and failed to delete.
    pub removal_failures: Vec<PathBuf>,
    pub scan_duration_ms: i64,
}

impl ScanReport {
    pub fn is_consistent(&self) -> bool {
        self.bundle_flag_mismatches.is_empty() && self.orphan_artifacts.is_empty()
    }
}

pub struct ArchiveWatchdog {
    config: ArchiveConfig,
    repos: Repositories,
}

impl ArchiveWatchdog {
    pub fn new(config: ArchiveConfig, repos: Repositories) -> Self {
        Self { config, repos }
    }

    /// Run a full scan. Blocking; call from a blocking context.
    pub fn run_scan(&self, mode: ScanMode) -> Result<ScanReport> {
        let start = Instant::now();
        info!("Starting archive scan in {:?} mode", mode);

        let collections = self.repos.collections.find(&RecordFilter::All)?;
        let track_sets = self.repos.track_sets.find(&TrackSetFilter::All)?;
        let video_ids = ids_of(self.repos.videos.find(&RecordFilter::All)?, |v| v.id);
        let image_ids = ids_of(self.repos.images.find(&RecordFilter::All)?, |i| i.id);
        let sheet_ids = ids_of(self.repos.sheets.find(&RecordFilter::All)?, |s| s.id);

        let mut tracks_by_collection: HashMap<String, HashSet<String>> = HashMap::new();
        for set in track_sets {
            tracks_by_collection
                .entry(set.collection_id)
                .or_default()
                .extend(set.tracks.into_iter().map(|t| t.id));
        }

        let mut bundle_flag_mismatches = Vec::new();
        for collection in &collections {
            let bundle = self
                .config
                .collection_dir(&collection.id)
                .join(format!("{}.zip", collection.id));
            let file_present = bundle.is_file();
            if file_present != collection.has_bundle {
                debug!(
                    "Collection {} has_bundle={} but bundle present={}",
                    collection.id, collection.has_bundle, file_present
                );
                bundle_flag_mismatches.push(BundleFlagMismatch {
                    collection_id: collection.id.clone(),
                    has_bundle: collection.has_bundle,
                    file_present,
                });
            }
        }

        let collection_ids: HashSet<String> = collections.iter().map(|c| c.id.clone()).collect();
        let cover_or_image: HashSet<&str> = collection_ids
            .iter()
            .chain(image_ids.iter())
            .map(String::as_str)
            .collect();

        let mut orphan_artifacts = Vec::new();
        orphan_artifacts.extend(flat_orphans(
            &self.config.images_dir(),
            MediaCategory::Image,
            |stem| cover_or_image.contains(stem),
        )?);
        orphan_artifacts.extend(flat_orphans(
            &self.config.videos_dir(),
            MediaCategory::Video,
            |stem| video_ids.contains(stem),
        )?);
        orphan_artifacts.extend(flat_orphans(
            &self.config.sheets_dir(),
            MediaCategory::Sheet,
            |stem| sheet_ids.contains(stem),
        )?);
        orphan_artifacts.extend(self.music_orphans(&collection_ids, &tracks_by_collection)?);

        info!(
            "Archive scan found {} bundle flag mismatches and {} orphan artifacts",
            bundle_flag_mismatches.len(),
            orphan_artifacts.len()
        );

        let (flags_repaired, (orphans_removed, removal_failures)) = match mode {
            ScanMode::DryRun => {
                info!(
                    "Dry-run mode: would repair {} flags and remove {} orphans",
                    bundle_flag_mismatches.len(),
                    orphan_artifacts.len()
                );
                (0, (0, Vec::new()))
            }
            ScanMode::Repair => (
                self.repair_flags(&bundle_flag_mismatches)?,
                remove_orphans(&orphan_artifacts),
            ),
        };

        Ok(ScanReport {
            mode,
            collections_scanned: collections.len(),
            standalone_records_scanned: video_ids.len() + image_ids.len() + sheet_ids.len(),
            bundle_flag_mismatches,
            orphan_artifacts,
            flags_repaired,
            orphans_removed,
            removal_failures,
            scan_duration_ms: start.elapsed().as_millis() as i64,
        })
    }

    /// Directories under `music/` must be collections; files inside them must
    /// be the bundle or audio of one of the collection's tracks.
    fn music_orphans(
        &self,
        collection_ids: &HashSet<String>,
        tracks_by_collection: &HashMap<String, HashSet<String>>,
    ) -> Result<Vec<PathBuf>> {
        let music_dir = self.config.music_dir();
        let mut orphans = Vec::new();
        if !music_dir.is_dir() {
            return Ok(orphans);
        }

        let no_tracks = HashSet::new();
        for entry in WalkDir::new(&music_dir).min_depth(1).max_depth(1) {
            let entry = entry.with_context(|| format!("Failed to scan {:?}", music_dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if !entry.file_type().is_dir() || !collection_ids.contains(&name) {
                orphans.push(entry.into_path());
                continue;
            }

            let tracks = tracks_by_collection.get(&name).unwrap_or(&no_tracks);
            let bundle_name = format!("{}.zip", name);
            orphans.extend(flat_orphans(
                entry.path(),
                MediaCategory::TrackAudio,
                |stem| tracks.contains(stem),
            )?
            .into_iter()
            .filter(|path| path.file_name().is_some_and(|f| f != bundle_name.as_str())));
        }
        Ok(orphans)
    }

    fn repair_flags(&self, mismatches: &[BundleFlagMismatch]) -> Result<usize> {
        let mut repaired = 0;
        for mismatch in mismatches {
            let filter = RecordFilter::ById(mismatch.collection_id.clone());
            let update = CollectionUpdate::HasBundle(mismatch.file_present);
            if self
                .repos
                .collections
                .update_fields(&filter, &update)?
                .is_some()
            {
                info!(
                    "Set has_bundle={} on collection {}",
                    mismatch.file_present, mismatch.collection_id
                );
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

fn ids_of<T>(records: Vec<T>, id: impl Fn(T) -> String) -> HashSet<String> {
    records.into_iter().map(id).collect()
}

/// Entries of `dir` that are not a file with one of `category`'s extensions
/// named after an id `known` accepts.
fn flat_orphans(
    dir: &Path,
    category: MediaCategory,
    known: impl Fn(&str) -> bool,
) -> Result<Vec<PathBuf>> {
    let mut orphans = Vec::new();
    if !dir.is_dir() {
        return Ok(orphans);
    }

    let extensions = category.extensions();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to scan {:?}", dir))?;
        let path = entry.path();
        let accounted = entry.file_type().is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.contains(&e))
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(&known);
        if !accounted {
            orphans.push(entry.into_path());
        }
    }
    Ok(orphans)
}

/// Returns how many orphans were removed and which could not be.
fn remove_orphans(orphans: &[PathBuf]) -> (usize, Vec<PathBuf>) {
    let mut removed = 0;
    let mut failures = Vec::new();
    for path in orphans {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                info!("Removed orphan artifact {:?}", path);
                removed += 1;
            }
            Err(e) => {
                warn!("Failed to remove orphan artifact {:?}: {}", path, e);
                failures.push(path.clone());
            }
        }
    }
    if !failures.is_empty() {
        warn!("{} orphan artifacts could not be removed", failures.len());
    }
    (removed, failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveManager, Upload};
    use crate::archive_store::{CollectionFields, SqliteArchiveStore, TrackFields, VideoFields};
    use tempfile::TempDir;

    struct TestArchive {
        manager: ArchiveManager,
        root: PathBuf,
        _temp_dir: TempDir,
    }

    impl TestArchive {
        fn new() -> Self {
            let temp_dir = TempDir::new().unwrap();
            let root = temp_dir.path().join("archive");
            std::fs::create_dir_all(&root).unwrap();
            let store = SqliteArchiveStore::new(temp_dir.path().join("archive.db")).unwrap();
            Self {
                manager: ArchiveManager::new(ArchiveConfig::new(&root), Repositories::sqlite(&store)),
                root,
                _temp_dir: temp_dir,
            }
        }

        fn watchdog(&self) -> ArchiveWatchdog {
            ArchiveWatchdog::new(
                self.manager.config().clone(),
                self.manager.repositories().clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_consistent_archive_reports_nothing() {
        let t = TestArchive::new();
        let collection = t
            .manager
            .create_collection(
                CollectionFields::default(),
                Some(Upload::from_bytes("image/jpeg", "art")),
            )
            .await
            .unwrap();
        t.manager
            .append_track(
                &collection.id,
                TrackFields::default(),
                Some(Upload::from_bytes("audio/mp3", "audio")),
            )
            .await
            .unwrap();
        t.manager
            .attach_bundle(&collection.id, Upload::from_bytes("application/zip", "PK"))
            .await
            .unwrap();
        t.manager
            .create_video(VideoFields::default(), Some(Upload::from_bytes("video/mp4", "v")))
            .await
            .unwrap();

        let report = t.watchdog().run_scan(ScanMode::DryRun).unwrap();
        assert!(report.is_consistent(), "{:?}", report);
        assert_eq!(report.collections_scanned, 1);
        assert_eq!(report.standalone_records_scanned, 1);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_changing_anything() {
        let t = TestArchive::new();
        let collection = t
            .manager
            .create_collection(CollectionFields::default(), None)
            .await
            .unwrap();
        let bundle = t.manager.bundle_path(&collection.id).unwrap();
        std::fs::create_dir_all(bundle.parent().unwrap()).unwrap();
        std::fs::write(&bundle, "PK").unwrap();
        let stray = t.root.join("sheets").join("nobody.pdf");
        std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
        std::fs::write(&stray, "%PDF").unwrap();

        let report = t.watchdog().run_scan(ScanMode::DryRun).unwrap();
        assert_eq!(
            report.bundle_flag_mismatches,
            vec![BundleFlagMismatch {
                collection_id: collection.id.clone(),
                has_bundle: false,
                file_present: true,
            }]
        );
        assert_eq!(report.orphan_artifacts, vec![stray.clone()]);
        assert_eq!(report.flags_repaired, 0);
        assert_eq!(report.orphans_removed, 0);
        assert!(stray.exists());
    }

    #[tokio::test]
    async fn test_repair_fixes_flags_and_removes_orphans() {
        let t = TestArchive::new();
        let collection = t
            .manager
            .create_collection(CollectionFields::default(), None)
            .await
            .unwrap();
        t.manager
            .attach_bundle(&collection.id, Upload::from_bytes("application/zip", "PK"))
            .await
            .unwrap();
        // Bundle vanishes behind the archive's back.
        std::fs::remove_file(t.manager.bundle_path(&collection.id).unwrap()).unwrap();

        let unknown_dir = t.root.join("music").join("deadbeef");
        std::fs::create_dir_all(&unknown_dir).unwrap();
        std::fs::write(unknown_dir.join("t.mp3"), "audio").unwrap();
        let unknown_track = t.root.join("music").join(&collection.id).join("t9.mp3");
        std::fs::write(&unknown_track, "audio").unwrap();

        let report = t.watchdog().run_scan(ScanMode::Repair).unwrap();
        assert_eq!(report.flags_repaired, 1);
        assert_eq!(report.orphans_removed, 2);
        assert!(report.removal_failures.is_empty());
        assert!(!unknown_dir.exists());
        assert!(!unknown_track.exists());

        let collection = t
            .manager
            .find_collection(&collection.id)
            .await
            .unwrap()
            .unwrap();
        assert!(!collection.has_bundle);

        let report = t.watchdog().run_scan(ScanMode::DryRun).unwrap();
        assert!(report.is_consistent(), "{:?}", report);
    }

    #[test]
    fn test_failed_orphan_removal_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let removable = temp_dir.path().join("stray.mp4");
        std::fs::write(&removable, "v").unwrap();
        let blocker = temp_dir.path().join("plain-file");
        std::fs::write(&blocker, "x").unwrap();
        // Its parent is a regular file, so removal fails with something other than NotFound.
        let unremovable = blocker.join("stray.pdf");

        let (removed, failures) = remove_orphans(&[removable.clone(), unremovable.clone()]);
        assert_eq!(removed, 1);
        assert_eq!(failures, vec![unremovable]);
        assert!(!removable.exists());
    }

    #[test]
    fn test_scan_of_empty_archive() {
        let t = TestArchive::new();
        let report = t.watchdog().run_scan(ScanMode::Repair).unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.collections_scanned, 0);
    }
}
