//! Lifecycle coordination between archive records and their artifact files.
//!
//! Ordering rules:
//! - create and replace write the artifact first, then touch the record. A
//!   failed record write leaves an orphan file, which is logged and never a
//!   record pointing at nothing.
//! - delete removes artifacts first, then records.
//!
//! Operations on the same entity are expected to be serialised by the caller.
//! Nothing here takes a lock; paths are derived, never negotiated.

use super::error::{ArchiveError, ArchiveResult};
use super::files;
use super::placement::{
    candidate_placements, resolve_placement, validate_id, MediaCategory, PlacementIds,
};
use super::upload::Upload;
use crate::archive_store::*;
use crate::config::ArchiveConfig;
use anyhow::anyhow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One handle per entity kind.
#[derive(Clone)]
pub struct Repositories {
    pub collections: Arc<CollectionRepository>,
    pub track_sets: Arc<TrackSetRepository>,
    pub videos: Arc<VideoRepository>,
    pub images: Arc<ImageRepository>,
    pub sheets: Arc<SheetRepository>,
}

impl Repositories {
    pub fn sqlite(store: &SqliteArchiveStore) -> Self {
        Self {
            collections: Arc::new(store.collections()),
            track_sets: Arc::new(store.track_sets()),
            videos: Arc::new(store.videos()),
            images: Arc::new(store.images()),
            sheets: Arc::new(store.sheets()),
        }
    }
}

/// A record to create, with the fields the caller supplied.
#[derive(Debug, Clone)]
pub enum NewEntry {
    Collection(CollectionFields),
    Video(VideoFields),
    Image(ImageFields),
    Sheet(SheetFields),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedEntry {
    Collection(Collection),
    Video(Video),
    Image(Image),
    Sheet(Sheet),
}

impl CreatedEntry {
    pub fn id(&self) -> &str {
        match self {
            CreatedEntry::Collection(c) => &c.id,
            CreatedEntry::Video(v) => &v.id,
            CreatedEntry::Image(i) => &i.id,
            CreatedEntry::Sheet(s) => &s.id,
        }
    }
}

/// Record kinds paired with exactly one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandaloneKind {
    Video,
    Image,
    Sheet,
}

impl StandaloneKind {
    pub fn category(self) -> MediaCategory {
        match self {
            StandaloneKind::Video => MediaCategory::Video,
            StandaloneKind::Image => MediaCategory::Image,
            StandaloneKind::Sheet => MediaCategory::Sheet,
        }
    }

    fn name(self) -> &'static str {
        match self {
            StandaloneKind::Video => "Video",
            StandaloneKind::Image => "Image",
            StandaloneKind::Sheet => "Sheet",
        }
    }
}

pub(crate) fn mint_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Run a blocking repository call off the async executor.
pub(super) async fn blocking<R, T, F>(repo: &Arc<R>, call: F) -> ArchiveResult<T>
where
    R: ?Sized + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&R) -> anyhow::Result<T> + Send + 'static,
{
    let repo = Arc::clone(repo);
    let result = tokio::task::spawn_blocking(move || call(&repo))
        .await
        .map_err(|e| anyhow!("Repository task failed: {}", e))?;
    Ok(result?)
}

fn log_orphan(artifact: Option<&Path>, err: &ArchiveError) {
    if let Some(path) = artifact {
        error!(
            "Orphan artifact left at {:?}: record write failed: {}",
            path, err
        );
    }
}

pub struct ArchiveManager {
    pub(super) config: ArchiveConfig,
    pub(super) repos: Repositories,
}

impl ArchiveManager {
    pub fn new(config: ArchiveConfig, repos: Repositories) -> Self {
        Self { config, repos }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    // =========================================================================
    // Artifact helpers
    // =========================================================================

    /// Classify, place and write an upload that must be of `expected` category.
    /// With `replace`, copies of the same artifact under another extension are
    /// removed once the new file is in place.
    pub(super) async fn write_upload(
        &self,
        expected: MediaCategory,
        ids: PlacementIds<'_>,
        upload: Upload,
        replace: bool,
    ) -> ArchiveResult<PathBuf> {
        let format = upload.format()?;
        if format.category() != expected {
            return Err(ArchiveError::CategoryMismatch {
                expected,
                actual: format.category(),
            });
        }

        let placement = resolve_placement(&self.config, format, &ids)?;
        debug!(
            "Placing {} upload ({}) at {:?}",
            expected,
            upload.content_type(),
            placement.path()
        );
        files::write_stream(&placement, upload.into_reader()).await?;

        let path = placement.path();
        if replace {
            for stale in candidate_placements(&self.config, expected, &ids)? {
                let stale = stale.path();
                if stale != path && files::exists(&stale).await? {
                    files::remove_file(&stale).await?;
                }
            }
        }
        Ok(path)
    }

    /// Remove every candidate location of an artifact. Returns how many files
    /// existed; none existing is not an error.
    pub(super) async fn remove_artifact(
        &self,
        category: MediaCategory,
        ids: PlacementIds<'_>,
    ) -> ArchiveResult<usize> {
        let mut removed = 0;
        for placement in candidate_placements(&self.config, category, &ids)? {
            let path = placement.path();
            if files::exists(&path).await? && files::remove_file(&path).await? {
                removed += 1;
            }
        }
        if removed == 0 {
            warn!(
                "No {} artifact on disk for {}, nothing to remove",
                category, ids.record_id
            );
        }
        Ok(removed)
    }

    /// Where the artifact of `category` for `ids` currently is, if anywhere.
    pub async fn locate_artifact(
        &self,
        category: MediaCategory,
        ids: PlacementIds<'_>,
    ) -> ArchiveResult<Option<PathBuf>> {
        let candidates = candidate_placements(&self.config, category, &ids)?;
        files::find_existing(&candidates).await
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub async fn find_collection(&self, collection_id: &str) -> ArchiveResult<Option<Collection>> {
        let filter = RecordFilter::ById(collection_id.to_string());
        let found = blocking(&self.repos.collections, move |r| r.find(&filter)).await?;
        Ok(found.into_iter().next())
    }

    pub(super) async fn require_collection(&self, collection_id: &str) -> ArchiveResult<Collection> {
        self.find_collection(collection_id)
            .await?
            .ok_or_else(|| ArchiveError::not_found("Collection", collection_id))
    }

    pub async fn find_track_set(&self, collection_id: &str) -> ArchiveResult<Option<TrackSet>> {
        let filter = TrackSetFilter::ByCollection(collection_id.to_string());
        let found = blocking(&self.repos.track_sets, move |r| r.find(&filter)).await?;
        Ok(found.into_iter().next())
    }

    async fn standalone_exists(&self, kind: StandaloneKind, id: &str) -> ArchiveResult<bool> {
        let filter = RecordFilter::ById(id.to_string());
        let count = match kind {
            StandaloneKind::Video => {
                blocking(&self.repos.videos, move |r| r.find(&filter)).await?.len()
            }
            StandaloneKind::Image => {
                blocking(&self.repos.images, move |r| r.find(&filter)).await?.len()
            }
            StandaloneKind::Sheet => {
                blocking(&self.repos.sheets, move |r| r.find(&filter)).await?.len()
            }
        };
        Ok(count > 0)
    }

    /// Every collection with its tracks, in creation order.
    pub async fn list_collections(&self) -> ArchiveResult<Vec<CollectionListing>> {
        let collections = blocking(&self.repos.collections, |r| r.find(&RecordFilter::All)).await?;
        let track_sets = blocking(&self.repos.track_sets, |r| r.find(&TrackSetFilter::All)).await?;

        let mut tracks_by_collection: HashMap<String, Vec<Track>> = HashMap::new();
        for set in track_sets {
            tracks_by_collection
                .entry(set.collection_id)
                .or_default()
                .extend(set.tracks);
        }

        Ok(collections
            .into_iter()
            .map(|collection| {
                let tracks = tracks_by_collection
                    .remove(&collection.id)
                    .unwrap_or_default();
                CollectionListing { collection, tracks }
            })
            .collect())
    }

    pub async fn list_videos(&self) -> ArchiveResult<Vec<Video>> {
        blocking(&self.repos.videos, |r| r.find(&RecordFilter::All)).await
    }

    pub async fn list_images(&self) -> ArchiveResult<Vec<Image>> {
        blocking(&self.repos.images, |r| r.find(&RecordFilter::All)).await
    }

    pub async fn list_sheets(&self) -> ArchiveResult<Vec<Sheet>> {
        blocking(&self.repos.sheets, |r| r.find(&RecordFilter::All)).await
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Mint an id, write the optional upload at its derived location, then
    /// insert the record.
    pub async fn create_with_artifact(
        &self,
        entry: NewEntry,
        upload: Option<Upload>,
    ) -> ArchiveResult<CreatedEntry> {
        match entry {
            NewEntry::Collection(fields) => self
                .create_collection(fields, upload)
                .await
                .map(CreatedEntry::Collection),
            NewEntry::Video(fields) => self
                .create_video(fields, upload)
                .await
                .map(CreatedEntry::Video),
            NewEntry::Image(fields) => self
                .create_image(fields, upload)
                .await
                .map(CreatedEntry::Image),
            NewEntry::Sheet(fields) => self
                .create_sheet(fields, upload)
                .await
                .map(CreatedEntry::Sheet),
        }
    }

    async fn create_record<R>(
        &self,
        repo: &Arc<R>,
        category: MediaCategory,
        upload: Option<Upload>,
        build: impl FnOnce(String) -> R::Record,
    ) -> ArchiveResult<R::Record>
    where
        R: Repository + ?Sized + 'static,
        R::Record: Send + 'static,
    {
        let id = mint_id();

        let artifact = match upload {
            // Cover art is named after the collection, which is the new record itself.
            Some(upload) => Some(
                self.write_upload(category, PlacementIds::record(&id), upload, false)
                    .await?,
            ),
            None => None,
        };

        let record = build(id);
        let result = blocking(repo, move |r| r.insert(&record)).await;
        if let Err(e) = &result {
            log_orphan(artifact.as_deref(), e);
        }
        result
    }

    /// New collections start without a bundle. The optional upload is cover art.
    pub async fn create_collection(
        &self,
        fields: CollectionFields,
        cover_art: Option<Upload>,
    ) -> ArchiveResult<Collection> {
        let collection = self
            .create_record(
                &self.repos.collections,
                MediaCategory::Image,
                cover_art,
                |id| Collection {
                    id,
                    fields,
                    has_bundle: false,
                },
            )
            .await?;
        info!("Created collection {} ({})", collection.id, collection.fields.name);
        Ok(collection)
    }

    pub async fn create_video(
        &self,
        fields: VideoFields,
        upload: Option<Upload>,
    ) -> ArchiveResult<Video> {
        let video = self
            .create_record(&self.repos.videos, MediaCategory::Video, upload, |id| Video {
                id,
                fields,
            })
            .await?;
        info!("Created video {}", video.id);
        Ok(video)
    }

    pub async fn create_image(
        &self,
        fields: ImageFields,
        upload: Option<Upload>,
    ) -> ArchiveResult<Image> {
        let image = self
            .create_record(&self.repos.images, MediaCategory::Image, upload, |id| Image {
                id,
                fields,
            })
            .await?;
        info!("Created image {}", image.id);
        Ok(image)
    }

    pub async fn create_sheet(
        &self,
        fields: SheetFields,
        upload: Option<Upload>,
    ) -> ArchiveResult<Sheet> {
        let sheet = self
            .create_record(&self.repos.sheets, MediaCategory::Sheet, upload, |id| Sheet {
                id,
                fields,
            })
            .await?;
        info!("Created sheet {}", sheet.id);
        Ok(sheet)
    }

    // =========================================================================
    // Update
    // =========================================================================

    pub async fn update_collection(
        &self,
        collection_id: &str,
        fields: CollectionFields,
    ) -> ArchiveResult<Collection> {
        let filter = RecordFilter::ById(collection_id.to_string());
        let update = CollectionUpdate::Details(fields);
        blocking(&self.repos.collections, move |r| {
            r.update_fields(&filter, &update)
        })
        .await?
        .ok_or_else(|| ArchiveError::not_found("Collection", collection_id))
    }

    pub async fn update_video(&self, id: &str, fields: VideoFields) -> ArchiveResult<Video> {
        let filter = RecordFilter::ById(id.to_string());
        blocking(&self.repos.videos, move |r| r.update_fields(&filter, &fields))
            .await?
            .ok_or_else(|| ArchiveError::not_found("Video", id))
    }

    pub async fn update_image(&self, id: &str, fields: ImageFields) -> ArchiveResult<Image> {
        let filter = RecordFilter::ById(id.to_string());
        blocking(&self.repos.images, move |r| r.update_fields(&filter, &fields))
            .await?
            .ok_or_else(|| ArchiveError::not_found("Image", id))
    }

    pub async fn update_sheet(&self, id: &str, fields: SheetFields) -> ArchiveResult<Sheet> {
        let filter = RecordFilter::ById(id.to_string());
        blocking(&self.repos.sheets, move |r| r.update_fields(&filter, &fields))
            .await?
            .ok_or_else(|| ArchiveError::not_found("Sheet", id))
    }

    /// Overwrite the artifact of an existing record. The category comes from
    /// the upload; records are left untouched since paths are never stored.
    ///
    /// Images may belong to an image record or be a collection's cover art.
    /// Bundles go through [`ArchiveManager::attach_bundle`] so the collection
    /// flag follows the file. Track audio needs its collection and is replaced
    /// through [`ArchiveManager::update_track`].
    pub async fn replace_artifact(&self, id: &str, upload: Upload) -> ArchiveResult<PathBuf> {
        let category = upload.format()?.category();
        match category {
            MediaCategory::Image => {
                if !self.standalone_exists(StandaloneKind::Image, id).await? {
                    self.require_collection(id).await?;
                }
            }
            MediaCategory::Video => {
                if !self.standalone_exists(StandaloneKind::Video, id).await? {
                    return Err(ArchiveError::not_found("Video", id));
                }
            }
            MediaCategory::Sheet => {
                if !self.standalone_exists(StandaloneKind::Sheet, id).await? {
                    return Err(ArchiveError::not_found("Sheet", id));
                }
            }
            MediaCategory::Bundle => {
                self.attach_bundle(id, upload).await?;
                return self.bundle_path(id);
            }
            MediaCategory::TrackAudio => return Err(ArchiveError::MissingOwner { category }),
        }

        let path = self
            .write_upload(category, PlacementIds::record(id), upload, true)
            .await?;
        info!("Replaced {} artifact for {} at {:?}", category, id, path);
        Ok(path)
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    /// Append a track to the collection's track set, creating the set on first
    /// use. The track id is minted before placement so the audio file is named
    /// after it either way.
    pub async fn append_track(
        &self,
        collection_id: &str,
        fields: TrackFields,
        audio: Option<Upload>,
    ) -> ArchiveResult<Track> {
        validate_id(collection_id)?;
        self.require_collection(collection_id).await?;

        let track_id = mint_id();
        let artifact = match audio {
            Some(upload) => Some(
                self.write_upload(
                    MediaCategory::TrackAudio,
                    PlacementIds::in_collection(collection_id, &track_id),
                    upload,
                    false,
                )
                .await?,
            ),
            None => None,
        };

        let track = Track {
            id: track_id,
            fields,
        };
        let result = self.push_track(collection_id, track.clone()).await;
        if let Err(e) = &result {
            log_orphan(artifact.as_deref(), e);
        }
        result?;

        info!("Appended track {} to collection {}", track.id, collection_id);
        Ok(track)
    }

    async fn push_track(&self, collection_id: &str, track: Track) -> ArchiveResult<()> {
        match self.find_track_set(collection_id).await? {
            Some(_) => {
                let filter = TrackSetFilter::ByCollection(collection_id.to_string());
                let update = TrackSetUpdate::Push(track);
                blocking(&self.repos.track_sets, move |r| {
                    r.update_fields(&filter, &update)
                })
                .await?
                .ok_or_else(|| ArchiveError::not_found("TrackSet", collection_id))?;
            }
            None => {
                let set = TrackSet {
                    id: mint_id(),
                    collection_id: collection_id.to_string(),
                    tracks: vec![track],
                };
                blocking(&self.repos.track_sets, move |r| r.insert(&set)).await?;
            }
        }
        Ok(())
    }

    /// Update a track's fields in place and optionally replace its audio.
    ///
    /// The track is found by id alone, but its audio path also needs the
    /// owning collection, which the caller has to pass in.
    pub async fn update_track(
        &self,
        collection_id: &str,
        track_id: &str,
        fields: TrackFields,
        audio: Option<Upload>,
    ) -> ArchiveResult<Track> {
        let filter = TrackSetFilter::ContainingTrack(track_id.to_string());
        let owner = blocking(&self.repos.track_sets, move |r| r.find(&filter))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ArchiveError::not_found("Track", track_id))?;
        if owner.collection_id != collection_id {
            warn!(
                "Track {} belongs to collection {} but was updated as part of {}",
                track_id, owner.collection_id, collection_id
            );
        }

        if let Some(upload) = audio {
            let path = self
                .write_upload(
                    MediaCategory::TrackAudio,
                    PlacementIds::in_collection(collection_id, track_id),
                    upload,
                    true,
                )
                .await?;
            info!("Replaced audio of track {} at {:?}", track_id, path);
        }

        let filter = TrackSetFilter::ContainingTrack(track_id.to_string());
        let update = TrackSetUpdate::SetTrack {
            track_id: track_id.to_string(),
            fields,
        };
        let updated = blocking(&self.repos.track_sets, move |r| {
            r.update_fields(&filter, &update)
        })
        .await?
        .ok_or_else(|| ArchiveError::not_found("Track", track_id))?;

        updated
            .tracks
            .into_iter()
            .find(|t| t.id == track_id)
            .ok_or_else(|| ArchiveError::not_found("Track", track_id))
    }

    /// Remove the track's audio (if any), then pull it from the track set.
    pub async fn delete_track(&self, collection_id: &str, track_id: &str) -> ArchiveResult<()> {
        let ids = PlacementIds::in_collection(collection_id, track_id);
        // Validates both ids before anything is looked up.
        candidate_placements(&self.config, MediaCategory::TrackAudio, &ids)?;

        let set = self
            .find_track_set(collection_id)
            .await?
            .ok_or_else(|| ArchiveError::not_found("TrackSet", collection_id))?;
        if !set.contains_track(track_id) {
            return Err(ArchiveError::not_found("Track", track_id));
        }

        self.remove_artifact(MediaCategory::TrackAudio, ids).await?;

        let filter = TrackSetFilter::ByCollection(collection_id.to_string());
        let update = TrackSetUpdate::Pull {
            track_id: track_id.to_string(),
        };
        blocking(&self.repos.track_sets, move |r| {
            r.update_fields(&filter, &update)
        })
        .await?
        .ok_or_else(|| ArchiveError::not_found("TrackSet", collection_id))?;

        info!("Deleted track {} from collection {}", track_id, collection_id);
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove the collection's music directory (every track file and the
    /// bundle), its cover art, then the collection record and its track set.
    pub async fn delete_collection(&self, collection_id: &str) -> ArchiveResult<()> {
        validate_id(collection_id)?;
        self.require_collection(collection_id).await?;

        let music_dir = self.config.collection_dir(collection_id);
        if !files::remove_tree(&music_dir).await? {
            debug!("Collection {} had no music directory", collection_id);
        }
        self.remove_artifact(MediaCategory::Image, PlacementIds::collection(collection_id))
            .await?;

        let filter = RecordFilter::ById(collection_id.to_string());
        blocking(&self.repos.collections, move |r| r.remove_matching(&filter)).await?;
        let filter = TrackSetFilter::ByCollection(collection_id.to_string());
        blocking(&self.repos.track_sets, move |r| r.remove_matching(&filter)).await?;

        info!("Deleted collection {}", collection_id);
        Ok(())
    }

    /// Remove a video, image or sheet artifact, then its record.
    pub async fn delete_standalone(&self, kind: StandaloneKind, id: &str) -> ArchiveResult<()> {
        validate_id(id)?;
        if !self.standalone_exists(kind, id).await? {
            return Err(ArchiveError::not_found(kind.name(), id));
        }

        self.remove_artifact(kind.category(), PlacementIds::record(id))
            .await?;

        let filter = RecordFilter::ById(id.to_string());
        match kind {
            StandaloneKind::Video => {
                blocking(&self.repos.videos, move |r| r.remove_matching(&filter)).await?
            }
            StandaloneKind::Image => {
                blocking(&self.repos.images, move |r| r.remove_matching(&filter)).await?
            }
            StandaloneKind::Sheet => {
                blocking(&self.repos.sheets, move |r| r.remove_matching(&filter)).await?
            }
        };

        info!("Deleted {} {}", kind.name().to_lowercase(), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use tempfile::TempDir;

    mock! {
        pub Collections {}

        impl Repository for Collections {
            type Record = Collection;
            type Filter = RecordFilter;
            type Update = CollectionUpdate;

            fn find(&self, filter: &RecordFilter) -> anyhow::Result<Vec<Collection>>;
            fn insert(&self, record: &Collection) -> anyhow::Result<Collection>;
            fn update_fields(
                &self,
                filter: &RecordFilter,
                update: &CollectionUpdate,
            ) -> anyhow::Result<Option<Collection>>;
            fn remove_matching(&self, filter: &RecordFilter) -> anyhow::Result<usize>;
        }
    }

    struct TestManager {
        manager: ArchiveManager,
        root: PathBuf,
        _temp_dir: TempDir,
    }

    fn manager_with(collections: Option<MockCollections>) -> TestManager {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let store = SqliteArchiveStore::new(root.join("archive.db")).unwrap();
        let mut repos = Repositories::sqlite(&store);
        if let Some(collections) = collections {
            repos.collections = Arc::new(collections);
        }
        TestManager {
            manager: ArchiveManager::new(ArchiveConfig::new(&root), repos),
            root,
            _temp_dir: temp_dir,
        }
    }

    fn album() -> CollectionFields {
        CollectionFields {
            kind: "album".to_string(),
            name: "Blue Train".to_string(),
            artist: "John Coltrane".to_string(),
            ..Default::default()
        }
    }

    fn stored_collection(id: &str) -> Collection {
        Collection {
            id: id.to_string(),
            fields: album(),
            has_bundle: false,
        }
    }

    #[test]
    fn test_minted_ids_are_unique_and_placeable() {
        let a = mint_id();
        let b = mint_id();
        assert_ne!(a, b);
        assert!(validate_id(&a).is_ok());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_orphan_file_and_no_record() {
        let mut collections = MockCollections::new();
        collections
            .expect_insert()
            .times(1)
            .returning(|_| Err(anyhow!("database is locked")));
        let t = manager_with(Some(collections));

        let result = t
            .manager
            .create_collection(album(), Some(Upload::from_bytes("image/jpeg", "cover")))
            .await;
        assert!(matches!(result, Err(ArchiveError::PersistenceFailure(_))));

        // The artifact was written before the record, so it stays behind.
        let images: Vec<_> = std::fs::read_dir(t.root.join("images"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].extension().unwrap(), "jpeg");
    }

    #[tokio::test]
    async fn test_wrong_category_fails_before_any_write() {
        let t = manager_with(Some(MockCollections::new()));

        let result = t
            .manager
            .create_collection(album(), Some(Upload::from_bytes("audio/mp3", "not art")))
            .await;
        assert!(matches!(
            result,
            Err(ArchiveError::CategoryMismatch {
                expected: MediaCategory::Image,
                actual: MediaCategory::TrackAudio,
            })
        ));
        assert!(!t.root.join("images").exists());
    }

    #[tokio::test]
    async fn test_unknown_content_type_fails_before_any_write() {
        let t = manager_with(None);

        let result = t
            .manager
            .create_video(
                VideoFields::default(),
                Some(Upload::from_bytes("video/quicktime", "mov")),
            )
            .await;
        assert!(matches!(result, Err(ArchiveError::UnknownCategory { .. })));
        assert!(!t.root.join("videos").exists());
        assert!(t.manager.list_videos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_collection_lookup_failure_touches_no_files() {
        let mut collections = MockCollections::new();
        collections
            .expect_find()
            .returning(|_| Err(anyhow!("no such table: collections")));
        collections.expect_remove_matching().never();
        let t = manager_with(Some(collections));

        let music = t.root.join("music").join("c1");
        std::fs::create_dir_all(&music).unwrap();
        std::fs::write(music.join("t1.mp3"), "audio").unwrap();

        let result = t.manager.delete_collection("c1").await;
        assert!(matches!(result, Err(ArchiveError::PersistenceFailure(_))));
        assert!(music.join("t1.mp3").exists());
    }

    #[tokio::test]
    async fn test_delete_collection_removal_failure_after_files_gone() {
        let mut collections = MockCollections::new();
        collections
            .expect_find()
            .returning(|_| Ok(vec![stored_collection("c1")]));
        collections
            .expect_remove_matching()
            .times(1)
            .returning(|_| Err(anyhow!("disk I/O error")));
        let t = manager_with(Some(collections));

        let music = t.root.join("music").join("c1");
        std::fs::create_dir_all(&music).unwrap();
        std::fs::write(music.join("t1.mp3"), "audio").unwrap();

        let result = t.manager.delete_collection("c1").await;
        assert!(matches!(result, Err(ArchiveError::PersistenceFailure(_))));
        // Files go first; a record without files is the tolerated outcome.
        assert!(!music.exists());
    }

    #[tokio::test]
    async fn test_storage_failure_on_create_leaves_no_record() {
        let t = manager_with(None);
        // A plain file where the videos directory should be.
        std::fs::write(t.root.join("videos"), "not a directory").unwrap();

        let result = t
            .manager
            .create_video(VideoFields::default(), Some(Upload::from_bytes("video/mp4", "v")))
            .await;
        assert!(matches!(result, Err(ArchiveError::StorageUnavailable { .. })));
        assert!(t.manager.list_videos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_on_append_leaves_track_set_untouched() {
        let t = manager_with(None);
        let collection = t.manager.create_collection(album(), None).await.unwrap();
        std::fs::write(t.root.join("music"), "not a directory").unwrap();

        let result = t
            .manager
            .append_track(
                &collection.id,
                TrackFields::default(),
                Some(Upload::from_bytes("audio/mp3", "audio")),
            )
            .await;
        assert!(matches!(result, Err(ArchiveError::StorageUnavailable { .. })));
        assert!(t
            .manager
            .find_track_set(&collection.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_collection_directory_failure_is_fatal() {
        let t = manager_with(None);
        let collection = t
            .manager
            .create_collection(album(), Some(Upload::from_bytes("image/jpeg", "cover")))
            .await
            .unwrap();
        // music/{id} exists but is not a directory, so removing the tree fails.
        std::fs::create_dir_all(t.root.join("music")).unwrap();
        std::fs::write(t.manager.config.collection_dir(&collection.id), "x").unwrap();

        let result = t.manager.delete_collection(&collection.id).await;
        assert!(matches!(result, Err(ArchiveError::StorageUnavailable { .. })));

        assert!(t
            .manager
            .find_collection(&collection.id)
            .await
            .unwrap()
            .is_some());
        assert!(t
            .root
            .join("images")
            .join(format!("{}.jpeg", collection.id))
            .exists());
    }

    #[tokio::test]
    async fn test_update_collection_unknown_id() {
        let t = manager_with(None);
        let result = t.manager.update_collection("missing", album()).await;
        assert!(matches!(
            result,
            Err(ArchiveError::RecordNotFound {
                kind: "Collection",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_replace_artifact_unknown_record_writes_nothing() {
        let t = manager_with(None);
        let result = t
            .manager
            .replace_artifact("ghost", Upload::from_bytes("application/pdf", "pdf"))
            .await;
        assert!(matches!(
            result,
            Err(ArchiveError::RecordNotFound { kind: "Sheet", .. })
        ));
        assert!(!t.root.join("sheets").exists());
    }

    #[tokio::test]
    async fn test_replace_artifact_rejects_track_audio() {
        let t = manager_with(None);
        let result = t
            .manager
            .replace_artifact("t1", Upload::from_bytes("audio/wav", "pcm"))
            .await;
        assert!(matches!(
            result,
            Err(ArchiveError::MissingOwner {
                category: MediaCategory::TrackAudio
            })
        ));
    }

    #[tokio::test]
    async fn test_append_track_to_unknown_collection() {
        let t = manager_with(None);
        let result = t
            .manager
            .append_track(
                "nope",
                TrackFields::default(),
                Some(Upload::from_bytes("audio/mp3", "x")),
            )
            .await;
        assert!(matches!(
            result,
            Err(ArchiveError::RecordNotFound {
                kind: "Collection",
                ..
            })
        ));
        assert!(!t.root.join("music").exists());
    }

    #[tokio::test]
    async fn test_path_traversal_ids_rejected() {
        let t = manager_with(None);
        let result = t.manager.delete_collection("../etc").await;
        assert!(matches!(result, Err(ArchiveError::InvalidIdentifier { .. })));
        let result = t.manager.delete_track("c1", "../../x").await;
        assert!(matches!(result, Err(ArchiveError::InvalidIdentifier { .. })));
    }
}
