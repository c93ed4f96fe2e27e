mod models;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use schema::ARCHIVE_VERSIONED_SCHEMAS;
pub use store::{
    SqliteArchiveStore, SqliteCollections, SqliteImages, SqliteSheets, SqliteTrackSets,
    SqliteVideos,
};
pub use trait_def::{
    CollectionRepository, ImageRepository, Repository, SheetRepository, TrackSetRepository,
    VideoRepository,
};
