//! Repository trait definition.
//!
//! Every entity kind is reached through the same four operations. The
//! lifecycle coordinator never issues any other query shape.

use super::models::*;
use anyhow::Result;

pub trait Repository: Send + Sync {
    type Record;
    type Filter;
    type Update;

    /// All records matching `filter`, in storage order.
    fn find(&self, filter: &Self::Filter) -> Result<Vec<Self::Record>>;

    /// Insert a new record, returning it as stored.
    fn insert(&self, record: &Self::Record) -> Result<Self::Record>;

    /// Apply `update` to the first record matching `filter`.
    /// Returns `None` when nothing matched.
    fn update_fields(
        &self,
        filter: &Self::Filter,
        update: &Self::Update,
    ) -> Result<Option<Self::Record>>;

    /// Delete every record matching `filter`, returning how many were removed.
    fn remove_matching(&self, filter: &Self::Filter) -> Result<usize>;
}

pub type CollectionRepository =
    dyn Repository<Record = Collection, Filter = RecordFilter, Update = CollectionUpdate>;

pub type TrackSetRepository =
    dyn Repository<Record = TrackSet, Filter = TrackSetFilter, Update = TrackSetUpdate>;

pub type VideoRepository =
    dyn Repository<Record = Video, Filter = RecordFilter, Update = VideoFields>;

pub type ImageRepository =
    dyn Repository<Record = Image, Filter = RecordFilter, Update = ImageFields>;

pub type SheetRepository =
    dyn Repository<Record = Sheet, Filter = RecordFilter, Update = SheetFields>;
