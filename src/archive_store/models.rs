//! Records kept in the archive database.
//!
//! None of these carry a file path. Artifact locations are always recomputed
//! from the record id and media category by the placement resolver.

use serde::{Deserialize, Serialize};

// =============================================================================
// Collections
// =============================================================================

/// Editable descriptive fields of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFields {
    /// Category tag, e.g. "album", "live", "compilation".
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub artist: String,
    /// Free-form guest credits.
    pub guests: String,
    pub year: String,
    pub label: String,
    pub record_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    #[serde(flatten)]
    pub fields: CollectionFields,
    /// True iff `music/{id}/{id}.zip` exists.
    pub has_bundle: bool,
}

/// A collection joined with the tracks of its track set, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionListing {
    #[serde(flatten)]
    pub collection: Collection,
    pub tracks: Vec<Track>,
}

// =============================================================================
// Tracks
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackFields {
    pub title: String,
    pub composer: String,
    pub lyrics: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(flatten)]
    pub fields: TrackFields,
}

/// Ordered tracks of one collection. The collection is referenced by id only;
/// the set does not own it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSet {
    pub id: String,
    pub collection_id: String,
    pub tracks: Vec<Track>,
}

impl TrackSet {
    pub fn contains_track(&self, track_id: &str) -> bool {
        self.tracks.iter().any(|t| t.id == track_id)
    }
}

// =============================================================================
// Standalone media
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFields {
    pub title: String,
    pub year: String,
    pub people: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    #[serde(flatten)]
    pub fields: VideoFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFields {
    pub title: String,
    pub year: String,
    pub people: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(flatten)]
    pub fields: ImageFields,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetFields {
    pub title: String,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub id: String,
    #[serde(flatten)]
    pub fields: SheetFields,
}

// =============================================================================
// Filters and updates
// =============================================================================

/// Selects records of a kind keyed by their own id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    ById(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSetFilter {
    All,
    ByCollection(String),
    /// The set holding the given track id. Track ids are globally unique.
    ContainingTrack(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionUpdate {
    Details(CollectionFields),
    HasBundle(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSetUpdate {
    /// Append a track at the end of the sequence.
    Push(Track),
    /// Overwrite the fields of one track in place. Matches nothing if the
    /// selected set does not hold the track.
    SetTrack { track_id: String, fields: TrackFields },
    /// Remove a track from the sequence. Removing an absent track is not an error.
    Pull { track_id: String },
}
