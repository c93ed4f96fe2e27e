//! Artifact placement.
//!
//! Maps an upload's declared media subtype and the ids of the entity it belongs
//! to onto a directory and file name under the archive root. Nothing here
//! touches the filesystem; the same inputs always give the same path, which is
//! why records never store one.

use super::error::{ArchiveError, ArchiveResult};
use crate::config::ArchiveConfig;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaCategory {
    /// Collection cover art or a standalone image record.
    Image,
    TrackAudio,
    /// Downloadable archive of a whole collection.
    Bundle,
    Video,
    Sheet,
}

impl MediaCategory {
    pub const ALL: [MediaCategory; 5] = [
        MediaCategory::Image,
        MediaCategory::TrackAudio,
        MediaCategory::Bundle,
        MediaCategory::Video,
        MediaCategory::Sheet,
    ];

    pub fn formats(self) -> &'static [MediaFormat] {
        match self {
            MediaCategory::Image => &[MediaFormat::Jpeg, MediaFormat::Jpg, MediaFormat::Tiff],
            MediaCategory::TrackAudio => &[MediaFormat::Mp3, MediaFormat::Wav],
            MediaCategory::Bundle => &[MediaFormat::Zip],
            MediaCategory::Video => &[MediaFormat::Mp4, MediaFormat::Avi],
            MediaCategory::Sheet => &[MediaFormat::Pdf],
        }
    }

    /// Every extension a file of this category can be stored under, without repeats.
    pub fn extensions(self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = Vec::new();
        for format in self.formats() {
            if !extensions.contains(&format.extension()) {
                extensions.push(format.extension());
            }
        }
        extensions
    }
}

impl fmt::Display for MediaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaCategory::Image => "image",
            MediaCategory::TrackAudio => "track audio",
            MediaCategory::Bundle => "bundle",
            MediaCategory::Video => "video",
            MediaCategory::Sheet => "sheet",
        };
        f.write_str(name)
    }
}

/// A recognised media subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Jpeg,
    Jpg,
    Tiff,
    Mp3,
    Wav,
    Zip,
    Mp4,
    Avi,
    Pdf,
}

impl MediaFormat {
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        match subtype {
            "jpeg" => Some(MediaFormat::Jpeg),
            "jpg" => Some(MediaFormat::Jpg),
            "tiff" => Some(MediaFormat::Tiff),
            "mp3" => Some(MediaFormat::Mp3),
            "wav" => Some(MediaFormat::Wav),
            "zip" => Some(MediaFormat::Zip),
            "mp4" => Some(MediaFormat::Mp4),
            "avi" => Some(MediaFormat::Avi),
            "pdf" => Some(MediaFormat::Pdf),
            _ => None,
        }
    }

    pub fn category(self) -> MediaCategory {
        match self {
            MediaFormat::Jpeg | MediaFormat::Jpg | MediaFormat::Tiff => MediaCategory::Image,
            MediaFormat::Mp3 | MediaFormat::Wav => MediaCategory::TrackAudio,
            MediaFormat::Zip => MediaCategory::Bundle,
            MediaFormat::Mp4 | MediaFormat::Avi => MediaCategory::Video,
            MediaFormat::Pdf => MediaCategory::Sheet,
        }
    }

    /// Extension used on disk. Every image is stored as `.jpeg` whatever its subtype.
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Jpeg | MediaFormat::Jpg | MediaFormat::Tiff => "jpeg",
            MediaFormat::Mp3 => "mp3",
            MediaFormat::Wav => "wav",
            MediaFormat::Zip => "zip",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Avi => "avi",
            MediaFormat::Pdf => "pdf",
        }
    }
}

/// Classify a declared `major/minor` content type. Only the part after the
/// first `/` is inspected; parameters such as `; charset=...` are ignored.
pub fn classify_content_type(content_type: &str) -> ArchiveResult<MediaFormat> {
    let subtype = match content_type.find('/') {
        Some(slash) => &content_type[slash + 1..],
        None => content_type,
    };
    let subtype = subtype.split(';').next().unwrap_or_default().trim();

    MediaFormat::from_subtype(&subtype.to_ascii_lowercase()).ok_or_else(|| {
        ArchiveError::UnknownCategory {
            content_type: content_type.to_string(),
        }
    })
}

/// Ids are joined into paths, so only plain tokens are accepted.
pub fn validate_id(id: &str) -> ArchiveResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ArchiveError::InvalidIdentifier { id: id.to_string() })
    }
}

/// Identifiers an artifact's location is derived from.
#[derive(Debug, Clone, Copy)]
pub struct PlacementIds<'a> {
    /// Id of the record the artifact belongs to: the new or existing image,
    /// video, sheet or track id, or the collection id for bundles.
    pub record_id: &'a str,
    /// Owning collection. Required for track audio; when present it also names
    /// images (cover art) and bundles.
    pub collection_id: Option<&'a str>,
}

impl<'a> PlacementIds<'a> {
    pub fn record(record_id: &'a str) -> Self {
        Self {
            record_id,
            collection_id: None,
        }
    }

    pub fn in_collection(collection_id: &'a str, record_id: &'a str) -> Self {
        Self {
            record_id,
            collection_id: Some(collection_id),
        }
    }

    /// Cover art and bundles are named after the collection itself.
    pub fn collection(collection_id: &'a str) -> Self {
        Self::in_collection(collection_id, collection_id)
    }

    fn owner(&self) -> &'a str {
        self.collection_id.unwrap_or(self.record_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPlacement {
    pub directory: PathBuf,
    pub file_name: String,
}

impl ArtifactPlacement {
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

pub fn resolve_placement(
    config: &ArchiveConfig,
    format: MediaFormat,
    ids: &PlacementIds<'_>,
) -> ArchiveResult<ArtifactPlacement> {
    place(config, format.category(), format.extension(), ids)
}

/// Every location an artifact of `category` for `ids` could occupy, one per
/// stored extension. Used when the format of an existing artifact is unknown.
pub fn candidate_placements(
    config: &ArchiveConfig,
    category: MediaCategory,
    ids: &PlacementIds<'_>,
) -> ArchiveResult<Vec<ArtifactPlacement>> {
    category
        .extensions()
        .into_iter()
        .map(|extension| place(config, category, extension, ids))
        .collect()
}

fn place(
    config: &ArchiveConfig,
    category: MediaCategory,
    extension: &str,
    ids: &PlacementIds<'_>,
) -> ArchiveResult<ArtifactPlacement> {
    validate_id(ids.record_id)?;
    if let Some(collection_id) = ids.collection_id {
        validate_id(collection_id)?;
    }

    let (directory, stem) = match category {
        MediaCategory::Image => (config.images_dir(), ids.owner()),
        MediaCategory::TrackAudio => {
            let collection_id = ids
                .collection_id
                .ok_or(ArchiveError::MissingOwner { category })?;
            (config.collection_dir(collection_id), ids.record_id)
        }
        MediaCategory::Bundle => {
            let collection_id = ids.owner();
            (config.collection_dir(collection_id), collection_id)
        }
        MediaCategory::Video => (config.videos_dir(), ids.record_id),
        MediaCategory::Sheet => (config.sheets_dir(), ids.record_id),
    };

    Ok(ArtifactPlacement {
        directory,
        file_name: format!("{}.{}", stem, extension),
    })
}
