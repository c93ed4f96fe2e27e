//! SQLite schema definitions for the archive database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1
// =============================================================================

const COLLECTIONS_TABLE_V1: Table = Table {
    name: "collections",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("guests", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Text, non_null = true),
        sqlite_column!("label", &SqlType::Text, non_null = true),
        sqlite_column!("record_number", &SqlType::Text, non_null = true),
        sqlite_column!(
            "has_bundle",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

/// One row per collection that has ever had a track appended.
const TRACK_SETS_TABLE_V1: Table = Table {
    name: "track_sets",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        // References collections(id) by value only.
        sqlite_column!("collection_id", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["collection_id"]],
};

const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "track_set_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "track_sets",
                foreign_column: "id",
            })
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("composer", &SqlType::Text, non_null = true),
        sqlite_column!("lyrics", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_tracks_track_set", "track_set_id, position")],
    unique_constraints: &[],
};

const VIDEOS_TABLE_V1: Table = Table {
    name: "videos",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Text, non_null = true),
        sqlite_column!("people", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const IMAGES_TABLE_V1: Table = Table {
    name: "images",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Text, non_null = true),
        sqlite_column!("people", &SqlType::Text, non_null = true),
        sqlite_column!("location", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

const SHEETS_TABLE_V1: Table = Table {
    name: "sheets",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const ARCHIVE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[
        COLLECTIONS_TABLE_V1,
        TRACK_SETS_TABLE_V1,
        TRACKS_TABLE_V1,
        VIDEOS_TABLE_V1,
        IMAGES_TABLE_V1,
        SHEETS_TABLE_V1,
    ],
}];
