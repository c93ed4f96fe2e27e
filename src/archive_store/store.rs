//! SQLite-backed implementation of the archive repositories.
//!
//! One connection is shared by every table handle. Each handle implements
//! [`Repository`] for a single entity kind.

use super::models::*;
use super::schema::ARCHIVE_VERSIONED_SCHEMAS;
use super::trait_def::Repository;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

type SharedConnection = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| anyhow!("Archive database connection lock poisoned"))
}

/// SQL suffix and bound arguments selecting records by their own id.
fn record_filter_clause(filter: &RecordFilter) -> (&'static str, Vec<&str>) {
    match filter {
        RecordFilter::All => ("", vec![]),
        RecordFilter::ById(id) => (" WHERE id = ?1", vec![id.as_str()]),
    }
}

fn first_matching_id(conn: &Connection, table: &str, filter: &RecordFilter) -> Result<Option<String>> {
    let (clause, args) = record_filter_clause(filter);
    let id = conn
        .query_row(
            &format!("SELECT id FROM {}{} ORDER BY rowid LIMIT 1", table, clause),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn remove_by_filter(conn: &Connection, table: &str, filter: &RecordFilter) -> Result<usize> {
    let (clause, args) = record_filter_clause(filter);
    let removed = conn.execute(
        &format!("DELETE FROM {}{}", table, clause),
        params_from_iter(args.iter()),
    )?;
    Ok(removed)
}

fn find_by_filter<T>(
    conn: &Connection,
    columns: &str,
    table: &str,
    filter: &RecordFilter,
    parse: fn(&rusqlite::Row) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let (clause, args) = record_filter_clause(filter);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {}{} ORDER BY rowid",
        columns, table, clause
    ))?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), parse)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone)]
pub struct SqliteArchiveStore {
    conn: SharedConnection,
}

impl SqliteArchiveStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let conn = Connection::open(path).context("Failed to open archive database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = ARCHIVE_VERSIONED_SCHEMAS
            .last()
            .context("No archive schema defined")?;

        if is_new_db {
            info!("Creating new archive database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;

            let schema = ARCHIVE_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version as i64 == db_version)
                .with_context(|| format!("Unknown archive database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Archive database schema validation failed for version {}",
                    db_version
                )
            })?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn collections(&self) -> SqliteCollections {
        SqliteCollections {
            conn: self.conn.clone(),
        }
    }

    pub fn track_sets(&self) -> SqliteTrackSets {
        SqliteTrackSets {
            conn: self.conn.clone(),
        }
    }

    pub fn videos(&self) -> SqliteVideos {
        SqliteVideos {
            conn: self.conn.clone(),
        }
    }

    pub fn images(&self) -> SqliteImages {
        SqliteImages {
            conn: self.conn.clone(),
        }
    }

    pub fn sheets(&self) -> SqliteSheets {
        SqliteSheets {
            conn: self.conn.clone(),
        }
    }
}

// =============================================================================
// Collections
// =============================================================================

pub struct SqliteCollections {
    conn: SharedConnection,
}

const COLLECTION_COLUMNS: &str =
    "id, kind, name, artist, guests, year, label, record_number, has_bundle";

impl SqliteCollections {
    fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
        Ok(Collection {
            id: row.get("id")?,
            fields: CollectionFields {
                kind: row.get("kind")?,
                name: row.get("name")?,
                artist: row.get("artist")?,
                guests: row.get("guests")?,
                year: row.get("year")?,
                label: row.get("label")?,
                record_number: row.get("record_number")?,
            },
            has_bundle: row.get::<_, i64>("has_bundle")? != 0,
        })
    }
}

impl Repository for SqliteCollections {
    type Record = Collection;
    type Filter = RecordFilter;
    type Update = CollectionUpdate;

    fn find(&self, filter: &RecordFilter) -> Result<Vec<Collection>> {
        let conn = lock(&self.conn)?;
        find_by_filter(
            &conn,
            COLLECTION_COLUMNS,
            "collections",
            filter,
            Self::row_to_collection,
        )
    }

    fn insert(&self, record: &Collection) -> Result<Collection> {
        let conn = lock(&self.conn)?;
        let f = &record.fields;
        conn.execute(
            "INSERT INTO collections (id, kind, name, artist, guests, year, label, record_number, has_bundle)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                f.kind,
                f.name,
                f.artist,
                f.guests,
                f.year,
                f.label,
                f.record_number,
                record.has_bundle as i64
            ],
        )?;
        Ok(record.clone())
    }

    fn update_fields(
        &self,
        filter: &RecordFilter,
        update: &CollectionUpdate,
    ) -> Result<Option<Collection>> {
        let conn = lock(&self.conn)?;
        let Some(id) = first_matching_id(&conn, "collections", filter)? else {
            return Ok(None);
        };

        match update {
            CollectionUpdate::Details(f) => {
                conn.execute(
                    "UPDATE collections SET kind = ?1, name = ?2, artist = ?3, guests = ?4,
                     year = ?5, label = ?6, record_number = ?7 WHERE id = ?8",
                    params![
                        f.kind,
                        f.name,
                        f.artist,
                        f.guests,
                        f.year,
                        f.label,
                        f.record_number,
                        id
                    ],
                )?;
            }
            CollectionUpdate::HasBundle(present) => {
                conn.execute(
                    "UPDATE collections SET has_bundle = ?1 WHERE id = ?2",
                    params![*present as i64, id],
                )?;
            }
        }

        let updated = conn
            .query_row(
                &format!("SELECT {} FROM collections WHERE id = ?1", COLLECTION_COLUMNS),
                params![id],
                Self::row_to_collection,
            )
            .optional()?;
        Ok(updated)
    }

    fn remove_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let conn = lock(&self.conn)?;
        remove_by_filter(&conn, "collections", filter)
    }
}

// =============================================================================
// Track sets
// =============================================================================

pub struct SqliteTrackSets {
    conn: SharedConnection,
}

impl SqliteTrackSets {
    /// (set id, collection id) pairs matching the filter, in creation order.
    fn matching_headers(conn: &Connection, filter: &TrackSetFilter) -> Result<Vec<(String, String)>> {
        let (sql, arg) = match filter {
            TrackSetFilter::All => ("SELECT id, collection_id FROM track_sets ORDER BY rowid", None),
            TrackSetFilter::ByCollection(collection_id) => (
                "SELECT id, collection_id FROM track_sets WHERE collection_id = ?1 ORDER BY rowid",
                Some(collection_id.as_str()),
            ),
            TrackSetFilter::ContainingTrack(track_id) => (
                "SELECT id, collection_id FROM track_sets
                 WHERE id IN (SELECT track_set_id FROM tracks WHERE id = ?1) ORDER BY rowid",
                Some(track_id.as_str()),
            ),
        };
        let mut stmt = conn.prepare(sql)?;
        let headers = stmt
            .query_map(params_from_iter(arg.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(headers)
    }

    fn load_tracks(conn: &Connection, track_set_id: &str) -> Result<Vec<Track>> {
        let mut stmt = conn.prepare(
            "SELECT id, title, composer, lyrics FROM tracks
             WHERE track_set_id = ?1 ORDER BY position",
        )?;
        let tracks = stmt
            .query_map(params![track_set_id], |row| {
                Ok(Track {
                    id: row.get("id")?,
                    fields: TrackFields {
                        title: row.get("title")?,
                        composer: row.get("composer")?,
                        lyrics: row.get("lyrics")?,
                    },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn load_set(conn: &Connection, id: String, collection_id: String) -> Result<TrackSet> {
        let tracks = Self::load_tracks(conn, &id)?;
        Ok(TrackSet {
            id,
            collection_id,
            tracks,
        })
    }

    fn insert_track(
        conn: &Connection,
        track_set_id: &str,
        position: i64,
        track: &Track,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO tracks (id, track_set_id, position, title, composer, lyrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                track.id,
                track_set_id,
                position,
                track.fields.title,
                track.fields.composer,
                track.fields.lyrics
            ],
        )?;
        Ok(())
    }
}

impl Repository for SqliteTrackSets {
    type Record = TrackSet;
    type Filter = TrackSetFilter;
    type Update = TrackSetUpdate;

    fn find(&self, filter: &TrackSetFilter) -> Result<Vec<TrackSet>> {
        let conn = lock(&self.conn)?;
        Self::matching_headers(&conn, filter)?
            .into_iter()
            .map(|(id, collection_id)| Self::load_set(&conn, id, collection_id))
            .collect()
    }

    fn insert(&self, record: &TrackSet) -> Result<TrackSet> {
        let mut conn = lock(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO track_sets (id, collection_id) VALUES (?1, ?2)",
            params![record.id, record.collection_id],
        )?;
        for (position, track) in record.tracks.iter().enumerate() {
            Self::insert_track(&tx, &record.id, position as i64, track)?;
        }
        tx.commit()?;
        Ok(record.clone())
    }

    fn update_fields(
        &self,
        filter: &TrackSetFilter,
        update: &TrackSetUpdate,
    ) -> Result<Option<TrackSet>> {
        let mut conn = lock(&self.conn)?;
        let Some((id, collection_id)) = Self::matching_headers(&conn, filter)?.into_iter().next()
        else {
            return Ok(None);
        };

        let tx = conn.transaction()?;
        match update {
            TrackSetUpdate::Push(track) => {
                let next_position: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(position) + 1, 0) FROM tracks WHERE track_set_id = ?1",
                    params![id],
                    |row| row.get(0),
                )?;
                Self::insert_track(&tx, &id, next_position, track)?;
            }
            TrackSetUpdate::SetTrack { track_id, fields } => {
                let changed = tx.execute(
                    "UPDATE tracks SET title = ?1, composer = ?2, lyrics = ?3
                     WHERE id = ?4 AND track_set_id = ?5",
                    params![fields.title, fields.composer, fields.lyrics, track_id, id],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
            }
            TrackSetUpdate::Pull { track_id } => {
                tx.execute(
                    "DELETE FROM tracks WHERE id = ?1 AND track_set_id = ?2",
                    params![track_id, id],
                )?;
            }
        }
        tx.commit()?;

        Ok(Some(Self::load_set(&conn, id, collection_id)?))
    }

    fn remove_matching(&self, filter: &TrackSetFilter) -> Result<usize> {
        let mut conn = lock(&self.conn)?;
        let headers = Self::matching_headers(&conn, filter)?;
        let tx = conn.transaction()?;
        for (id, _) in &headers {
            tx.execute("DELETE FROM tracks WHERE track_set_id = ?1", params![id])?;
            tx.execute("DELETE FROM track_sets WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(headers.len())
    }
}

// =============================================================================
// Videos, images, sheets
// =============================================================================

pub struct SqliteVideos {
    conn: SharedConnection,
}

impl SqliteVideos {
    fn row_to_video(row: &rusqlite::Row) -> rusqlite::Result<Video> {
        Ok(Video {
            id: row.get("id")?,
            fields: VideoFields {
                title: row.get("title")?,
                year: row.get("year")?,
                people: row.get("people")?,
            },
        })
    }
}

impl Repository for SqliteVideos {
    type Record = Video;
    type Filter = RecordFilter;
    type Update = VideoFields;

    fn find(&self, filter: &RecordFilter) -> Result<Vec<Video>> {
        let conn = lock(&self.conn)?;
        find_by_filter(&conn, "id, title, year, people", "videos", filter, Self::row_to_video)
    }

    fn insert(&self, record: &Video) -> Result<Video> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO videos (id, title, year, people) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.fields.title,
                record.fields.year,
                record.fields.people
            ],
        )?;
        Ok(record.clone())
    }

    fn update_fields(&self, filter: &RecordFilter, update: &VideoFields) -> Result<Option<Video>> {
        let conn = lock(&self.conn)?;
        let Some(id) = first_matching_id(&conn, "videos", filter)? else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE videos SET title = ?1, year = ?2, people = ?3 WHERE id = ?4",
            params![update.title, update.year, update.people, id],
        )?;
        Ok(Some(Video {
            id,
            fields: update.clone(),
        }))
    }

    fn remove_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let conn = lock(&self.conn)?;
        remove_by_filter(&conn, "videos", filter)
    }
}

pub struct SqliteImages {
    conn: SharedConnection,
}

impl SqliteImages {
    fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<Image> {
        Ok(Image {
            id: row.get("id")?,
            fields: ImageFields {
                title: row.get("title")?,
                year: row.get("year")?,
                people: row.get("people")?,
                location: row.get("location")?,
            },
        })
    }
}

impl Repository for SqliteImages {
    type Record = Image;
    type Filter = RecordFilter;
    type Update = ImageFields;

    fn find(&self, filter: &RecordFilter) -> Result<Vec<Image>> {
        let conn = lock(&self.conn)?;
        find_by_filter(
            &conn,
            "id, title, year, people, location",
            "images",
            filter,
            Self::row_to_image,
        )
    }

    fn insert(&self, record: &Image) -> Result<Image> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO images (id, title, year, people, location) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.fields.title,
                record.fields.year,
                record.fields.people,
                record.fields.location
            ],
        )?;
        Ok(record.clone())
    }

    fn update_fields(&self, filter: &RecordFilter, update: &ImageFields) -> Result<Option<Image>> {
        let conn = lock(&self.conn)?;
        let Some(id) = first_matching_id(&conn, "images", filter)? else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE images SET title = ?1, year = ?2, people = ?3, location = ?4 WHERE id = ?5",
            params![update.title, update.year, update.people, update.location, id],
        )?;
        Ok(Some(Image {
            id,
            fields: update.clone(),
        }))
    }

    fn remove_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let conn = lock(&self.conn)?;
        remove_by_filter(&conn, "images", filter)
    }
}

pub struct SqliteSheets {
    conn: SharedConnection,
}

impl SqliteSheets {
    fn row_to_sheet(row: &rusqlite::Row) -> rusqlite::Result<Sheet> {
        Ok(Sheet {
            id: row.get("id")?,
            fields: SheetFields {
                title: row.get("title")?,
                year: row.get("year")?,
            },
        })
    }
}

impl Repository for SqliteSheets {
    type Record = Sheet;
    type Filter = RecordFilter;
    type Update = SheetFields;

    fn find(&self, filter: &RecordFilter) -> Result<Vec<Sheet>> {
        let conn = lock(&self.conn)?;
        find_by_filter(&conn, "id, title, year", "sheets", filter, Self::row_to_sheet)
    }

    fn insert(&self, record: &Sheet) -> Result<Sheet> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO sheets (id, title, year) VALUES (?1, ?2, ?3)",
            params![record.id, record.fields.title, record.fields.year],
        )?;
        Ok(record.clone())
    }

    fn update_fields(&self, filter: &RecordFilter, update: &SheetFields) -> Result<Option<Sheet>> {
        let conn = lock(&self.conn)?;
        let Some(id) = first_matching_id(&conn, "sheets", filter)? else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE sheets SET title = ?1, year = ?2 WHERE id = ?3",
            params![update.title, update.year, id],
        )?;
        Ok(Some(Sheet {
            id,
            fields: update.clone(),
        }))
    }

    fn remove_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let conn = lock(&self.conn)?;
        remove_by_filter(&conn, "sheets", filter)
    }
}
