//! Shared constants for archive tests

// ============================================================================
// Content types
// ============================================================================

pub const JPEG: &str = "image/jpeg";
pub const TIFF: &str = "image/tiff";
pub const MP3: &str = "audio/mp3";
pub const WAV: &str = "audio/wav";
pub const ZIP: &str = "application/zip";
pub const MP4: &str = "video/mp4";
pub const AVI: &str = "video/avi";
pub const PDF: &str = "application/pdf";

// ============================================================================
// Fixture data
// ============================================================================

pub const ALBUM_NAME: &str = "A Love Supreme";
pub const ALBUM_ARTIST: &str = "John Coltrane";

pub const TRACK_1_TITLE: &str = "Acknowledgement";
pub const TRACK_2_TITLE: &str = "Resolution";
pub const TRACK_3_TITLE: &str = "Pursuance";

pub const COVER_BYTES: &[u8] = b"\xff\xd8\xff\xe0cover";
pub const AUDIO_BYTES: &[u8] = b"ID3audio";
pub const BUNDLE_BYTES: &[u8] = b"PK\x03\x04bundle";
