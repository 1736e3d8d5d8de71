//! Persistent song catalog and inverted fingerprint index.

pub mod database;

pub use database::Catalog;

use serde::Serialize;
use serde_json::Value;

/// A catalog entry. Immutable after insert apart from the metadata blob.
#[derive(Debug, Clone, Serialize)]
pub struct Song {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: f64,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: i64,
}

/// Metadata for a song about to be inserted.
#[derive(Debug, Clone)]
pub struct NewSong {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: f64,
    pub path: String,
    /// Content digest of the source file, used for duplicate detection.
    pub file_hash: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CatalogStats {
    pub songs: i64,
    pub fingerprints: i64,
}
