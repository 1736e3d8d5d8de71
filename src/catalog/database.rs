//! SQLite-backed catalog store.
//!
//! Songs and their posting batches are written in a single transaction,
//! so a song is either fully indexed or absent. Fingerprint deletion
//! rides on the `song_id` cascade.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::catalog::{CatalogStats, NewSong, Song};
use crate::error::EngineError;
use crate::fingerprint::{Fingerprint, PairHash};

/// SQLite limits a statement to 999 bind variables; stay under it for
/// both the posting inserts (3 binds per row) and the hash lookups.
const LOOKUP_BATCH: usize = 900;
const INSERT_BATCH: usize = 300;

#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

impl Catalog {
    /// Open (creating if missing) the catalog at `path`.
    pub async fn open(path: &Path) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    /// Open a private in-memory catalog, for tests.
    pub async fn open_in_memory() -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(EngineError::Catalog)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        catalog.migrate().await?;
        Ok(catalog)
    }

    async fn migrate(&self) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS songs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT    NOT NULL,
                artist      TEXT    NOT NULL DEFAULT 'Unknown',
                album       TEXT    NOT NULL DEFAULT '',
                duration    REAL    NOT NULL DEFAULT 0,
                path        TEXT    NOT NULL DEFAULT '',
                file_hash   TEXT    UNIQUE,
                metadata    TEXT,
                created_at  INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fingerprints (
                hash        TEXT    NOT NULL,
                song_id     INTEGER NOT NULL REFERENCES songs(id) ON DELETE CASCADE,
                anchor_time INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fingerprints_hash ON fingerprints(hash)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a song and its posting batch atomically, returning the
    /// assigned id. Nothing is persisted on failure.
    pub async fn add_song(
        &self,
        song: &NewSong,
        fingerprints: &[Fingerprint],
    ) -> Result<i64, EngineError> {
        let mut tx = self.pool.begin().await?;

        let metadata = song
            .metadata
            .as_ref()
            .map(|value| value.to_string());
        let result = sqlx::query(
            r#"
            INSERT INTO songs (title, artist, album, duration, path, file_hash, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.duration)
        .bind(&song.path)
        .bind(&song.file_hash)
        .bind(metadata)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
        let song_id = result.last_insert_rowid();

        for chunk in fingerprints.chunks(INSERT_BATCH) {
            let mut sql =
                String::from("INSERT INTO fingerprints (hash, song_id, anchor_time) VALUES ");
            sql.push_str(&vec!["(?, ?, ?)"; chunk.len()].join(", "));

            let mut query = sqlx::query(&sql);
            for fingerprint in chunk {
                query = query
                    .bind(fingerprint.hash.to_hex())
                    .bind(song_id)
                    .bind(fingerprint.anchor_time as i64);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(song_id)
    }

    /// Remove a song; its postings go with it. Returns whether the song
    /// existed.
    pub async fn delete_song(&self, song_id: i64) -> Result<bool, EngineError> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(song_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_song(&self, song_id: i64) -> Result<Option<Song>, EngineError> {
        let row = sqlx::query(
            "SELECT id, title, artist, album, duration, path, metadata, created_at \
             FROM songs WHERE id = ?",
        )
        .bind(song_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_song).transpose()
    }

    pub async fn list_songs(&self) -> Result<Vec<Song>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, title, artist, album, duration, path, metadata, created_at \
             FROM songs ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_song).collect()
    }

    /// Look up a song by the content digest of its source file.
    pub async fn find_by_file_hash(&self, file_hash: &str) -> Result<Option<i64>, EngineError> {
        let row = sqlx::query("SELECT id FROM songs WHERE file_hash = ?")
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get::<i64, _>("id")))
    }

    /// Batched inverted-index probe: every posting whose hash appears in
    /// `hashes`, grouped by hash. Duplicates in the input are collapsed.
    pub async fn lookup(
        &self,
        hashes: &[PairHash],
    ) -> Result<HashMap<PairHash, Vec<(i64, u32)>>, EngineError> {
        let mut unique: Vec<String> = hashes.iter().map(PairHash::to_hex).collect();
        unique.sort_unstable();
        unique.dedup();

        let mut postings: HashMap<PairHash, Vec<(i64, u32)>> = HashMap::new();
        for chunk in unique.chunks(LOOKUP_BATCH) {
            let mut sql = String::from(
                "SELECT hash, song_id, anchor_time FROM fingerprints WHERE hash IN (",
            );
            sql.push_str(&vec!["?"; chunk.len()].join(", "));
            sql.push(')');

            let mut query = sqlx::query(&sql);
            for hash in chunk {
                query = query.bind(hash);
            }

            for row in query.fetch_all(&self.pool).await? {
                let hex: String = row.get("hash");
                let Some(hash) = PairHash::from_hex(&hex) else {
                    continue;
                };
                let song_id: i64 = row.get("song_id");
                let anchor_time: i64 = row.get("anchor_time");
                postings
                    .entry(hash)
                    .or_default()
                    .push((song_id, anchor_time as u32));
            }
        }

        Ok(postings)
    }

    pub async fn stats(&self) -> Result<CatalogStats, EngineError> {
        let songs: i64 = sqlx::query("SELECT COUNT(*) AS n FROM songs")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        let fingerprints: i64 = sqlx::query("SELECT COUNT(*) AS n FROM fingerprints")
            .fetch_one(&self.pool)
            .await?
            .get("n");
        Ok(CatalogStats {
            songs,
            fingerprints,
        })
    }
}

fn row_to_song(row: sqlx::sqlite::SqliteRow) -> Result<Song, EngineError> {
    let metadata: Option<String> = row.get("metadata");
    Ok(Song {
        id: row.get("id"),
        title: row.get("title"),
        artist: row.get("artist"),
        album: row.get("album"),
        duration: row.get("duration"),
        path: row.get("path"),
        metadata: metadata.and_then(|text| serde_json::from_str(&text).ok()),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::pair_hash;
    use serde_json::json;

    fn new_song(title: &str, file_hash: &str) -> NewSong {
        NewSong {
            title: title.to_string(),
            artist: "Tester".to_string(),
            album: String::new(),
            duration: 30.0,
            path: format!("/music/{title}.wav"),
            file_hash: file_hash.to_string(),
            metadata: Some(json!({"artwork_url": ""})),
        }
    }

    fn fingerprints(count: u32) -> Vec<Fingerprint> {
        (0..count)
            .map(|i| Fingerprint {
                hash: pair_hash(i, i + 1, 1),
                anchor_time: i,
            })
            .collect()
    }

    #[tokio::test]
    async fn add_get_list_round_trip() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let id = catalog
            .add_song(&new_song("first", "aaa"), &fingerprints(3))
            .await
            .unwrap();

        let song = catalog.get_song(id).await.unwrap().unwrap();
        assert_eq!(song.title, "first");
        assert_eq!(song.artist, "Tester");
        assert_eq!(song.metadata, Some(json!({"artwork_url": ""})));

        let listed = catalog.list_songs().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.songs, 1);
        assert_eq!(stats.fingerprints, 3);
    }

    #[tokio::test]
    async fn delete_cascades_to_postings() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let id = catalog
            .add_song(&new_song("gone", "bbb"), &fingerprints(10))
            .await
            .unwrap();

        assert!(catalog.delete_song(id).await.unwrap());
        assert!(catalog.get_song(id).await.unwrap().is_none());
        assert!(!catalog.delete_song(id).await.unwrap());

        let stats = catalog.stats().await.unwrap();
        assert_eq!(stats.songs, 0);
        assert_eq!(stats.fingerprints, 0);

        let hashes: Vec<PairHash> = fingerprints(10).iter().map(|fp| fp.hash).collect();
        assert!(catalog.lookup(&hashes).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingest_delete_reingest_reproduces_postings() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let baseline = catalog.stats().await.unwrap();
        let batch = fingerprints(50);

        let first = catalog
            .add_song(&new_song("again", "ccc"), &batch)
            .await
            .unwrap();
        catalog.delete_song(first).await.unwrap();

        let after_delete = catalog.stats().await.unwrap();
        assert_eq!(after_delete.songs, baseline.songs);
        assert_eq!(after_delete.fingerprints, baseline.fingerprints);

        let second = catalog
            .add_song(&new_song("again", "ccc"), &batch)
            .await
            .unwrap();
        assert_ne!(first, second);

        let hashes: Vec<PairHash> = batch.iter().map(|fp| fp.hash).collect();
        let postings = catalog.lookup(&hashes).await.unwrap();
        assert_eq!(postings.len(), batch.len());
        for fingerprint in &batch {
            assert_eq!(
                postings[&fingerprint.hash],
                vec![(second, fingerprint.anchor_time)]
            );
        }
    }

    #[tokio::test]
    async fn lookup_batches_past_the_bind_limit() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let batch = fingerprints(1_000);
        catalog
            .add_song(&new_song("big", "ddd"), &batch)
            .await
            .unwrap();

        let hashes: Vec<PairHash> = batch.iter().map(|fp| fp.hash).collect();
        let postings = catalog.lookup(&hashes).await.unwrap();
        assert_eq!(postings.len(), 1_000);
    }

    #[tokio::test]
    async fn duplicate_file_hash_is_discoverable() {
        let catalog = Catalog::open_in_memory().await.unwrap();
        let id = catalog
            .add_song(&new_song("dup", "eee"), &fingerprints(1))
            .await
            .unwrap();

        assert_eq!(catalog.find_by_file_hash("eee").await.unwrap(), Some(id));
        assert_eq!(catalog.find_by_file_hash("zzz").await.unwrap(), None);

        let err = catalog
            .add_song(&new_song("dup2", "eee"), &fingerprints(1))
            .await;
        assert!(err.is_err());
    }
}
