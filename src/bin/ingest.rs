//! Catalog ingestion CLI: index an audio file or a whole directory.
//!
//! Metadata falls back to `Artist - Title` parsed from the file name
//! when no overrides are given.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sha1::{Digest, Sha1};

use chorus::catalog::{Catalog, NewSong};
use chorus::config::Settings;
use chorus::fingerprint::fingerprint_bytes;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac", "opus"];

#[derive(Parser)]
#[command(name = "ingest", about = "Index songs for recognition")]
struct Args {
    /// Audio file or directory to index; defaults to the songs directory.
    path: Option<PathBuf>,

    /// Song title (overrides file metadata).
    #[arg(long)]
    title: Option<String>,

    /// Artist name (overrides file metadata).
    #[arg(long)]
    artist: Option<String>,

    /// Album name (overrides file metadata).
    #[arg(long)]
    album: Option<String>,

    /// Show catalog statistics and exit.
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::from_env()?;
    let catalog = Catalog::open(&settings.database_path).await?;

    if args.stats {
        let stats = catalog.stats().await?;
        println!("songs: {}  fingerprints: {}", stats.songs, stats.fingerprints);
        return Ok(());
    }

    let target = args.path.unwrap_or_else(|| settings.songs_dir.clone());
    if !target.exists() {
        bail!("path not found: {}", target.display());
    }

    let files = if target.is_file() {
        vec![target]
    } else {
        collect_audio_files(&target)?
    };
    if files.is_empty() {
        bail!(
            "no audio files found (supported extensions: {})",
            AUDIO_EXTENSIONS.join(", ")
        );
    }

    println!("indexing {} file(s)", files.len());
    let mut indexed = 0;
    for file in &files {
        match ingest_file(
            &catalog,
            file,
            args.title.as_deref(),
            args.artist.as_deref(),
            args.album.as_deref(),
        )
        .await
        {
            Ok(true) => indexed += 1,
            Ok(false) => {}
            Err(err) => eprintln!("  {}: {err:#}", file.display()),
        }
    }

    let stats = catalog.stats().await?;
    println!(
        "done: {indexed} new song(s); catalog now holds {} songs, {} fingerprints",
        stats.songs, stats.fingerprints
    );
    Ok(())
}

async fn ingest_file(
    catalog: &Catalog,
    path: &Path,
    title: Option<&str>,
    artist: Option<&str>,
    album: Option<&str>,
) -> Result<bool> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;

    let file_hash = hex::encode(Sha1::digest(&bytes));
    if catalog.find_by_file_hash(&file_hash).await?.is_some() {
        println!("  already indexed: {}", path.display());
        return Ok(false);
    }

    let started = Instant::now();
    let (fingerprints, duration) =
        tokio::task::spawn_blocking(move || fingerprint_bytes(&bytes)).await??;
    if fingerprints.is_empty() {
        println!("  no fingerprints extracted: {}", path.display());
        return Ok(false);
    }

    let (stem_artist, stem_title) = metadata_from_stem(path);
    let song = NewSong {
        title: title.map(str::to_string).unwrap_or(stem_title),
        artist: artist
            .map(str::to_string)
            .or(stem_artist)
            .unwrap_or_else(|| "Unknown".to_string()),
        album: album.unwrap_or_default().to_string(),
        duration,
        path: path.display().to_string(),
        file_hash,
        metadata: None,
    };
    let title = song.title.clone();

    let song_id = catalog.add_song(&song, &fingerprints).await?;
    println!(
        "  indexed '{}' (id {song_id}): {} fingerprints, {:.1}s of audio, in {:.1}s",
        title,
        fingerprints.len(),
        duration,
        started.elapsed().as_secs_f64()
    );
    Ok(true)
}

/// Parse `Artist - Title` out of a file stem; the whole stem becomes the
/// title when there is no separator.
fn metadata_from_stem(path: &Path) -> (Option<String>, String) {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Unknown".to_string());

    match stem.split_once(" - ") {
        Some((artist, title)) => (
            Some(artist.trim().to_string()),
            title.trim().to_string(),
        ),
        None => (None, stem),
    }
}

fn collect_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
        {
            files.push(path);
        }
    }
    Ok(())
}
