//! HTTP route handlers: upload recognition, catalog management and the
//! WebSocket upgrade for live recognition.

use std::path::Path as FsPath;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use sha1::{Digest, Sha1};
use tracing::info;

use crate::catalog::{CatalogStats, NewSong, Song};
use crate::error::EngineError;
use crate::fingerprint::fingerprint_bytes;
use crate::matcher;
use crate::recognizer::messages::StatusMessage;
use crate::recognizer::stream;
use crate::server::AppState;

/// Error responses share the terminal message shape of the streaming
/// protocol: `{"status": "error", "message": ...}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Decode(_) | EngineError::Protocol(_) => Self::bad_request(err.to_string()),
            EngineError::Resample(_) | EngineError::Catalog(_) => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({"status": "error", "message": self.message}));
        (self.status, body).into_response()
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<CatalogStats>, ApiError> {
    Ok(Json(state.catalog.stats().await?))
}

pub async fn list_songs(State(state): State<AppState>) -> Result<Json<Vec<Song>>, ApiError> {
    Ok(Json(state.catalog.list_songs().await?))
}

pub async fn remove_song(
    State(state): State<AppState>,
    Path(song_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let song = state
        .catalog
        .get_song(song_id)
        .await?
        .ok_or_else(|| ApiError::not_found("song not found"))?;
    state.catalog.delete_song(song_id).await?;
    info!(song_id, title = %song.title, "deleted song");
    Ok(Json(json!({
        "status": "ok",
        "message": format!("deleted '{}'", song.title),
    })))
}

pub async fn ws_recognize(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    let catalog = state.catalog.clone();
    upgrade.on_upgrade(move |socket| stream::drive(socket, catalog))
}

/// Identify an uploaded audio file. The response matches the terminal
/// messages of the streaming protocol.
pub async fn recognize_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StatusMessage>, ApiError> {
    let upload = read_upload(multipart).await?;

    let (fingerprints, _duration) =
        tokio::task::spawn_blocking(move || fingerprint_bytes(&upload.bytes))
            .await
            .map_err(|err| ApiError::internal(format!("analysis task failed: {err}")))??;

    if fingerprints.is_empty() {
        return Ok(Json(StatusMessage::no_match(
            "no spectral peaks detected; the audio may be silent",
        )));
    }

    let Some(report) = matcher::find_match(&state.catalog, &fingerprints).await? else {
        return Ok(Json(StatusMessage::no_match("no matching song found")));
    };
    let Some(song) = state.catalog.get_song(report.song_id).await? else {
        return Ok(Json(StatusMessage::no_match("no matching song found")));
    };

    let analysis = song.metadata.clone().unwrap_or_else(|| json!({}));
    Ok(Json(StatusMessage::MatchFound {
        song,
        confidence: report.confidence,
        analysis,
    }))
}

/// Index an uploaded song. The file is fingerprinted, persisted under
/// the songs directory and written to the catalog in one transaction.
pub async fn add_song(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let upload = read_upload(multipart).await?;

    let file_hash = hex::encode(Sha1::digest(&upload.bytes));
    if state.catalog.find_by_file_hash(&file_hash).await?.is_some() {
        let body = Json(json!({"status": "exists", "message": "song already indexed"}));
        return Ok((StatusCode::CONFLICT, body).into_response());
    }

    let bytes = upload.bytes.clone();
    let (fingerprints, duration) = tokio::task::spawn_blocking(move || fingerprint_bytes(&bytes))
        .await
        .map_err(|err| ApiError::internal(format!("analysis task failed: {err}")))??;

    if fingerprints.is_empty() {
        let body = Json(json!({
            "status": "error",
            "message": "no fingerprints could be extracted from the file",
        }));
        return Ok((StatusCode::UNPROCESSABLE_ENTITY, body).into_response());
    }

    let file_name = FsPath::new(&upload.file_name)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let path = state.settings.songs_dir.join(&file_name);
    tokio::fs::create_dir_all(&state.settings.songs_dir)
        .await
        .map_err(|err| ApiError::internal(format!("cannot create songs dir: {err}")))?;
    tokio::fs::write(&path, &upload.bytes)
        .await
        .map_err(|err| ApiError::internal(format!("cannot persist upload: {err}")))?;

    let title = upload
        .title
        .unwrap_or_else(|| FsPath::new(&file_name).file_stem().map_or_else(
            || "Unknown".to_string(),
            |stem| stem.to_string_lossy().into_owned(),
        ));
    let song = NewSong {
        title,
        artist: upload.artist.unwrap_or_else(|| "Unknown".to_string()),
        album: upload.album.unwrap_or_default(),
        duration,
        path: path.display().to_string(),
        file_hash,
        metadata: None,
    };

    let song_id = state.catalog.add_song(&song, &fingerprints).await?;
    info!(song_id, title = %song.title, count = fingerprints.len(), "indexed song");

    let body = Json(json!({
        "status": "ok",
        "song_id": song_id,
        "fingerprints": fingerprints.len(),
        "duration": (duration * 10.0).round() / 10.0,
    }));
    Ok(body.into_response())
}

struct Upload {
    bytes: Vec<u8>,
    file_name: String,
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut upload = Upload {
        bytes: Vec::new(),
        file_name: "upload".to_string(),
        title: None,
        artist: None,
        album: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if let Some(name) = field.file_name() {
                    upload.file_name = name.to_string();
                }
                upload.bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError::bad_request(err.to_string()))?
                    .to_vec();
            }
            Some("title") => upload.title = read_text(field).await?,
            Some("artist") => upload.artist = read_text(field).await?,
            Some("album") => upload.album = read_text(field).await?,
            _ => {}
        }
    }

    if upload.bytes.is_empty() {
        return Err(ApiError::bad_request("missing or empty 'file' field"));
    }
    Ok(upload)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<Option<String>, ApiError> {
    let text = field
        .text()
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;
    let text = text.trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}
