//! Router assembly for the Chorus API.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::Catalog;
use crate::config::Settings;
use crate::routes;

/// Uploads carry whole songs; the default 2 MiB body cap is far too low.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Catalog,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/ws/recognize", get(routes::ws_recognize))
        .route("/api/recognize", post(routes::recognize_upload))
        .route("/api/songs", post(routes::add_song).get(routes::list_songs))
        .route("/api/songs/:id", delete(routes::remove_song))
        .route("/api/stats", get(routes::stats))
        .route("/api/health", get(routes::health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    layer.allow_origin(origins)
}
