//! Environment-backed runtime settings.
//!
//! Every knob has a sensible default so a bare `chorus` invocation works
//! from an empty directory.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database file holding the catalog and fingerprint index.
    pub database_path: PathBuf,
    /// Directory where uploaded songs are persisted.
    pub songs_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; `*` opens the API to any origin.
    pub cors_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let database_path = env::var("CHORUS_DB")
            .unwrap_or_else(|_| "chorus.db".to_string())
            .into();
        let songs_dir = env::var("CHORUS_SONGS_DIR")
            .unwrap_or_else(|_| "songs".to_string())
            .into();
        let host = env::var("CHORUS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CHORUS_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("invalid CHORUS_PORT")?;
        let cors_origins = env::var("CHORUS_CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_path,
            songs_dir,
            host,
            port,
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.database_path, PathBuf::from("chorus.db"));
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.cors_origins.len(), 2);
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080");
    }
}
