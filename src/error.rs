use thiserror::Error;

/// Failure kinds reported by the engine's lower layers.
///
/// Empty fingerprints are deliberately not represented here: an empty
/// query is a well-defined empty result, and only the recognizer decides
/// how to surface it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("audio decode failed: {0}")]
    Decode(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("catalog failure: {0}")]
    Catalog(#[from] sqlx::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),
}
