//! Wire vocabulary of the streaming recognition protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Song;

/// Client-to-server control frames. Binary frames carry raw PCM and are
/// not represented here.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Config {
        #[serde(rename = "sampleRate")]
        sample_rate: u32,
    },
    Stop,
}

/// Server-to-client status frames. `MatchFound`, `NoMatch` and `Error`
/// are terminal: one of them is always the last frame of a session.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusMessage {
    Listening {
        duration: f64,
    },
    Analyzing,
    MatchFound {
        song: Song,
        confidence: f32,
        analysis: Value,
    },
    NoMatch {
        message: String,
    },
    Error {
        message: String,
    },
}

impl StatusMessage {
    pub fn listening(duration_secs: f64) -> Self {
        Self::Listening {
            duration: (duration_secs * 10.0).round() / 10.0,
        }
    }

    pub fn no_match(message: impl Into<String>) -> Self {
        Self::NoMatch {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
