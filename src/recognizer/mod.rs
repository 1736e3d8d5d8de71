//! Streaming recognition sessions.
//!
//! A session accumulates canonical-rate audio from a live source and
//! periodically runs the fingerprint + match pipeline over its buffer
//! until a match is accepted, the audio budget is exhausted, or the
//! client goes away. The [`Session`] state machine is transport-free;
//! [`stream`] drives it over a WebSocket.

pub mod messages;
pub mod stream;

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use crate::audio::StreamResampler;
use crate::catalog::{Catalog, Song};
use crate::error::EngineError;
use crate::fingerprint::{fingerprint_samples, SAMPLE_RATE};
use crate::matcher::{self, MatchReport};
use messages::StatusMessage;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Audio required before the first attempt.
    pub min_query_secs: f64,
    /// Fresh audio required between attempts.
    pub attempt_every_secs: f64,
    /// Accumulated audio after which a rejected attempt is terminal.
    pub max_query_secs: f64,
    /// Progress heartbeat period.
    pub tick: Duration,
    /// Kill the session after this long without incoming samples.
    pub idle_timeout: Duration,
    /// Budget for a single analysis attempt.
    pub attempt_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_query_secs: 3.0,
            attempt_every_secs: 2.0,
            max_query_secs: 12.0,
            tick: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the client's `config` frame.
    AwaitingConfig,
    Listening,
    /// An analysis attempt is in flight; ingestion continues.
    Analyzing,
    Matched,
    NoMatch,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Matched | Phase::NoMatch | Phase::Failed)
    }
}

/// Result of one analysis attempt over a buffer snapshot.
#[derive(Debug)]
pub enum AttemptResult {
    Match { song: Song, report: MatchReport },
    NoMatch,
    /// The buffer produced no fingerprints (silence or near-silence).
    NoPeaks,
    /// Internal error or timeout; the attempt is skipped, not the session.
    Skipped(String),
}

/// Per-connection recognition state. All audio is stored mono at the
/// canonical rate; the buffer slides forward once it reaches the
/// maximum query length, dropping the oldest samples.
pub struct Session {
    cfg: SessionConfig,
    phase: Phase,
    resampler: Option<StreamResampler>,
    buffer: VecDeque<f32>,
    capacity: usize,
    /// Canonical samples ever ingested, including slid-out ones.
    total_samples: u64,
    last_attempt_total: f64,
    scratch: Vec<f32>,
}

impl Session {
    pub fn new(cfg: SessionConfig) -> Self {
        let capacity = (cfg.max_query_secs * SAMPLE_RATE as f64) as usize;
        Self {
            cfg,
            phase: Phase::AwaitingConfig,
            resampler: None,
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            total_samples: 0,
            last_attempt_total: 0.0,
            scratch: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply the client's sample-rate configuration. Repeated `config`
    /// frames after the first are ignored.
    pub fn configure(&mut self, sample_rate: u32) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitingConfig {
            return Ok(());
        }
        if sample_rate == 0 {
            return Err(EngineError::Protocol(
                "config carried a sample rate of zero".to_string(),
            ));
        }
        self.resampler = Some(StreamResampler::new(sample_rate, SAMPLE_RATE)?);
        self.phase = Phase::Listening;
        Ok(())
    }

    /// Append a chunk of client PCM. Resample failures are fatal to the
    /// session.
    pub fn ingest(&mut self, pcm: &[f32]) -> Result<(), EngineError> {
        let Some(resampler) = &mut self.resampler else {
            return Err(EngineError::Protocol(
                "audio received before configuration".to_string(),
            ));
        };

        self.scratch.clear();
        resampler.push(pcm, &mut self.scratch)?;
        self.total_samples += self.scratch.len() as u64;
        self.buffer.extend(self.scratch.iter().copied());

        if self.buffer.len() > self.capacity {
            let excess = self.buffer.len() - self.capacity;
            self.buffer.drain(..excess);
        }
        Ok(())
    }

    /// Seconds of audio currently buffered.
    pub fn buffered_secs(&self) -> f64 {
        self.buffer.len() as f64 / SAMPLE_RATE as f64
    }

    /// Seconds of audio ever received.
    pub fn total_secs(&self) -> f64 {
        self.total_samples as f64 / SAMPLE_RATE as f64
    }

    /// Whether an analysis attempt should start now. Attempts fire on
    /// the regular cadence, plus one forced final attempt once the
    /// accumulated audio reaches the maximum query length.
    pub fn ready_for_attempt(&self) -> bool {
        if self.phase != Phase::Listening {
            return false;
        }
        if self.buffered_secs() < self.cfg.min_query_secs {
            return false;
        }
        let total = self.total_secs();
        total - self.last_attempt_total >= self.cfg.attempt_every_secs
            || (total >= self.cfg.max_query_secs && total > self.last_attempt_total)
    }

    /// Snapshot the buffer and enter [`Phase::Analyzing`].
    pub fn begin_attempt(&mut self) -> Vec<f32> {
        self.last_attempt_total = self.total_secs();
        self.phase = Phase::Analyzing;
        self.buffer.iter().copied().collect()
    }

    /// Fold an attempt result into the state machine. Returns the
    /// terminal message to send, if the session just ended.
    pub fn complete_attempt(&mut self, result: AttemptResult) -> Option<StatusMessage> {
        match result {
            AttemptResult::Match { song, report } => {
                self.phase = Phase::Matched;
                let analysis = song.metadata.clone().unwrap_or_else(|| json!({}));
                Some(StatusMessage::MatchFound {
                    song,
                    confidence: report.confidence,
                    analysis,
                })
            }
            AttemptResult::NoMatch => self.reject("could not identify the song"),
            AttemptResult::NoPeaks => {
                self.reject("no spectral peaks detected; the audio may be silent")
            }
            AttemptResult::Skipped(reason) => {
                warn!(%reason, "analysis attempt skipped");
                self.phase = Phase::Listening;
                None
            }
        }
    }

    /// Mark the session as terminally failed.
    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    fn reject(&mut self, message: &str) -> Option<StatusMessage> {
        if self.total_secs() >= self.cfg.max_query_secs {
            self.phase = Phase::NoMatch;
            Some(StatusMessage::no_match(message))
        } else {
            self.phase = Phase::Listening;
            None
        }
    }
}

/// Run one analysis attempt over a buffer snapshot: fingerprint on the
/// blocking pool, then probe the catalog. Internal failures come back
/// as [`AttemptResult::Skipped`]; the caller decides what is terminal.
pub async fn run_attempt(catalog: Catalog, samples: Vec<f32>) -> AttemptResult {
    let fingerprints =
        match tokio::task::spawn_blocking(move || fingerprint_samples(&samples)).await {
            Ok(fingerprints) => fingerprints,
            Err(err) => return AttemptResult::Skipped(format!("analysis task failed: {err}")),
        };

    if fingerprints.is_empty() {
        return AttemptResult::NoPeaks;
    }

    match matcher::find_match(&catalog, &fingerprints).await {
        Ok(Some(report)) => match catalog.get_song(report.song_id).await {
            Ok(Some(song)) => AttemptResult::Match { song, report },
            Ok(None) => AttemptResult::NoMatch,
            Err(err) => AttemptResult::Skipped(err.to_string()),
        },
        Ok(None) => AttemptResult::NoMatch,
        Err(err) => AttemptResult::Skipped(err.to_string()),
    }
}

/// Decode a little-endian f32 PCM frame. Trailing partial samples are
/// dropped.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
