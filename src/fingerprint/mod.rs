//! Acoustic fingerprinting pipeline.
//!
//! Wires framing, spectral analysis, peak picking and pair hashing
//! together. The constants below are part of the on-disk contract:
//! changing any of them invalidates existing catalogs.

pub mod hashing;
pub mod peaks;
pub mod spectrogram;

pub use hashing::{hash_peaks, pair_hash, PairHash};
pub use peaks::find_peaks;
pub use spectrogram::spectrogram;

use crate::audio::load_canonical;
use crate::error::EngineError;

/// Canonical analysis rate in Hz.
pub const SAMPLE_RATE: u32 = 22_050;
/// STFT window length in samples.
pub const WINDOW_SIZE: usize = 4_096;
/// STFT hop in samples (50% overlap).
pub const HOP_SIZE: usize = 2_048;
/// Frequency bins per frame.
pub const FREQ_BINS: usize = WINDOW_SIZE / 2 + 1;
/// Peaks below this level are discarded.
pub const FLOOR_DB: f32 = -60.0;
/// Side length of the square local-maximum neighborhood.
pub const PEAK_NEIGHBORHOOD: usize = 20;
/// Maximum partner peaks paired with a single anchor.
pub const FAN_OUT: usize = 15;
/// Minimum frame delta between paired peaks.
pub const MIN_TIME_DELTA: u32 = 1;
/// Maximum frame delta between paired peaks.
pub const MAX_TIME_DELTA: u32 = 200;
/// Maximum bin delta between paired peaks.
pub const MAX_FREQ_DELTA: u32 = 200;

/// A constellation point: time bin and frequency bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peak {
    pub t: u32,
    pub f: u32,
}

/// One posting-to-be: an 80-bit pair hash and its anchor time bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: PairHash,
    pub anchor_time: u32,
}

/// Fingerprint mono samples already at [`SAMPLE_RATE`].
///
/// Inputs shorter than one second produce no fingerprints; silence and
/// other peak-free signals produce an empty vector, never an error.
pub fn fingerprint_samples(samples: &[f32]) -> Vec<Fingerprint> {
    if samples.len() < SAMPLE_RATE as usize {
        return Vec::new();
    }

    let spectrum = spectrogram(samples);
    let peaks = find_peaks(&spectrum);
    hash_peaks(&peaks)
}

/// Decode, resample and fingerprint raw audio bytes. Returns the
/// fingerprints together with the decoded duration in seconds.
pub fn fingerprint_bytes(bytes: &[u8]) -> Result<(Vec<Fingerprint>, f64), EngineError> {
    let samples = load_canonical(bytes)?;
    let duration = samples.len() as f64 / SAMPLE_RATE as f64;
    Ok((fingerprint_samples(&samples), duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{noise, tone_ladder};

    #[test]
    fn fingerprinting_is_deterministic() {
        let samples = tone_ladder(7, 5.0, SAMPLE_RATE, 0.5);
        let first = fingerprint_samples(&samples);
        let second = fingerprint_samples(&samples);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn silence_yields_no_fingerprints() {
        let silence = vec![0.0f32; SAMPLE_RATE as usize * 6];
        assert!(fingerprint_samples(&silence).is_empty());
    }

    #[test]
    fn sub_second_input_yields_no_fingerprints() {
        let samples = noise(SAMPLE_RATE as usize / 2, 3, 0.5);
        assert!(fingerprint_samples(&samples).is_empty());
    }

    #[test]
    fn anchor_times_stay_in_bounds() {
        let samples = tone_ladder(9, 4.0, SAMPLE_RATE, 0.5);
        let last_frame = samples.len().div_ceil(HOP_SIZE) as u32;
        for fingerprint in fingerprint_samples(&samples) {
            assert!(fingerprint.anchor_time < last_frame);
        }
    }
}
