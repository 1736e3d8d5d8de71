//! Audio ingestion: container decoding, channel collapse and rate
//! conversion down to the canonical analysis stream.

pub mod decode;
pub mod resample;

pub use decode::{decode_bytes, DecodedAudio};
pub use resample::{resample_all, to_mono, StreamResampler};

use crate::error::EngineError;
use crate::fingerprint::SAMPLE_RATE;

/// Decode arbitrary audio bytes into mono samples at the canonical
/// analysis rate.
pub fn load_canonical(bytes: &[u8]) -> Result<Vec<f32>, EngineError> {
    let decoded = decode_bytes(bytes)?;
    let mono = to_mono(&decoded.samples, decoded.channels);
    resample_all(&mono, decoded.sample_rate, SAMPLE_RATE)
}
