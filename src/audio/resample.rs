//! Channel collapse and band-limited rate conversion.
//!
//! A single sinc filter instance is fed in fixed-size chunks so that
//! chunked (streaming) and whole-buffer conversion produce the same
//! output stream; the remainder is buffered between pushes and padded
//! with zeros exactly once on finalization.

use rayon::iter::ParallelIterator;
use rayon::slice::ParallelSlice;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::EngineError;

const CHUNK_SIZE: usize = 1024;

/// Collapse interleaved PCM to mono by channel averaging.
pub fn to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .par_chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Incremental resampler from an arbitrary input rate to a fixed output
/// rate. Equal rates bypass the filter entirely.
pub struct StreamResampler {
    inner: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self, EngineError> {
        if input_rate == 0 {
            return Err(EngineError::Resample("input rate of zero".to_string()));
        }
        if input_rate == output_rate {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            oversampling_factor: 64,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let inner = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            params,
            CHUNK_SIZE,
            1,
        )
        .map_err(|err| EngineError::Resample(err.to_string()))?;

        Ok(Self {
            inner: Some(inner),
            pending: Vec::new(),
        })
    }

    /// Feed input samples, appending any converted output to `out`.
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<f32>) -> Result<(), EngineError> {
        let Some(resampler) = &mut self.inner else {
            out.extend_from_slice(samples);
            return Ok(());
        };

        self.pending.extend_from_slice(samples);
        let mut consumed = 0;
        while self.pending.len() - consumed >= CHUNK_SIZE {
            let chunk = &self.pending[consumed..consumed + CHUNK_SIZE];
            let converted = resampler
                .process(&[chunk], None)
                .map_err(|err| EngineError::Resample(err.to_string()))?;
            out.extend_from_slice(&converted[0]);
            consumed += CHUNK_SIZE;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    /// Flush the buffered remainder, zero-padded to a full chunk.
    pub fn finalize(&mut self, out: &mut Vec<f32>) -> Result<(), EngineError> {
        let Some(resampler) = &mut self.inner else {
            return Ok(());
        };
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut padded = vec![0.0f32; CHUNK_SIZE];
        padded[..self.pending.len()].copy_from_slice(&self.pending);
        let converted = resampler
            .process(&[padded], None)
            .map_err(|err| EngineError::Resample(err.to_string()))?;
        out.extend_from_slice(&converted[0]);
        self.pending.clear();
        Ok(())
    }
}

/// Convert a whole buffer in one call.
pub fn resample_all(
    samples: &[f32],
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, EngineError> {
    let mut resampler = StreamResampler::new(input_rate, output_rate)?;
    let mut out = Vec::with_capacity(
        (samples.len() as f64 * output_rate as f64 / input_rate.max(1) as f64) as usize,
    );
    resampler.push(samples, &mut out)?;
    resampler.finalize(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::sine;

    #[test]
    fn equal_rates_pass_through() {
        let samples = sine(440.0, 0.5, 22_050, 0.5);
        let out = resample_all(&samples, 22_050, 22_050).unwrap();
        assert_eq!(out, samples);
    }

    #[test]
    fn halves_length_from_44100() {
        let samples = sine(440.0, 2.0, 44_100, 0.5);
        let out = resample_all(&samples, 44_100, 22_050).unwrap();
        let expected = samples.len() / 2;
        assert!((out.len() as i64 - expected as i64).unsigned_abs() < 2 * CHUNK_SIZE as u64);
    }

    #[test]
    fn mono_collapse_averages_channels() {
        let interleaved = [1.0, 0.0, 0.5, -0.5, -1.0, 1.0];
        assert_eq!(to_mono(&interleaved, 2), vec![0.5, 0.0, 0.0]);
    }

    #[test]
    fn chunked_pushes_match_single_push() {
        let samples = sine(1_000.0, 1.5, 44_100, 0.5);

        let whole = resample_all(&samples, 44_100, 22_050).unwrap();

        let mut chunked = Vec::new();
        let mut resampler = StreamResampler::new(44_100, 22_050).unwrap();
        for chunk in samples.chunks(777) {
            resampler.push(chunk, &mut chunked).unwrap();
        }
        resampler.finalize(&mut chunked).unwrap();

        assert_eq!(whole, chunked);
    }

    #[test]
    fn zero_input_rate_is_rejected() {
        assert!(StreamResampler::new(0, 22_050).is_err());
    }
}
