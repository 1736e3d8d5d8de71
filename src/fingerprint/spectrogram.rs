//! Framing, windowing and STFT magnitude extraction.

use std::f32::consts::PI;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::{FREQ_BINS, HOP_SIZE, WINDOW_SIZE};

/// Floor for the magnitude before the log, to keep silence finite.
const MAG_EPSILON: f32 = 1e-10;

/// Compute the dB magnitude spectrogram of `samples`, indexed `[t][f]`
/// with [`FREQ_BINS`] bins per frame.
pub fn spectrogram(samples: &[f32]) -> Vec<Vec<f32>> {
    magnitudes_db(frames(samples))
}

/// Split samples into Hann-windowed frames of [`WINDOW_SIZE`] with
/// [`HOP_SIZE`] overlap. Trailing partial frames are zero-padded.
///
/// The mean of the valid region is subtracted before windowing, so a
/// constant DC offset never reaches the spectrum.
pub fn frames(samples: &[f32]) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }

    let window = hann_window(WINDOW_SIZE);
    let mut frames = Vec::with_capacity(samples.len() / HOP_SIZE + 1);

    let mut position = 0;
    while position < samples.len() {
        let end = (position + WINDOW_SIZE).min(samples.len());
        let valid = end - position;
        let mean = samples[position..end].iter().sum::<f32>() / valid as f32;

        let mut frame = vec![0.0f32; WINDOW_SIZE];
        for i in 0..valid {
            frame[i] = (samples[position + i] - mean) * window[i];
        }
        frames.push(frame);

        position += HOP_SIZE;
    }

    frames
}

fn magnitudes_db(frames: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    if frames.is_empty() {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(WINDOW_SIZE);

    frames
        .into_par_iter()
        .map(|frame| {
            let mut buffer: Vec<Complex<f32>> = frame
                .iter()
                .map(|&v| Complex { re: v, im: 0.0 })
                .collect();
            fft.process(&mut buffer);

            buffer[..FREQ_BINS]
                .iter()
                .map(|c| {
                    let magnitude = (c.re * c.re + c.im * c.im).sqrt();
                    20.0 * magnitude.max(MAG_EPSILON).log10()
                })
                .collect()
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (n - 1.0)).cos()))
        .collect()
}
