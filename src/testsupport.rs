//! Deterministic synthetic signals and encoders for tests.

/// Small xorshift generator so tests never depend on ambient entropy.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    /// Uniform in [-1, 1].
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 23) as f32 * 2.0 - 1.0
    }
}

pub fn sine(freq: f32, secs: f64, rate: u32, amp: f32) -> Vec<f32> {
    let count = (secs * rate as f64) as usize;
    let step = 2.0 * std::f32::consts::PI * freq / rate as f32;
    let mut phase = 0.0f32;
    (0..count)
        .map(|_| {
            let sample = amp * phase.sin();
            phase = (phase + step) % (2.0 * std::f32::consts::PI);
            sample
        })
        .collect()
}

/// A melody stand-in: a sequence of half-second tones with a smooth
/// per-segment amplitude bump and a soft second harmonic, at seeded
/// pseudo-random frequencies. Each tone leaves a stable, well-separated
/// pair of constellation peaks.
pub fn tone_ladder(seed: u64, secs: f64, rate: u32, amp: f32) -> Vec<f32> {
    const SEGMENT_SECS: f32 = 0.5;

    let mut rng = XorShift::new(seed);
    let count = (secs * rate as f64) as usize;
    let segment_len = (SEGMENT_SECS * rate as f32) as usize;

    let mut samples = Vec::with_capacity(count);
    let mut phase = 0.0f32;
    let mut freq = 0.0f32;
    for i in 0..count {
        if i % segment_len == 0 {
            freq = 300.0 + (rng.next_u64() % 3_700) as f32;
        }
        let envelope = (std::f32::consts::PI * (i % segment_len) as f32 / segment_len as f32)
            .sin()
            .powi(2);
        phase += 2.0 * std::f32::consts::PI * freq / rate as f32;
        // keep the accumulator small so f32 phase stays accurate
        phase %= 2.0 * std::f32::consts::PI;
        samples.push(amp * envelope * (phase.sin() + 0.4 * (2.0 * phase).sin()));
    }
    samples
}

pub fn noise(count: usize, seed: u64, amp: f32) -> Vec<f32> {
    let mut rng = XorShift::new(seed);
    (0..count).map(|_| amp * rng.next_f32()).collect()
}

/// Low-frequency Gaussian-ish noise (one-pole filtered, energy below
/// ~50 Hz at 22.05 kHz), normalized to the requested RMS. Models the
/// rumble a microphone picks up from traffic or ventilation.
pub fn rumble(count: usize, seed: u64, rms: f32) -> Vec<f32> {
    let mut rng = XorShift::new(seed);
    let mut out = Vec::with_capacity(count);
    let mut accumulator = 0.0f32;
    for _ in 0..count {
        accumulator = 0.995 * accumulator + rng.next_f32();
        out.push(accumulator);
    }

    let measured = (out.iter().map(|v| v * v).sum::<f32>() / count.max(1) as f32)
        .sqrt()
        .max(f32::EPSILON);
    out.iter().map(|v| v * rms / measured).collect()
}

/// Encode interleaved samples as a 16-bit PCM WAV file in memory.
pub fn wav_bytes(samples: &[f32], rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    bytes
}
