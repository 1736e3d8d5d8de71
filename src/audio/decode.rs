use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::EngineError;

/// Interleaved PCM pulled out of a container, plus its stream parameters.
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Probe and decode the default audio track of `bytes`.
///
/// Corrupt packets are skipped; a stream yielding no samples at all is a
/// decode error.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio, EngineError> {
    let cursor = Cursor::new(bytes.to_vec());
    let stream = MediaSourceStream::new(Box::new(cursor), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| EngineError::Decode(format!("unsupported format: {err}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| EngineError::Decode("no default audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| EngineError::Decode("sample rate missing from stream".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .ok_or_else(|| EngineError::Decode("channel layout missing from stream".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| EngineError::Decode(format!("unsupported codec: {err}")))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(_) => continue,
        };

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() {
        return Err(EngineError::Decode(
            "no decodable audio packets".to_string(),
        ));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{sine, wav_bytes};

    #[test]
    fn decodes_mono_wav() {
        let samples = sine(440.0, 0.5, 22_050, 0.5);
        let bytes = wav_bytes(&samples, 22_050, 1);

        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples.len(), samples.len());
        // 16-bit quantization bounds the round-trip error
        for (a, b) in decoded.samples.iter().zip(&samples) {
            assert!((a - b).abs() < 1.0 / 16_384.0);
        }
    }

    #[test]
    fn decodes_stereo_wav() {
        let left = sine(440.0, 0.25, 44_100, 0.5);
        let mut interleaved = Vec::with_capacity(left.len() * 2);
        for &sample in &left {
            interleaved.push(sample);
            interleaved.push(-sample);
        }
        let bytes = wav_bytes(&interleaved, 44_100, 2);

        let decoded = decode_bytes(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 44_100);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.samples.len(), interleaved.len());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = decode_bytes(&[0u8; 64]);
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }
}
