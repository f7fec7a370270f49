use std::io::Cursor;

use log::warn;
use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::decoders::DecodedPcm;
use crate::audio::SegmentDecoder;
use crate::error::DecodeError;

/// Primary segment decoder backed by symphonia.
///
/// Decodes one in-memory WAV segment completely and down-mixes it to mono by
/// averaging channels.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_segment(bytes: &[u8]) -> Result<DecodedPcm, DecodeError> {
        let media_source = MediaSourceStream::new(
            Box::new(Cursor::new(bytes.to_vec())),
            Default::default(),
        );

        let mut hint = Hint::new();
        hint.with_extension("wav");

        let detected = symphonia::default::get_probe()
            .format(&hint, media_source, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::UnsupportedFormat {
                format: format!("WAV format not recognized: {}", e),
            })?;

        let mut format_reader = detected.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::UnsupportedFormat {
                format: "No audio track found in segment".to_string(),
            })?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Malformed("segment declares no sample rate".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::DecodeFailed(format!("Failed to create WAV decoder: {}", e)))?;

        let mut samples = Vec::new();
        loop {
            let packet = match format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Failed to read packet: {}", err)));
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(audio_buf) => append_mono(audio_buf, &mut samples),
                Err(SymphoniaError::DecodeError(msg)) => {
                    // A damaged packet costs only that packet.
                    warn!("Skipping undecodable packet: {}", msg);
                }
                Err(err) => {
                    return Err(DecodeError::DecodeFailed(format!("Decoder error: {}", err)));
                }
            }
        }

        if samples.is_empty() {
            return Err(DecodeError::DecodeFailed("segment produced no samples".to_string()));
        }

        Ok(DecodedPcm { samples, sample_rate })
    }
}

impl SegmentDecoder for WavDecoder {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedPcm, DecodeError> {
        Self::decode_segment(bytes)
    }
}

/// Convert a decoded packet to f32 and fold its channels into `out`
fn append_mono(audio_buf: AudioBufferRef, out: &mut Vec<f32>) {
    let spec = *audio_buf.spec();
    let channels = spec.channels.count().max(1);
    let frames = audio_buf.frames();
    if frames == 0 {
        return;
    }

    let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
    sample_buf.copy_interleaved_ref(audio_buf);

    out.reserve(frames);
    if channels == 1 {
        out.extend(sample_buf.samples().iter().map(|s| s.clamp(-1.0, 1.0)));
    } else {
        out.extend(
            sample_buf
                .samples()
                .chunks_exact(channels)
                .map(|frame| (frame.iter().sum::<f32>() / channels as f32).clamp(-1.0, 1.0)),
        );
    }
}
