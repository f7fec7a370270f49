//! Manual RIFF/WAVE parser used when symphonia rejects a segment.
//!
//! Streamed segments often carry placeholder sizes (zero, or `u32::MAX`) in
//! their headers, or lose their tail to a cancelled request. This parser
//! walks the chunks itself, trusts whichever of the declared and available
//! lengths is shorter, and accepts only mono 16-bit signed PCM. Anything else
//! is rejected and the segment plays as silence.

use crate::audio::decoders::DecodedPcm;
use crate::audio::SegmentDecoder;
use crate::error::DecodeError;

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FMT_MIN_LEN: usize = 16;
const WAVE_FORMAT_PCM: u16 = 1;

/// Fields read from the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavFormat {
    fn is_mono_pcm16(&self) -> bool {
        self.format_tag == WAVE_FORMAT_PCM && self.channels == 1 && self.bits_per_sample == 16
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RiffParser;

impl RiffParser {
    pub fn new() -> Self {
        Self
    }

    /// Locate the `fmt ` and `data` chunks without decoding samples
    pub fn parse_layout(bytes: &[u8]) -> Result<(WavFormat, &[u8]), DecodeError> {
        if bytes.len() < RIFF_HEADER_LEN {
            return Err(DecodeError::Malformed(format!(
                "header truncated at {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
            return Err(DecodeError::Malformed("missing RIFF/WAVE signature".to_string()));
        }

        let mut format = None;
        let mut data = None;
        let mut pos = RIFF_HEADER_LEN;

        while pos + CHUNK_HEADER_LEN <= bytes.len() {
            let id = &bytes[pos..pos + 4];
            let declared = read_u32(bytes, pos + 4) as usize;
            let body_start = pos + CHUNK_HEADER_LEN;
            let body_len = declared.min(bytes.len() - body_start);
            let body = &bytes[body_start..body_start + body_len];

            match id {
                b"fmt " => {
                    if body.len() < FMT_MIN_LEN {
                        return Err(DecodeError::Malformed(format!(
                            "fmt chunk is {} bytes",
                            body.len()
                        )));
                    }
                    format = Some(WavFormat {
                        format_tag: read_u16(body, 0),
                        channels: read_u16(body, 2),
                        sample_rate: read_u32(body, 4),
                        bits_per_sample: read_u16(body, 14),
                    });
                }
                b"data" => {
                    data = Some(body);
                    break;
                }
                _ => {}
            }

            // Chunks are word aligned.
            pos = body_start
                .saturating_add(declared)
                .saturating_add(declared & 1);
        }

        let format = format.ok_or_else(|| DecodeError::Malformed("no fmt chunk".to_string()))?;
        let data = data.ok_or_else(|| DecodeError::Malformed("no data chunk".to_string()))?;
        Ok((format, data))
    }
}

impl SegmentDecoder for RiffParser {
    fn name(&self) -> &'static str {
        "riff"
    }

    fn decode(&self, bytes: &[u8]) -> Result<DecodedPcm, DecodeError> {
        let (format, data) = Self::parse_layout(bytes)?;

        if !format.is_mono_pcm16() {
            return Err(DecodeError::UnsupportedFormat {
                format: format!(
                    "tag {} / {} channel(s) / {}-bit",
                    format.format_tag, format.channels, format.bits_per_sample
                ),
            });
        }
        if format.sample_rate == 0 {
            return Err(DecodeError::Malformed("sample rate is zero".to_string()));
        }

        // chunks_exact drops a trailing odd byte
        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect();

        Ok(DecodedPcm {
            samples,
            sample_rate: format.sample_rate,
        })
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
