//! WAV byte builders shared by the decoder and pipeline tests.

use std::io::Cursor;

/// A well-formed 16-bit PCM WAV file written by hound
pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Hand-built RIFF/WAVE bytes for cases hound will not produce: odd format
/// tags, extra chunks, misaligned payloads, lying length fields.
pub struct RawWav {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub extra_chunks: Vec<([u8; 4], Vec<u8>)>,
    pub data: Vec<u8>,
    /// Overrides the size written in the data chunk header
    pub declared_data_len: Option<u32>,
}

impl RawWav {
    pub fn pcm16_mono(sample_rate: u32, samples: &[i16]) -> Self {
        Self {
            format_tag: 1,
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            extra_chunks: Vec::new(),
            data: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            declared_data_len: None,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let block_align = self.channels * (self.bits_per_sample / 8).max(1);
        let byte_rate = self.sample_rate * block_align as u32;

        let mut body = b"WAVE".to_vec();
        body.extend_from_slice(b"fmt ");
        body.extend_from_slice(&16u32.to_le_bytes());
        body.extend_from_slice(&self.format_tag.to_le_bytes());
        body.extend_from_slice(&self.channels.to_le_bytes());
        body.extend_from_slice(&self.sample_rate.to_le_bytes());
        body.extend_from_slice(&byte_rate.to_le_bytes());
        body.extend_from_slice(&block_align.to_le_bytes());
        body.extend_from_slice(&self.bits_per_sample.to_le_bytes());

        for (id, chunk) in &self.extra_chunks {
            body.extend_from_slice(id);
            body.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            body.extend_from_slice(chunk);
            if chunk.len() % 2 == 1 {
                body.push(0);
            }
        }

        body.extend_from_slice(b"data");
        let declared = self.declared_data_len.unwrap_or(self.data.len() as u32);
        body.extend_from_slice(&declared.to_le_bytes());
        body.extend_from_slice(&self.data);

        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend(body);
        out
    }
}

/// `count` samples of a ramp that never produces the bytes `RIFF`
pub fn ramp(count: usize, step: i16) -> Vec<i16> {
    (0..count as i16).map(|i| i.wrapping_mul(step)).collect()
}

/// A segment whose header is cut short: it starts with the marker but
/// cannot be parsed by any decoder
pub fn truncated_segment() -> Vec<u8> {
    let mut bytes = b"RIFF".to_vec();
    bytes.extend_from_slice(&36u32.to_le_bytes());
    bytes.extend_from_slice(b"WAV");
    bytes
}
