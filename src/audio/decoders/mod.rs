pub mod riff;
pub mod wav;

pub use riff::RiffParser;
pub use wav::WavDecoder;

use log::{debug, warn};

use crate::audio::resampler::LinearResampler;
use crate::audio::SegmentDecoder;
use crate::error::DecodeError;
use crate::models::{AudioSegment, PcmBuffer};

/// Mono samples at the rate declared by the segment, before resampling
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// What happened to one segment on its way through the chain
#[derive(Debug)]
pub struct DecodeOutcome {
    /// Resampled output; empty when every decoder failed
    pub buffer: PcmBuffer,
    /// Name of the decoder that succeeded
    pub decoder: Option<&'static str>,
    pub source_rate: Option<u32>,
    /// Decoders that were tried and failed, in order
    pub failures: Vec<(&'static str, DecodeError)>,
}

impl DecodeOutcome {
    pub fn is_failure(&self) -> bool {
        self.decoder.is_none()
    }

    /// True when the primary decoder failed but a later one recovered the segment
    pub fn used_fallback(&self) -> bool {
        self.decoder.is_some() && !self.failures.is_empty()
    }
}

/// Run attempts in order and stop at the first `Ok`.
///
/// Attempts are pulled lazily, so nothing after the first success runs.
pub fn first_success<T, E, I>(attempts: I) -> (Option<T>, Vec<E>)
where
    I: IntoIterator<Item = Result<T, E>>,
{
    let mut errors = Vec::new();
    for attempt in attempts {
        match attempt {
            Ok(value) => return (Some(value), errors),
            Err(err) => errors.push(err),
        }
    }
    (None, errors)
}

/// Ordered decoders plus the resampling step to the device rate.
///
/// `decode` never fails: a segment no decoder accepts becomes an empty buffer.
pub struct DecoderChain {
    decoders: Vec<Box<dyn SegmentDecoder>>,
    target_rate: u32,
}

impl DecoderChain {
    /// The standard chain: symphonia first, then the manual RIFF parser
    pub fn new(target_rate: u32) -> Self {
        Self::with_decoders(
            target_rate,
            vec![Box::new(WavDecoder::new()), Box::new(RiffParser::new())],
        )
    }

    pub fn with_decoders(target_rate: u32, decoders: Vec<Box<dyn SegmentDecoder>>) -> Self {
        Self { decoders, target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn decoder_names(&self) -> Vec<&'static str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn decode(&self, segment: &AudioSegment) -> DecodeOutcome {
        let attempts = self.decoders.iter().map(|decoder| {
            decoder
                .decode(&segment.bytes)
                .map(|pcm| (decoder.name(), pcm))
                .map_err(|err| (decoder.name(), err))
        });

        let (decoded, failures) = first_success(attempts);
        for (name, err) in &failures {
            debug!("Segment #{}: {} failed: {}", segment.index, name, err);
        }

        match decoded {
            Some((name, pcm)) => {
                let resampler = LinearResampler::new(pcm.sample_rate, self.target_rate);
                let samples = resampler.process(&pcm.samples);
                debug!(
                    "Segment #{} decoded by {}: {} samples @ {} Hz -> {} samples @ {} Hz",
                    segment.index,
                    name,
                    pcm.samples.len(),
                    pcm.sample_rate,
                    samples.len(),
                    self.target_rate
                );
                DecodeOutcome {
                    buffer: PcmBuffer::new(samples, self.target_rate),
                    decoder: Some(name),
                    source_rate: Some(pcm.sample_rate),
                    failures,
                }
            }
            None => {
                warn!(
                    "Segment #{} ({} bytes) could not be decoded; substituting silence",
                    segment.index,
                    segment.len()
                );
                DecodeOutcome {
                    buffer: PcmBuffer::empty(self.target_rate),
                    decoder: None,
                    source_rate: None,
                    failures,
                }
            }
        }
    }
}
