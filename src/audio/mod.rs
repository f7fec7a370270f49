pub mod assembler;
pub mod buffer;
pub mod decoders;
pub mod device;
pub mod engine;
pub mod mixer;
pub mod resampler;
pub mod session;

#[cfg(test)]
pub mod tests;

use crate::error::DecodeError;

// Re-export pipeline stages
pub use assembler::{SegmentAssembler, SEGMENT_MARKER};
pub use buffer::{playback_queue, PlaybackQueue, QueueProducer, QueueStatus};
pub use decoders::{DecodeOutcome, DecodedPcm, DecoderChain, RiffParser, WavDecoder};
pub use mixer::{Mixer, MixerSettings};
pub use resampler::{resample, LinearResampler};
pub use session::PlaybackSession;

// Re-export output and orchestration types
pub use device::{DeviceInfo, DeviceManager, OutputBinding};
pub use engine::{EngineSettings, PlaybackControl, PlaybackHandle, TtsEngine};

/// One way of turning a complete segment into mono PCM
pub trait SegmentDecoder: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Decode the whole segment at its native sample rate
    fn decode(&self, bytes: &[u8]) -> Result<DecodedPcm, DecodeError>;
}

/// Source of output samples pulled by the realtime device callback.
///
/// Implementations must not block, allocate or perform I/O in `fill_buffer`.
pub trait AudioSink: Send + Sync {
    /// Fill `out` with mono samples, one per output frame
    fn fill_buffer(&self, out: &mut [f32]);

    fn sample_rate(&self) -> u32;

    /// True once the sink will only ever produce silence
    fn is_finished(&self) -> bool;
}
