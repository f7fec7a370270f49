use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Payload sent to the speech backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            language: None,
            speed: None,
        }
    }

    pub fn with_voice(mut self, voice: Option<String>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_speed(mut self, speed: Option<f32>) -> Self {
        self.speed = speed;
        self
    }
}

/// One container's worth of bytes cut from the network stream.
///
/// Starts with the `RIFF` marker, except for a markerless tail flushed when
/// the stream ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Position of the segment in the stream, starting at 0
    pub index: usize,
    pub bytes: Vec<u8>,
}

impl AudioSegment {
    pub fn new(index: usize, bytes: Vec<u8>) -> Self {
        Self { index, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded mono samples in [-1.0, 1.0] at the output device rate.
///
/// Immutable once built; the playback queue owns it after append.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Box<[f32]>,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
            sample_rate,
        }
    }

    /// Zero-length buffer standing in for a segment that could not be decoded
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Mixer state for one playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlaybackPhase {
    /// Playing queued audio, or waiting for the first buffer
    Filling = 0,
    /// Queue ran dry while more segments are expected; ramping to zero
    DrainingWithFade = 1,
    /// Every segment has played; emitting the trailing silence
    FinalSilence = 2,
    /// Terminal; output resources are released
    Stopped = 3,
}

impl PlaybackPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackPhase::Filling => "Filling",
            PlaybackPhase::DrainingWithFade => "Draining",
            PlaybackPhase::FinalSilence => "Final silence",
            PlaybackPhase::Stopped => "Stopped",
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PlaybackPhase::Filling,
            1 => PlaybackPhase::DrainingWithFade,
            2 => PlaybackPhase::FinalSilence,
            _ => PlaybackPhase::Stopped,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackPhase::Stopped)
    }
}

/// Point-in-time view of a playback session, published through the status hook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub session_id: u64,
    pub phase: PlaybackPhase,
    pub stream_fetching_complete: bool,
    pub all_segments_queued: bool,
    pub hard_stopped: bool,
    pub segments_assembled: usize,
    pub segments_decoded: usize,
    pub decode_failures: usize,
    pub buffers_queued: usize,
    pub buffers_consumed: usize,
    pub samples_played: u64,
    pub fade_entries: u64,
    pub sample_rate: u32,
    pub elapsed: Duration,
}

impl StatusSnapshot {
    /// Audio time played so far
    pub fn played_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_played as f64 / self.sample_rate as f64)
    }
}

/// Summary returned when a session finishes normally
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub segments: usize,
    pub decode_failures: usize,
    pub samples_played: u64,
    pub fade_entries: u64,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_request_serialization_skips_unset_fields() {
        let request = SpeechRequest::new("Hello there");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "Hello there" }));

        let request = SpeechRequest::new("Hi")
            .with_voice(Some("en-US-1".to_string()))
            .with_speed(Some(1.25));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["voice"], "en-US-1");
        assert_eq!(json["speed"], 1.25);
        assert!(json.get("language").is_none());
    }

    #[test]
    fn test_pcm_buffer_duration() {
        let buffer = PcmBuffer::new(vec![0.0; 24_000], 48_000);
        assert_eq!(buffer.len(), 24_000);
        assert!((buffer.duration().as_secs_f64() - 0.5).abs() < 1e-9);

        let empty = PcmBuffer::empty(48_000);
        assert!(empty.is_empty());
        assert_eq!(empty.duration(), Duration::ZERO);
    }

    #[test]
    fn test_phase_round_trips_through_u8() {
        for phase in [
            PlaybackPhase::Filling,
            PlaybackPhase::DrainingWithFade,
            PlaybackPhase::FinalSilence,
            PlaybackPhase::Stopped,
        ] {
            assert_eq!(PlaybackPhase::from_u8(phase as u8), phase);
        }
        assert!(PlaybackPhase::Stopped.is_terminal());
        assert!(!PlaybackPhase::FinalSilence.is_terminal());
    }

    #[test]
    fn test_played_duration() {
        let snapshot = StatusSnapshot {
            session_id: 1,
            phase: PlaybackPhase::Filling,
            stream_fetching_complete: false,
            all_segments_queued: false,
            hard_stopped: false,
            segments_assembled: 0,
            segments_decoded: 0,
            decode_failures: 0,
            buffers_queued: 0,
            buffers_consumed: 0,
            samples_played: 44_100,
            fade_entries: 0,
            sample_rate: 44_100,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(snapshot.played_duration(), Duration::from_secs(1));
    }
}
