use std::time::Duration;

use crate::audio::buffer::PlaybackQueue;
use crate::models::PlaybackPhase;

/// Fade and trailing-silence lengths in output samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerSettings {
    pub fade_duration_samples: usize,
    pub final_silence_samples: usize,
}

impl MixerSettings {
    pub fn for_rate(sample_rate: u32, fade: Duration, final_silence: Duration) -> Self {
        Self {
            fade_duration_samples: duration_to_samples(fade, sample_rate),
            final_silence_samples: duration_to_samples(final_silence, sample_rate),
        }
    }
}

fn duration_to_samples(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

/// Per-sample playback state machine pulled by the output callback.
///
/// Everything here runs on the audio thread: no locks, no I/O, no allocation.
#[derive(Debug)]
pub struct Mixer {
    queue: PlaybackQueue,
    settings: MixerSettings,
    phase: PlaybackPhase,
    last_played_sample: f32,
    intermediate_silence_counter: usize,
    final_silence_counter: usize,
    samples_played: u64,
    fade_entries: u64,
}

impl Mixer {
    pub fn new(queue: PlaybackQueue, settings: MixerSettings) -> Self {
        Self {
            queue,
            settings,
            phase: PlaybackPhase::Filling,
            last_played_sample: 0.0,
            intermediate_silence_counter: 0,
            final_silence_counter: 0,
            samples_played: 0,
            fade_entries: 0,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn settings(&self) -> MixerSettings {
        self.settings
    }

    /// Samples taken from the queue (silence and fade tails excluded)
    pub fn samples_played(&self) -> u64 {
        self.samples_played
    }

    /// Times the queue ran dry while more audio was still expected
    pub fn fade_entries(&self) -> u64 {
        self.fade_entries
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    /// Jump straight to `Stopped`, abandoning anything still queued
    pub fn force_stop(&mut self) {
        self.phase = PlaybackPhase::Stopped;
    }

    /// Fill `out` with mono samples and return the phase afterwards
    pub fn render(&mut self, out: &mut [f32], all_segments_queued: bool) -> PlaybackPhase {
        for slot in out.iter_mut() {
            *slot = self.next_output_sample(all_segments_queued);
        }
        self.phase
    }

    /// Produce one output sample
    pub fn next_output_sample(&mut self, all_segments_queued: bool) -> f32 {
        match self.phase {
            PlaybackPhase::Stopped => return 0.0,
            PlaybackPhase::FinalSilence => {
                self.count_final_silence();
                return 0.0;
            }
            PlaybackPhase::Filling | PlaybackPhase::DrainingWithFade => {}
        }

        if let Some(sample) = self.queue.next_sample() {
            self.phase = PlaybackPhase::Filling;
            self.last_played_sample = sample;
            self.intermediate_silence_counter = 0;
            self.samples_played += 1;
            return sample;
        }

        if all_segments_queued {
            self.phase = PlaybackPhase::FinalSilence;
            self.final_silence_counter = 0;
            self.count_final_silence();
            return 0.0;
        }

        if self.phase != PlaybackPhase::DrainingWithFade {
            self.phase = PlaybackPhase::DrainingWithFade;
            self.fade_entries += 1;
        }

        let fade_ratio = if self.settings.fade_duration_samples == 0 {
            1.0
        } else {
            (self.intermediate_silence_counter as f32 / self.settings.fade_duration_samples as f32)
                .min(1.0)
        };
        // saturate so a long stall cannot overflow the counter
        self.intermediate_silence_counter = self.intermediate_silence_counter.saturating_add(1);
        self.last_played_sample * (1.0 - fade_ratio)
    }

    fn count_final_silence(&mut self) {
        self.final_silence_counter += 1;
        if self.final_silence_counter >= self.settings.final_silence_samples {
            self.phase = PlaybackPhase::Stopped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::{playback_queue, QueueProducer};
    use crate::models::PcmBuffer;

    fn mixer(fade: usize, final_silence: usize) -> (QueueProducer, Mixer) {
        let (producer, queue) = playback_queue();
        let settings = MixerSettings {
            fade_duration_samples: fade,
            final_silence_samples: final_silence,
        };
        (producer, Mixer::new(queue, settings))
    }

    fn append(producer: &QueueProducer, samples: &[f32]) {
        producer.append(PcmBuffer::new(samples.to_vec(), 48_000));
    }

    #[test]
    fn test_settings_from_durations() {
        let settings = MixerSettings::for_rate(48_000, Duration::from_millis(20), Duration::from_millis(500));
        assert_eq!(settings.fade_duration_samples, 960);
        assert_eq!(settings.final_silence_samples, 24_000);
    }

    #[test]
    fn test_plays_queued_samples() {
        let (producer, mut mixer) = mixer(4, 8);
        append(&producer, &[0.1, 0.2, 0.3]);

        let mut out = [0.0; 3];
        let phase = mixer.render(&mut out, false);
        assert_eq!(out, [0.1, 0.2, 0.3]);
        assert_eq!(phase, PlaybackPhase::Filling);
        assert_eq!(mixer.samples_played(), 3);
    }

    #[test]
    fn test_fade_is_monotonic_and_reaches_zero() {
        let (producer, mut mixer) = mixer(8, 100);
        append(&producer, &[0.5, -0.8]);

        let mut out = [0.0; 2];
        mixer.render(&mut out, false);

        let mut fade = [1.0f32; 20];
        mixer.render(&mut fade, false);
        assert_eq!(mixer.phase(), PlaybackPhase::DrainingWithFade);

        let last = 0.8f32;
        let mut previous = f32::INFINITY;
        for sample in fade {
            let magnitude = sample.abs();
            assert!(magnitude <= last + f32::EPSILON);
            assert!(magnitude <= previous);
            previous = magnitude;
        }
        assert_eq!(fade[8], 0.0);
        assert!(fade[8..].iter().all(|s| *s == 0.0));
        assert_eq!(mixer.fade_entries(), 1);
    }

    #[test]
    fn test_fade_starts_from_last_sample() {
        let (producer, mut mixer) = mixer(4, 100);
        append(&producer, &[1.0]);
        assert_eq!(mixer.next_output_sample(false), 1.0);

        let ramp: Vec<f32> = (0..5).map(|_| mixer.next_output_sample(false)).collect();
        assert_eq!(ramp, vec![1.0, 0.75, 0.5, 0.25, 0.0]);
    }

    #[test]
    fn test_resume_after_fade_resets_counter() {
        let (producer, mut mixer) = mixer(4, 100);
        append(&producer, &[1.0]);
        mixer.next_output_sample(false);
        for _ in 0..10 {
            mixer.next_output_sample(false);
        }

        append(&producer, &[0.5]);
        assert_eq!(mixer.next_output_sample(false), 0.5);
        assert_eq!(mixer.phase(), PlaybackPhase::Filling);

        // The next underrun fades from the new sample, from the top.
        assert_eq!(mixer.next_output_sample(false), 0.5);
        assert_eq!(mixer.next_output_sample(false), 0.375);
        assert_eq!(mixer.fade_entries(), 2);
    }

    #[test]
    fn test_zero_length_fade_is_immediate_silence() {
        let (producer, mut mixer) = mixer(0, 100);
        append(&producer, &[0.9]);
        mixer.next_output_sample(false);
        assert_eq!(mixer.next_output_sample(false), 0.0);
    }

    #[test]
    fn test_final_silence_then_stopped() {
        let (producer, mut mixer) = mixer(4, 10);
        append(&producer, &[0.3, 0.3]);

        let mut out = [1.0f32; 2];
        mixer.render(&mut out, true);
        assert_eq!(mixer.phase(), PlaybackPhase::Filling);

        let mut silent = 0;
        while mixer.phase() != PlaybackPhase::Stopped {
            assert_eq!(mixer.next_output_sample(true), 0.0);
            silent += 1;
            assert!(silent <= 10);
        }
        assert_eq!(silent, 10);
        assert_eq!(mixer.next_output_sample(true), 0.0);
    }

    #[test]
    fn test_all_queued_with_nothing_played() {
        let (_producer, mut mixer) = mixer(4, 3);
        let mut out = [1.0f32; 5];
        let phase = mixer.render(&mut out, true);
        assert_eq!(out, [0.0; 5]);
        assert_eq!(phase, PlaybackPhase::Stopped);
        assert_eq!(mixer.fade_entries(), 0);
    }

    #[test]
    fn test_force_stop_ignores_queued_audio() {
        let (producer, mut mixer) = mixer(4, 10);
        append(&producer, &[0.7; 16]);
        mixer.force_stop();

        let mut out = [1.0f32; 4];
        assert_eq!(mixer.render(&mut out, false), PlaybackPhase::Stopped);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(mixer.samples_played(), 0);
    }
}
