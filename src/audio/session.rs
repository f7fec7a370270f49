use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use log::{debug, warn};

use crate::audio::buffer::{playback_queue, AppendError, QueueProducer};
use crate::audio::mixer::{Mixer, MixerSettings};
use crate::audio::AudioSink;
use crate::models::{PcmBuffer, PlaybackPhase, StatusSnapshot};

/// Observer invoked with every published status snapshot
pub type StatusCallback = Box<dyn Fn(&StatusSnapshot) + Send + Sync>;

/// Runs once when the session's output resources are released
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// State for one playback request, shared by `Arc` between the network/decode
/// task, the engine's supervisor and the output callback.
///
/// All flags are monotonic: once set they stay set for the life of the session.
pub struct PlaybackSession {
    id: u64,
    sample_rate: u32,
    started_at: Instant,

    stream_fetching_complete: AtomicBool,
    all_segments_queued: AtomicBool,
    hard_stop: AtomicBool,
    released: AtomicBool,
    phase: AtomicU8,

    // Only the output callback locks this, and only with try_lock.
    mixer: Mutex<Mixer>,
    producer: QueueProducer,

    segments_assembled: AtomicUsize,
    segments_decoded: AtomicUsize,
    decode_failures: AtomicUsize,
    samples_played: AtomicU64,
    fade_entries: AtomicU64,

    observers: Mutex<Vec<StatusCallback>>,
    release_hook: Mutex<Option<ReleaseHook>>,
    /// First failure reported by the output device, if any
    output_error: Mutex<Option<String>>,
}

impl PlaybackSession {
    pub fn new(id: u64, sample_rate: u32, settings: MixerSettings) -> Self {
        let (producer, queue) = playback_queue();
        Self {
            id,
            sample_rate,
            started_at: Instant::now(),
            stream_fetching_complete: AtomicBool::new(false),
            all_segments_queued: AtomicBool::new(false),
            hard_stop: AtomicBool::new(false),
            released: AtomicBool::new(false),
            phase: AtomicU8::new(PlaybackPhase::Filling as u8),
            mixer: Mutex::new(Mixer::new(queue, settings)),
            producer,
            segments_assembled: AtomicUsize::new(0),
            segments_decoded: AtomicUsize::new(0),
            decode_failures: AtomicUsize::new(0),
            samples_played: AtomicU64::new(0),
            fade_entries: AtomicU64::new(0),
            observers: Mutex::new(Vec::new()),
            release_hook: Mutex::new(None),
            output_error: Mutex::new(None),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn phase(&self) -> PlaybackPhase {
        PlaybackPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_stopped(&self) -> bool {
        self.phase().is_terminal()
    }

    pub fn is_hard_stopped(&self) -> bool {
        self.hard_stop.load(Ordering::Acquire)
    }

    pub fn stream_fetching_complete(&self) -> bool {
        self.stream_fetching_complete.load(Ordering::Acquire)
    }

    pub fn all_segments_queued(&self) -> bool {
        self.all_segments_queued.load(Ordering::Acquire)
    }

    /// The network side has seen the end of the response body
    pub fn mark_stream_complete(&self) {
        self.stream_fetching_complete.store(true, Ordering::Release);
    }

    /// Every segment has been decoded and appended; the mixer may now enter
    /// final silence once the queue runs dry
    pub fn mark_all_segments_queued(&self) {
        self.stream_fetching_complete.store(true, Ordering::Release);
        self.all_segments_queued.store(true, Ordering::Release);
    }

    /// Hard stop: every flag forced true and the phase forced to `Stopped`.
    ///
    /// Returns true for the call that actually performed the stop.
    pub fn full_stop(&self) -> bool {
        self.stream_fetching_complete.store(true, Ordering::Release);
        self.all_segments_queued.store(true, Ordering::Release);
        let first = !self.hard_stop.swap(true, Ordering::AcqRel);
        self.phase.store(PlaybackPhase::Stopped as u8, Ordering::Release);
        if first {
            debug!("Session {} hard stopped", self.id);
        }
        first
    }

    /// The output device failed at runtime: record why and take the full-stop
    /// path. Only the first reason is kept.
    ///
    /// Returns true for the call that actually performed the stop.
    pub fn fail_output(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.output_error.lock() {
            Ok(mut slot) => {
                slot.get_or_insert(reason);
            }
            Err(poisoned) => {
                poisoned.into_inner().get_or_insert(reason);
            }
        }
        self.full_stop()
    }

    pub fn output_error(&self) -> Option<String> {
        match self.output_error.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Queue a decoded buffer for playback without waiting.
    ///
    /// Refused with [`AppendError::Closed`] once the session is stopped or
    /// every segment has been declared queued; a full queue hands the buffer
    /// back.
    pub fn try_append(&self, buffer: PcmBuffer) -> Result<(), AppendError> {
        if self.is_stopped() || self.all_segments_queued() {
            return Err(AppendError::Closed);
        }
        self.producer.try_append(buffer)
    }

    /// Queue a decoded buffer, dropping it if it cannot be queued right now
    pub fn append(&self, buffer: PcmBuffer) -> bool {
        self.try_append(buffer).is_ok()
    }

    pub fn record_segment_assembled(&self) {
        self.segments_assembled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segment_decoded(&self, failed: bool) {
        self.segments_decoded.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.decode_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            session_id: self.id,
            phase: self.phase(),
            stream_fetching_complete: self.stream_fetching_complete(),
            all_segments_queued: self.all_segments_queued(),
            hard_stopped: self.is_hard_stopped(),
            segments_assembled: self.segments_assembled.load(Ordering::Relaxed),
            segments_decoded: self.segments_decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            buffers_queued: self.producer.appended(),
            buffers_consumed: self.producer.consumed(),
            samples_played: self.samples_played.load(Ordering::Relaxed),
            fade_entries: self.fade_entries.load(Ordering::Relaxed),
            sample_rate: self.sample_rate,
            elapsed: self.elapsed(),
        }
    }

    /// Register a status observer
    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        match self.observers.lock() {
            Ok(mut observers) => observers.push(Box::new(callback)),
            Err(_) => warn!("Session {}: status observers unavailable", self.id),
        }
    }

    /// Take a snapshot and hand it to every observer
    pub fn publish_status(&self) -> StatusSnapshot {
        self.producer.reclaim();
        let snapshot = self.snapshot();
        if let Ok(observers) = self.observers.lock() {
            for observer in observers.iter() {
                observer(&snapshot);
            }
        }
        snapshot
    }

    /// Install the teardown action for the output binding
    pub fn set_release_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut slot) = self.release_hook.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Tear down output resources. Safe to call any number of times from any
    /// thread; the release hook runs exactly once.
    ///
    /// Returns true for the call that performed the release.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.phase.store(PlaybackPhase::Stopped as u8, Ordering::Release);

        let hook = match self.release_hook.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
        self.producer.reclaim();
        debug!("Session {} released", self.id);
        true
    }
}

impl AudioSink for PlaybackSession {
    fn fill_buffer(&self, out: &mut [f32]) {
        if self.is_released() {
            out.fill(0.0);
            return;
        }

        let mut mixer = match self.mixer.try_lock() {
            Ok(mixer) => mixer,
            Err(_) => {
                out.fill(0.0);
                return;
            }
        };

        if self.hard_stop.load(Ordering::Acquire) {
            mixer.force_stop();
        }

        let phase = mixer.render(out, self.all_segments_queued.load(Ordering::Acquire));

        // A hard stop may have landed mid-render; never overwrite Stopped.
        if !self.is_stopped() {
            self.phase.store(phase as u8, Ordering::Release);
        }
        self.samples_played.store(mixer.samples_played(), Ordering::Relaxed);
        self.fade_entries.store(mixer.fade_entries(), Ordering::Relaxed);
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_finished(&self) -> bool {
        self.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn session(fade: usize, final_silence: usize) -> PlaybackSession {
        PlaybackSession::new(
            7,
            48_000,
            MixerSettings {
                fade_duration_samples: fade,
                final_silence_samples: final_silence,
            },
        )
    }

    #[test]
    fn test_new_session_is_filling() {
        let session = session(4, 8);
        assert_eq!(session.phase(), PlaybackPhase::Filling);
        assert!(!session.stream_fetching_complete());
        assert!(!session.all_segments_queued());
        assert!(!session.is_hard_stopped());
        assert!(!session.is_released());
    }

    #[test]
    fn test_fill_plays_appended_audio() {
        let session = session(4, 8);
        assert!(session.append(PcmBuffer::new(vec![0.25, 0.5], 48_000)));

        let mut out = [0.0f32; 2];
        session.fill_buffer(&mut out);
        assert_eq!(out, [0.25, 0.5]);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.samples_played, 2);
        assert_eq!(snapshot.buffers_queued, 1);
        assert_eq!(snapshot.buffers_consumed, 1);
    }

    #[test]
    fn test_drains_to_stopped_once_all_queued() {
        let session = session(4, 6);
        session.append(PcmBuffer::new(vec![0.1; 3], 48_000));
        session.mark_all_segments_queued();
        assert!(session.stream_fetching_complete());

        let mut out = [1.0f32; 9];
        session.fill_buffer(&mut out);
        assert_eq!(&out[..3], &[0.1; 3]);
        assert!(out[3..].iter().all(|s| *s == 0.0));
        assert!(session.is_stopped());
        assert!(session.is_finished());
    }

    #[test]
    fn test_full_stop_sets_every_flag() {
        let session = session(4, 8);
        session.append(PcmBuffer::new(vec![0.9; 32], 48_000));

        assert!(session.full_stop());
        assert!(!session.full_stop());
        assert!(session.stream_fetching_complete());
        assert!(session.all_segments_queued());
        assert!(session.is_hard_stopped());
        assert_eq!(session.phase(), PlaybackPhase::Stopped);

        let mut out = [1.0f32; 8];
        session.fill_buffer(&mut out);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
        assert!(!session.append(PcmBuffer::new(vec![0.5], 48_000)));
    }

    #[test]
    fn test_append_refused_once_all_segments_queued() {
        let session = session(4, 8);
        assert!(session.append(PcmBuffer::new(vec![0.2], 48_000)));
        session.mark_all_segments_queued();

        assert!(matches!(
            session.try_append(PcmBuffer::new(vec![0.4], 48_000)),
            Err(AppendError::Closed)
        ));
        assert!(!session.append(PcmBuffer::new(vec![0.4], 48_000)));
        assert_eq!(session.snapshot().buffers_queued, 1);

        // Only the buffer queued before the cut-off is played.
        let mut out = [1.0f32; 3];
        session.fill_buffer(&mut out);
        assert_eq!(out, [0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_output_failure_takes_full_stop_path() {
        let session = session(4, 8);
        session.append(PcmBuffer::new(vec![0.5; 16], 48_000));
        assert_eq!(session.output_error(), None);

        assert!(session.fail_output("device unplugged"));
        assert!(!session.fail_output("second error"));

        assert_eq!(session.output_error().as_deref(), Some("device unplugged"));
        assert!(session.is_hard_stopped());
        assert!(session.all_segments_queued());
        assert_eq!(session.phase(), PlaybackPhase::Stopped);
    }

    #[test]
    fn test_contended_mixer_yields_silence() {
        let session = session(4, 8);
        session.append(PcmBuffer::new(vec![0.7; 4], 48_000));

        let guard = session.mixer.lock().unwrap();
        let mut out = [1.0f32; 4];
        session.fill_buffer(&mut out);
        assert_eq!(out, [0.0; 4]);
        drop(guard);

        session.fill_buffer(&mut out);
        assert_eq!(out, [0.7; 4]);
    }

    #[test]
    fn test_release_runs_hook_once() {
        let session = session(4, 8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session.set_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(session.release());
        assert!(!session.release());
        assert!(!session.release());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.is_stopped());
    }

    #[test]
    fn test_concurrent_release_is_idempotent() {
        let session = Arc::new(session(4, 8));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session.set_release_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.release())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|released| *released)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_without_hook() {
        let session = session(4, 8);
        assert!(session.release());
        let mut out = [1.0f32; 2];
        session.fill_buffer(&mut out);
        assert_eq!(out, [0.0; 2]);
    }

    #[test]
    fn test_status_observers_receive_snapshots() {
        let session = session(4, 8);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_status(move |snapshot| {
            sink.lock().unwrap().push(snapshot.segments_decoded);
        });

        session.record_segment_assembled();
        session.record_segment_decoded(false);
        session.publish_status();
        session.record_segment_decoded(true);
        let snapshot = session.publish_status();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(snapshot.decode_failures, 1);
        assert_eq!(snapshot.segments_assembled, 1);
        assert_eq!(snapshot.session_id, 7);
    }
}
