use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Environment variable holding the log level
pub const LOG_LEVEL_ENV: &str = "TTS_PLAYER_LOG_LEVEL";

const DEFAULT_MAX_EVENTS: usize = 1000;

/// Playback event recorded for diagnostics
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: u64,
    pub event_type: PlaybackEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    SessionStarted,
    SegmentAssembled,
    SegmentDecoded,
    DecodeFallback,
    DecodeFailed,
    FadeEntered,
    FinalSilence,
    SessionStopped,
    TransportError,
    OutputError,
    CleanupError,
    PerformanceWarning,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::SessionStarted => "SESSION_STARTED",
            PlaybackEventType::SegmentAssembled => "SEGMENT_ASSEMBLED",
            PlaybackEventType::SegmentDecoded => "SEGMENT_DECODED",
            PlaybackEventType::DecodeFallback => "DECODE_FALLBACK",
            PlaybackEventType::DecodeFailed => "DECODE_FAILED",
            PlaybackEventType::FadeEntered => "FADE_ENTERED",
            PlaybackEventType::FinalSilence => "FINAL_SILENCE",
            PlaybackEventType::SessionStopped => "SESSION_STOPPED",
            PlaybackEventType::TransportError => "TRANSPORT_ERROR",
            PlaybackEventType::OutputError => "OUTPUT_ERROR",
            PlaybackEventType::CleanupError => "CLEANUP_ERROR",
            PlaybackEventType::PerformanceWarning => "PERFORMANCE_WARNING",
        }
    }
}

/// Bounded history of playback events, mirrored to the `log` facade.
///
/// Cheap to clone; clones share the same history.
#[derive(Clone)]
pub struct EngineLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for EngineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Initialize env_logger from `TTS_PLAYER_LOG_LEVEL`, defaulting to info
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        Self::init_with_default("info")
    }

    /// Initialize env_logger, using `default_level` when the variable is unset
    pub fn init_with_default(default_level: &str) -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| default_level.to_string());

        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        });
        builder.filter_level(parse_level(&log_level));
        builder.try_init()?;

        debug!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    /// Record an event and emit it at a level matching its type
    pub fn log_event(&self, session_id: u64, event_type: PlaybackEventType, details: String, duration: Option<Duration>) {
        match event_type {
            PlaybackEventType::SessionStarted | PlaybackEventType::SessionStopped => {
                info!("[{}] session {}: {}", event_type.as_str(), session_id, details);
            }
            PlaybackEventType::SegmentAssembled | PlaybackEventType::SegmentDecoded => {
                debug!("[{}] session {}: {}", event_type.as_str(), session_id, details);
            }
            PlaybackEventType::FadeEntered | PlaybackEventType::FinalSilence => {
                debug!("[{}] session {}: {}", event_type.as_str(), session_id, details);
            }
            PlaybackEventType::DecodeFallback
            | PlaybackEventType::DecodeFailed
            | PlaybackEventType::CleanupError => {
                warn!("[{}] session {}: {}", event_type.as_str(), session_id, details);
            }
            PlaybackEventType::PerformanceWarning => {
                warn!("[{}] session {}: {} (duration: {:?})", event_type.as_str(), session_id, details, duration);
            }
            PlaybackEventType::TransportError | PlaybackEventType::OutputError => {
                error!("[{}] session {}: {}", event_type.as_str(), session_id, details);
            }
        }

        let event = PlaybackEvent {
            timestamp: Utc::now(),
            session_id,
            event_type,
            duration,
            details,
        };

        if let Ok(mut events) = self.events.lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    pub fn log_session_started(&self, session_id: u64, source: &str, sample_rate: u32) {
        self.log_event(
            session_id,
            PlaybackEventType::SessionStarted,
            format!("Streaming from {} at {} Hz", source, sample_rate),
            None,
        );
    }

    pub fn log_segment_assembled(&self, session_id: u64, index: usize, bytes: usize) {
        self.log_event(
            session_id,
            PlaybackEventType::SegmentAssembled,
            format!("Segment #{} assembled ({} bytes)", index, bytes),
            None,
        );
    }

    pub fn log_segment_decoded(&self, session_id: u64, index: usize, decoder: &str, samples: usize, took: Duration) {
        self.log_event(
            session_id,
            PlaybackEventType::SegmentDecoded,
            format!("Segment #{} decoded by {} ({} samples)", index, decoder, samples),
            Some(took),
        );
    }

    pub fn log_decode_fallback(&self, session_id: u64, index: usize, reason: &str) {
        self.log_event(
            session_id,
            PlaybackEventType::DecodeFallback,
            format!("Segment #{} needed the fallback parser: {}", index, reason),
            None,
        );
    }

    pub fn log_decode_failed(&self, session_id: u64, index: usize, reason: &str) {
        self.log_event(
            session_id,
            PlaybackEventType::DecodeFailed,
            format!("Segment #{} dropped, playing silence: {}", index, reason),
            None,
        );
    }

    pub fn log_fade_entered(&self, session_id: u64, buffers_consumed: usize) {
        self.log_event(
            session_id,
            PlaybackEventType::FadeEntered,
            format!("Queue ran dry after {} buffer(s); fading out", buffers_consumed),
            None,
        );
    }

    pub fn log_final_silence(&self, session_id: u64) {
        self.log_event(
            session_id,
            PlaybackEventType::FinalSilence,
            "All segments played; trailing silence".to_string(),
            None,
        );
    }

    pub fn log_session_stopped(&self, session_id: u64, reason: &str, elapsed: Duration) {
        self.log_event(
            session_id,
            PlaybackEventType::SessionStopped,
            format!("Playback stopped: {} after {:.2}s", reason, elapsed.as_secs_f64()),
            Some(elapsed),
        );
    }

    pub fn log_transport_error(&self, session_id: u64, error: &str) {
        self.log_event(
            session_id,
            PlaybackEventType::TransportError,
            format!("Stream aborted: {}", error),
            None,
        );
    }

    pub fn log_output_error(&self, session_id: u64, error: &str) {
        self.log_event(
            session_id,
            PlaybackEventType::OutputError,
            format!("Output device failed: {}", error),
            None,
        );
    }

    pub fn log_cleanup_error(&self, session_id: u64, error: &str) {
        self.log_event(session_id, PlaybackEventType::CleanupError, error.to_string(), None);
    }

    pub fn log_performance_warning(&self, session_id: u64, operation: &str, duration: Duration, threshold: Duration) {
        self.log_event(
            session_id,
            PlaybackEventType::PerformanceWarning,
            format!(
                "{} took {}ms (threshold: {}ms)",
                operation,
                duration.as_millis(),
                threshold.as_millis()
            ),
            Some(duration),
        );
    }

    /// Most recent events, oldest first
    pub fn recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        match self.events.lock() {
            Ok(events) => {
                let skip = events.len().saturating_sub(count);
                events.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn events_for_session(&self, session_id: u64) -> Vec<PlaybackEvent> {
        match self.events.lock() {
            Ok(events) => events.iter().filter(|e| e.session_id == session_id).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }

    pub fn event_statistics(&self) -> EventStatistics {
        let mut stats = EventStatistics::default();
        if let Ok(events) = self.events.lock() {
            for event in events.iter() {
                match event.event_type {
                    PlaybackEventType::SessionStarted => stats.sessions += 1,
                    PlaybackEventType::SegmentDecoded => stats.segments_decoded += 1,
                    PlaybackEventType::DecodeFallback => stats.decode_fallbacks += 1,
                    PlaybackEventType::DecodeFailed => stats.decode_failures += 1,
                    PlaybackEventType::FadeEntered => stats.fade_entries += 1,
                    PlaybackEventType::TransportError => stats.transport_errors += 1,
                    PlaybackEventType::OutputError => stats.output_errors += 1,
                    PlaybackEventType::CleanupError => stats.cleanup_errors += 1,
                    _ => {}
                }
            }
            stats.total_events = events.len();
        }
        stats
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Counts of logged events by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub sessions: usize,
    pub segments_decoded: usize,
    pub decode_fallbacks: usize,
    pub decode_failures: usize,
    pub fade_entries: usize,
    pub transport_errors: usize,
    pub output_errors: usize,
    pub cleanup_errors: usize,
}

/// Timer utility for measuring operation durations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        let operation_name = operation_name.into();
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {}ms (threshold: {}ms)",
                self.operation_name,
                duration.as_millis(),
                threshold.as_millis()
            );
        } else {
            trace!("Completed operation '{}' in {}ms", self.operation_name, duration.as_millis());
        }
        duration
    }
}

/// Macro for timing a block with a threshold warning; yields `(result, duration)`
#[macro_export]
macro_rules! time_operation_with_threshold {
    ($name:expr, $threshold:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name);
        let result = $code;
        let duration = timer.finish_with_threshold($threshold);
        (result, duration)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_logger_creation() {
        let logger = EngineLogger::new();
        assert_eq!(logger.max_events, DEFAULT_MAX_EVENTS);
        assert!(logger.recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = EngineLogger::new();
        logger.log_event(3, PlaybackEventType::SessionStarted, "Test session".to_string(), None);

        let events = logger.recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id, 3);
        assert_eq!(events[0].details, "Test session");
        assert_eq!(events[0].event_type, PlaybackEventType::SessionStarted);
    }

    #[test]
    fn test_event_history_limit() {
        let logger = EngineLogger::with_capacity(3);
        for i in 0..5 {
            logger.log_event(1, PlaybackEventType::SegmentAssembled, format!("Event {}", i), None);
        }

        let events = logger.recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_recent_events_returns_newest_in_order() {
        let logger = EngineLogger::new();
        for i in 0..4 {
            logger.log_event(1, PlaybackEventType::SegmentAssembled, format!("Event {}", i), None);
        }
        let details: Vec<_> = logger.recent_events(2).into_iter().map(|e| e.details).collect();
        assert_eq!(details, vec!["Event 2", "Event 3"]);
    }

    #[test]
    fn test_event_statistics() {
        let logger = EngineLogger::new();
        logger.log_session_started(1, "test", 48_000);
        logger.log_segment_decoded(1, 0, "symphonia", 100, Duration::from_millis(1));
        logger.log_decode_fallback(1, 1, "header rejected");
        logger.log_decode_failed(1, 2, "bad header");
        logger.log_fade_entered(1, 2);
        logger.log_fade_entered(1, 3);
        logger.log_transport_error(1, "connection reset");
        logger.log_output_error(1, "device unplugged");
        logger.log_cleanup_error(1, "stream already closed");

        let stats = logger.event_statistics();
        assert_eq!(stats.total_events, 9);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.segments_decoded, 1);
        assert_eq!(stats.decode_fallbacks, 1);
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.fade_entries, 2);
        assert_eq!(stats.transport_errors, 1);
        assert_eq!(stats.output_errors, 1);
        assert_eq!(stats.cleanup_errors, 1);
    }

    #[test]
    fn test_events_for_session() {
        let logger = EngineLogger::new();
        logger.log_session_started(1, "a", 48_000);
        logger.log_session_started(2, "b", 44_100);
        logger.log_session_stopped(1, "finished", Duration::from_secs(2));

        let events = logger.events_for_session(1);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, PlaybackEventType::SessionStopped);
    }

    #[test]
    fn test_clones_share_history() {
        let logger = EngineLogger::new();
        let clone = logger.clone();
        clone.log_final_silence(4);
        assert_eq!(logger.recent_events(5).len(), 1);

        logger.clear_events();
        assert!(clone.recent_events(5).is_empty());
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation");
        thread::sleep(Duration::from_millis(10));
        assert!(timer.finish() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timing_macro_returns_result_and_duration() {
        let (value, duration) = time_operation_with_threshold!("sum", Duration::from_secs(1), { 2 + 2 });
        assert_eq!(value, 4);
        assert!(duration < Duration::from_secs(1));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("warn"), log::LevelFilter::Warn);
        assert_eq!(parse_level("nonsense"), log::LevelFilter::Info);
    }

    #[test]
    fn test_event_type_as_str() {
        assert_eq!(PlaybackEventType::SessionStarted.as_str(), "SESSION_STARTED");
        assert_eq!(PlaybackEventType::FadeEntered.as_str(), "FADE_ENTERED");
        assert_eq!(PlaybackEventType::TransportError.as_str(), "TRANSPORT_ERROR");
    }
}
