use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use crate::audio::DeviceInfo;
use crate::config::PlayerConfig;
use crate::error::{AudioError, ConfigError, ErrorSeverity, PlayerError, TransportError};
use crate::models::{PlaybackPhase, PlaybackReport, StatusSnapshot};

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display a full status box for one session
    pub fn display_full_status(status: &StatusSnapshot) {
        println!("┌─ Playback Status ───────────────────────────────────────┐");
        println!("│ Session: {}", status.session_id);
        println!("│ Phase: {}", Self::format_phase(status.phase));
        println!("│ Played: {}", Self::format_duration(status.played_duration()));
        println!("│ Elapsed: {}", Self::format_duration(status.elapsed));
        println!("│");
        println!(
            "│ Segments: {} assembled, {} decoded, {} failed",
            status.segments_assembled, status.segments_decoded, status.decode_failures
        );
        println!(
            "│ Buffers: [{}] {}/{}",
            Self::create_progress_bar(Self::buffer_progress(status), 30),
            status.buffers_consumed,
            status.buffers_queued
        );
        if status.fade_entries > 0 {
            println!("│ Underruns: {}", status.fade_entries);
        }
        println!("│");
        println!(
            "│ Stream: {}",
            if status.all_segments_queued {
                "complete"
            } else if status.stream_fetching_complete {
                "decoding"
            } else {
                "fetching"
            }
        );
        println!("│ Output: {} Hz", status.sample_rate);
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Redraw a single status line in place
    pub fn display_status_line(status: &StatusSnapshot) {
        print!(
            "\r{} [{}] {} | segments {}/{}",
            Self::format_phase(status.phase),
            Self::create_progress_bar(Self::buffer_progress(status), 20),
            Self::format_duration(status.played_duration()),
            status.buffers_consumed,
            status.segments_assembled
        );
        let _ = io::stdout().flush();
    }

    /// Display the summary of a finished session
    pub fn display_report(report: &PlaybackReport) {
        let outcome = if report.cancelled { "Cancelled" } else { "Finished" };
        println!(
            "{}: {} segment{} in {}",
            outcome,
            report.segments,
            if report.segments == 1 { "" } else { "s" },
            Self::format_duration(report.elapsed)
        );
        if report.decode_failures > 0 {
            println!("  {} segment(s) could not be decoded and were skipped", report.decode_failures);
        }
        if report.fade_entries > 0 {
            println!("  Audio ran dry {} time(s) while waiting for the service", report.fade_entries);
        }
    }

    /// Display the available output devices
    pub fn display_devices(devices: &[DeviceInfo]) {
        if devices.is_empty() {
            println!("No audio output devices found");
            return;
        }

        println!("┌─ Output Devices ────────────────────────────────────────┐");
        for device in devices {
            let marker = if device.is_default { "*" } else { " " };
            println!("│ {} {}", marker, Self::truncate(&device.name, 52));
            println!(
                "│     {} Hz, {} ({}), {}",
                device.sample_rate,
                device.channels,
                Self::channel_description(device.channels),
                device.sample_format
            );
        }
        println!("│");
        println!("│ * default device");
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display the active configuration
    pub fn display_config(config: &PlayerConfig, path: &Path) {
        println!("┌─ Configuration ─────────────────────────────────────────┐");
        println!("│ File: {}", Self::truncate(&path.display().to_string(), 50));
        println!("│");
        println!("│ Endpoint: {}", Self::truncate(&config.endpoint, 46));
        println!(
            "│ Device: {}",
            config.preferred_device.as_deref().unwrap_or("Default")
        );
        println!("│ Voice: {}", config.default_voice.as_deref().unwrap_or("Service default"));
        println!("│ Fade: {} ms", config.fade_duration_ms);
        println!("│ Final silence: {} ms", config.final_silence_ms);
        println!("│ Status interval: {} ms", config.status_interval_ms);
        println!("│ Request timeout: {} s", config.request_timeout_secs);
        println!("│ Debug status: {}", if config.debug_status { "on" } else { "off" });
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!(
            "┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon,
            severity.as_str()
        );

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        Self::display_error_context(error);

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_error_context(error: &PlayerError) {
        match error {
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => {
                eprintln!("│");
                eprintln!("│ Use 'ttsplay devices' to see available devices");
            }
            PlayerError::Transport(TransportError::BadStatus { body, .. }) if !body.is_empty() => {
                eprintln!("│");
                eprintln!("│ Service said:");
                for line in Self::wrap_text(body, 53) {
                    eprintln!("│   {}", line);
                }
            }
            PlayerError::Config(ConfigError::DeserializationError(_)) => {
                eprintln!("│");
                eprintln!("│ Configuration will use default values");
            }
            _ => {}
        }
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        let suggestions = error.recovery_suggestions();
        if let Some(first) = suggestions.first() {
            eprintln!("Suggestion: {}", first);
        }
    }

    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.chars().count() + word.chars().count() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(current_line);
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }

        lines
    }

    /// Format duration as MM:SS.s, or HH:MM:SS past an hour
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            let tenths = duration.subsec_millis() / 100;
            format!("{:02}:{:02}.{}", minutes, seconds, tenths)
        }
    }

    pub fn channel_description(channels: u16) -> &'static str {
        match channels {
            1 => "Mono",
            2 => "Stereo",
            6 => "5.1 Surround",
            8 => "7.1 Surround",
            _ => "Multi-channel",
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_phase(phase: PlaybackPhase) -> String {
        match phase {
            PlaybackPhase::Filling => "▶ Playing".to_string(),
            PlaybackPhase::DrainingWithFade => "… Waiting".to_string(),
            PlaybackPhase::FinalSilence => "⏵ Finishing".to_string(),
            PlaybackPhase::Stopped => "⏹ Stopped".to_string(),
        }
    }

    fn buffer_progress(status: &StatusSnapshot) -> f32 {
        if status.buffers_queued == 0 {
            return 0.0;
        }
        status.buffers_consumed as f32 / status.buffers_queued as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_status() -> StatusSnapshot {
        StatusSnapshot {
            session_id: 3,
            phase: PlaybackPhase::Filling,
            stream_fetching_complete: false,
            all_segments_queued: false,
            hard_stopped: false,
            segments_assembled: 4,
            segments_decoded: 3,
            decode_failures: 1,
            buffers_queued: 3,
            buffers_consumed: 1,
            samples_played: 72_000,
            fade_entries: 2,
            sample_rate: 48_000,
            elapsed: Duration::from_millis(2_300),
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(StatusDisplay::format_duration(Duration::from_millis(1_500)), "00:01.5");
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(90)), "01:30.0");
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(StatusDisplay::truncate("short", 10), "short");
        assert_eq!(StatusDisplay::truncate("this is a very long string", 10), "this is...");
        assert_eq!(StatusDisplay::truncate("", 5), "");
        // Multi-byte names must not split a character
        assert_eq!(StatusDisplay::truncate("Haut-parleurs intégrés", 16), "Haut-parleurs...");
        assert_eq!(StatusDisplay::truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_create_progress_bar() {
        assert_eq!(StatusDisplay::create_progress_bar(0.0, 4), "░░░░");
        assert_eq!(StatusDisplay::create_progress_bar(0.5, 4), "██░░");
        assert_eq!(StatusDisplay::create_progress_bar(1.0, 4), "████");
        assert_eq!(StatusDisplay::create_progress_bar(1.7, 4), "████");
    }

    #[test]
    fn test_buffer_progress() {
        let mut status = create_test_status();
        assert!((StatusDisplay::buffer_progress(&status) - 1.0 / 3.0).abs() < 1e-6);

        status.buffers_queued = 0;
        status.buffers_consumed = 0;
        assert_eq!(StatusDisplay::buffer_progress(&status), 0.0);
    }

    #[test]
    fn test_format_phase() {
        assert_eq!(StatusDisplay::format_phase(PlaybackPhase::Filling), "▶ Playing");
        assert_eq!(StatusDisplay::format_phase(PlaybackPhase::Stopped), "⏹ Stopped");
    }

    #[test]
    fn test_wrap_text() {
        let lines = StatusDisplay::wrap_text("one two three four five six", 10);
        assert_eq!(lines, vec!["one two", "three four", "five six"]);
        assert!(StatusDisplay::wrap_text("", 10).is_empty());
    }

    #[test]
    fn test_display_functions_dont_panic() {
        let status = create_test_status();
        StatusDisplay::display_full_status(&status);
        StatusDisplay::display_status_line(&status);

        let report = PlaybackReport {
            segments: 4,
            decode_failures: 1,
            samples_played: 72_000,
            fade_entries: 2,
            cancelled: false,
            elapsed: Duration::from_secs(2),
        };
        StatusDisplay::display_report(&report);

        StatusDisplay::display_devices(&[]);
        StatusDisplay::display_devices(&[DeviceInfo {
            name: "Built-in Output".to_string(),
            sample_rate: 48_000,
            channels: 2,
            sample_format: "f32".to_string(),
            is_default: true,
        }]);

        StatusDisplay::display_config(&PlayerConfig::default(), Path::new("/tmp/config.toml"));

        let error = PlayerError::Transport(TransportError::BadStatus {
            status: 500,
            body: "voice model failed to load".to_string(),
        });
        StatusDisplay::display_error(&error);
        StatusDisplay::display_simple_error(&error);
    }
}
