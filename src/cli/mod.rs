use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod status;
pub use status::StatusDisplay;

/// Largest chunk the replay command will feed into the pipeline at once
pub const MAX_REPLAY_CHUNK: usize = 1 << 20;

/// Streaming text-to-speech player
#[derive(Debug, Parser)]
#[command(name = "ttsplay")]
#[command(about = "Play speech from a streaming TTS service as it is generated")]
#[command(version)]
pub struct CliApp {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Synthesize text and play it while it streams in
    Speak {
        /// Text to speak; "-" reads it from stdin
        text: String,
        /// Override the configured service URL
        #[arg(long)]
        endpoint: Option<String>,
        /// Voice name understood by the service
        #[arg(long)]
        voice: Option<String>,
        /// Language code understood by the service
        #[arg(long)]
        language: Option<String>,
        /// Speaking rate multiplier
        #[arg(long, value_parser = parse_speed)]
        speed: Option<f32>,
        /// Output device name
        #[arg(long)]
        device: Option<String>,
        /// Print a live status line while playing
        #[arg(long)]
        watch: bool,
    },
    /// Play a captured response body (concatenated WAV segments) from disk
    Replay {
        /// Path to the captured body
        file: PathBuf,
        /// Bytes handed to the pipeline per read
        #[arg(long, default_value_t = 4096, value_parser = parse_chunk_size)]
        chunk_size: usize,
        /// Output device name
        #[arg(long)]
        device: Option<String>,
        /// Print a live status line while playing
        #[arg(long)]
        watch: bool,
    },
    /// List available audio output devices
    Devices,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show the active configuration
    Show,
    /// Restore default settings
    Reset,
    /// Set the speech service URL
    SetEndpoint {
        url: String,
    },
    /// Set the preferred output device ("default" clears it)
    SetDevice {
        name: String,
    },
    /// Set the voice sent with every request ("default" clears it)
    SetVoice {
        name: String,
    },
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &std::path::Path) -> PathBuf {
        match path.strip_prefix("~") {
            Ok(rest) => match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => path.to_path_buf(),
            },
            Err(_) => path.to_path_buf(),
        }
    }
}

fn parse_speed(value: &str) -> Result<f32, String> {
    let speed: f32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !(0.25..=4.0).contains(&speed) {
        return Err("speed must be between 0.25 and 4.0".to_string());
    }
    Ok(speed)
}

fn parse_chunk_size(value: &str) -> Result<usize, String> {
    let size: usize = value
        .parse()
        .map_err(|_| format!("'{}' is not a byte count", value))?;
    if size == 0 || size > MAX_REPLAY_CHUNK {
        return Err(format!("chunk size must be between 1 and {}", MAX_REPLAY_CHUNK));
    }
    Ok(size)
}
