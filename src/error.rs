use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Audio(err) => err.user_message(),
            PlayerError::Transport(err) => err.user_message(),
            PlayerError::Decode(err) => err.user_message(),
            PlayerError::Config(err) => err.user_message(),
            PlayerError::Io(err) => Self::format_io_error(err),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Audio(err) => err.recovery_suggestions(),
            PlayerError::Transport(err) => err.recovery_suggestions(),
            PlayerError::Decode(err) => err.recovery_suggestions(),
            PlayerError::Config(err) => err.recovery_suggestions(),
            PlayerError::Io(_) => vec!["Check that the file exists and is readable".to_string()],
        }
    }

    /// Whether the user can reasonably retry the same request
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Audio(err) => err.is_recoverable(),
            PlayerError::Transport(err) => err.is_recoverable(),
            PlayerError::Decode(_) => true, // a bad segment only costs that segment
            PlayerError::Config(err) => err.is_recoverable(),
            PlayerError::Io(_) => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Audio(AudioError::CleanupFailed(_)) => ErrorSeverity::Warning,
            PlayerError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            PlayerError::Audio(_) => ErrorSeverity::Critical,
            PlayerError::Transport(TransportError::Cancelled) => ErrorSeverity::Info,
            PlayerError::Transport(_) => ErrorSeverity::Error,
            PlayerError::Decode(_) => ErrorSeverity::Warning,
            PlayerError::Config(_) => ErrorSeverity::Warning,
            PlayerError::Io(_) => ErrorSeverity::Error,
        }
    }

    fn format_io_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            std::io::ErrorKind::UnexpectedEof => "File appears to be truncated".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Output-device and audio-graph errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported sample format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailed(String),
}

impl AudioError {
    pub fn user_message(&self) -> String {
        match self {
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            AudioError::UnsupportedFormat { format } => {
                format!("The output device uses an unsupported sample format ({})", format)
            }
            AudioError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio output: {}", msg)
            }
            AudioError::CleanupFailed(msg) => {
                format!("Audio output did not shut down cleanly: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::DeviceNotFound { .. } => vec![
                "Use 'ttsplay devices' to see available audio devices".to_string(),
                "Check that your audio device is connected and powered on".to_string(),
                "Clear the preferred device with 'ttsplay config set-device default'".to_string(),
            ],
            AudioError::UnsupportedFormat { .. } => vec![
                "Select a different output device".to_string(),
                "Change the device's default format in your system sound settings".to_string(),
            ],
            AudioError::StreamError(_) => vec![
                "Check audio device connections".to_string(),
                "Try the request again".to_string(),
            ],
            AudioError::InitializationFailed(_) => vec![
                "Check that no other application holds exclusive access to the device".to_string(),
                "Try selecting a different audio device".to_string(),
                "Verify audio drivers are properly installed".to_string(),
            ],
            AudioError::CleanupFailed(_) => vec![],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::DeviceNotFound { .. } => true, // can fall back to the default device
            AudioError::UnsupportedFormat { .. } => false,
            AudioError::StreamError(_) => true,
            AudioError::InitializationFailed(_) => true,
            AudioError::CleanupFailed(_) => true,
        }
    }
}

/// Errors fetching the audio stream from the speech backend
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Backend returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Stream read failed: {0}")]
    ReadFailed(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn user_message(&self) -> String {
        match self {
            TransportError::RequestFailed(msg) => {
                format!("Could not reach the speech service: {}", msg)
            }
            TransportError::BadStatus { status, .. } => {
                format!("The speech service rejected the request (HTTP {})", status)
            }
            TransportError::ReadFailed(msg) => {
                format!("The audio stream was interrupted: {}", msg)
            }
            TransportError::InvalidEndpoint(url) => {
                format!("'{}' is not a valid speech service URL", url)
            }
            TransportError::Cancelled => "Playback was cancelled".to_string(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            TransportError::RequestFailed(_) | TransportError::ReadFailed(_) => vec![
                "Check that the speech service is running".to_string(),
                "Check your network connection".to_string(),
                "Try the request again".to_string(),
            ],
            TransportError::BadStatus { status, .. } if *status >= 500 => vec![
                "The speech service had an internal error - try again later".to_string(),
            ],
            TransportError::BadStatus { .. } => vec![
                "Check the request text and voice settings".to_string(),
                "Verify the endpoint with 'ttsplay config show'".to_string(),
            ],
            TransportError::InvalidEndpoint(_) => vec![
                "Set a full URL with 'ttsplay config set-endpoint http://host:port/path'".to_string(),
            ],
            TransportError::Cancelled => vec![],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            TransportError::RequestFailed(_) => true,
            TransportError::BadStatus { status, .. } => *status >= 500,
            TransportError::ReadFailed(_) => true,
            TransportError::InvalidEndpoint(_) => false,
            TransportError::Cancelled => true,
        }
    }
}

/// Segment decoding errors. These never leave the decoder: a segment that
/// fails every decoder contributes an empty buffer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),
}

impl DecodeError {
    pub fn user_message(&self) -> String {
        match self {
            DecodeError::UnsupportedFormat { format } => {
                format!("Audio segment format '{}' is not supported", format)
            }
            DecodeError::Malformed(msg) => {
                format!("Audio segment is damaged: {}", msg)
            }
            DecodeError::DecodeFailed(msg) => {
                format!("Failed to decode audio segment: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            DecodeError::UnsupportedFormat { .. } => vec![
                "The speech service should send mono 16-bit PCM WAV".to_string(),
            ],
            DecodeError::Malformed(_) | DecodeError::DecodeFailed(_) => vec![
                "Try the request again".to_string(),
            ],
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
            ConfigError::InvalidValue { key, reason } => {
                format!("Configuration value '{}' is invalid: {}", key, reason)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/tts-stream-player/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Try resetting configuration with 'ttsplay config reset'".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Run 'ttsplay config reset' to restore defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
            ConfigError::InvalidValue { .. } => vec![
                "Run 'ttsplay config show' to see current values".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // defaults are always available
    }
}
