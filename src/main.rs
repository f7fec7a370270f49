use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;

use tts_stream_player::audio::{DeviceManager, PlaybackControl, PlaybackHandle, TtsEngine};
use tts_stream_player::cli::{CliApp, Commands, ConfigAction, StatusDisplay};
use tts_stream_player::config::ConfigManager;
use tts_stream_player::error::{ErrorSeverity, PlayerError};
use tts_stream_player::logging::EngineLogger;
use tts_stream_player::models::SpeechRequest;
use tts_stream_player::transport;

/// Main application controller that wires config, engine and display together
pub struct AppController {
    config_manager: ConfigManager,
    /// Control of the session currently playing, for the Ctrl-C handler
    active: Arc<Mutex<Option<PlaybackControl>>>,
}

impl AppController {
    pub fn new() -> Result<Self, PlayerError> {
        if let Err(e) = EngineLogger::init_with_default("warn") {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = ConfigManager::new()?;
        let active: Arc<Mutex<Option<PlaybackControl>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&active);
        let handler = ctrlc::set_handler(move || {
            let control = slot.lock().ok().and_then(|guard| guard.clone());
            match control {
                Some(control) => {
                    info!("Interrupted; stopping session {}", control.session().id());
                    control.cancel();
                }
                None => std::process::exit(130),
            }
        });
        if let Err(e) = handler {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        debug!("Application controller initialized");
        Ok(Self { config_manager, active })
    }

    /// Execute a single command
    pub async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Speak { text, endpoint, voice, language, speed, device, watch } => {
                let text = if text == "-" { read_stdin().await? } else { text };
                if text.trim().is_empty() {
                    println!("Nothing to speak");
                    return Ok(());
                }

                let config = self.config_manager.get_config();
                let mut settings = config.engine_settings();
                if let Some(endpoint) = endpoint {
                    settings.endpoint = endpoint;
                }
                if device.is_some() {
                    settings.preferred_device = device;
                }
                let request = SpeechRequest::new(text)
                    .with_voice(voice.or_else(|| config.default_voice.clone()))
                    .with_language(language)
                    .with_speed(speed);

                let engine = TtsEngine::new(settings);
                let handle = engine.start_playback(request).await?;
                self.run_session(handle, watch).await?;
            }
            Commands::Replay { file, chunk_size, device, watch } => {
                let path = CliApp::expand_path(&file);
                let stream = transport::file_stream(&path, chunk_size).await?;

                let mut settings = self.config_manager.get_config().engine_settings();
                if device.is_some() {
                    settings.preferred_device = device;
                }

                let engine = TtsEngine::new(settings);
                let handle = engine
                    .start_stream(stream, &path.display().to_string())
                    .await?;
                self.run_session(handle, watch).await?;
            }
            Commands::Devices => {
                let manager = DeviceManager::new()?;
                StatusDisplay::display_devices(manager.device_infos());
            }
            Commands::Config { action } => self.execute_config(action)?,
        }
        Ok(())
    }

    fn execute_config(&mut self, action: ConfigAction) -> Result<(), PlayerError> {
        match action {
            ConfigAction::Show => {
                StatusDisplay::display_config(
                    self.config_manager.get_config(),
                    self.config_manager.config_path(),
                );
            }
            ConfigAction::Reset => {
                self.config_manager.reset_to_defaults()?;
                println!("OK: Configuration reset to defaults");
            }
            ConfigAction::SetEndpoint { url } => {
                self.config_manager.set_endpoint(&url)?;
                println!("OK: Endpoint set to {}", self.config_manager.get_config().endpoint);
            }
            ConfigAction::SetDevice { name } => {
                self.config_manager.set_preferred_device(Some(name))?;
                match &self.config_manager.get_config().preferred_device {
                    Some(device) => println!("OK: Output device set to {}", device),
                    None => println!("OK: Using the default output device"),
                }
            }
            ConfigAction::SetVoice { name } => {
                let voice = Some(name).filter(|n| !n.eq_ignore_ascii_case("default"));
                self.config_manager.set_default_voice(voice)?;
                println!("OK: Voice updated");
            }
        }
        Ok(())
    }

    /// Wait for a session to finish, keeping it reachable from Ctrl-C
    async fn run_session(&self, handle: PlaybackHandle, watch: bool) -> Result<(), PlayerError> {
        if let Ok(mut slot) = self.active.lock() {
            *slot = Some(handle.control());
        }
        if watch {
            handle.on_status(StatusDisplay::display_status_line);
        }

        let result = handle.finished().await;

        if let Ok(mut slot) = self.active.lock() {
            *slot = None;
        }
        if watch {
            println!();
        }

        let report = result?;
        StatusDisplay::display_report(&report);
        Ok(())
    }

    fn report_error(error: &PlayerError) {
        match error.severity() {
            ErrorSeverity::Info => info!("{}", error),
            ErrorSeverity::Warning => warn!("{}", error),
            ErrorSeverity::Error | ErrorSeverity::Critical => error!("{}", error),
        }
        StatusDisplay::display_error(error);
    }
}

async fn read_stdin() -> Result<String, PlayerError> {
    let mut text = String::new();
    tokio::io::stdin().read_to_string(&mut text).await?;
    Ok(text)
}

#[tokio::main]
async fn main() {
    let cli = CliApp::parse();

    let mut app = match AppController::new() {
        Ok(app) => app,
        Err(e) => {
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.execute_command(cli.command).await {
        AppController::report_error(&e);
        std::process::exit(1);
    }
}
