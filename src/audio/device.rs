use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, SampleFormat, SizedSample, Stream, StreamConfig, StreamError};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::audio::AudioSink;
use crate::error::AudioError;

/// Frames rendered per sink call; larger device buffers are filled in slices
const SCRATCH_FRAMES: usize = 4096;

/// How long to wait for the output thread to report that the stream is up
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Called from the platform's error thread when the running stream fails
pub type StreamErrorHook = Arc<dyn Fn(String) + Send + Sync>;

/// Summary of an output device for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
    pub is_default: bool,
}

/// Negotiated output format: the device's default config
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl OutputFormat {
    pub fn for_device(device: &Device) -> Result<Self, AudioError> {
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;
        Ok(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            sample_format: config.sample_format(),
        })
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        }
    }
}

/// Output device enumeration and selection
pub struct DeviceManager {
    host: Host,
    devices: HashMap<String, Device>,
    infos: Vec<DeviceInfo>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        let mut manager = DeviceManager {
            host: cpal::default_host(),
            devices: HashMap::new(),
            infos: Vec::new(),
        };
        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Re-enumerate output devices; devices that cannot report a config are skipped
    pub fn refresh_devices(&mut self) -> Result<(), AudioError> {
        self.devices.clear();
        self.infos.clear();

        let default_name = self.host.default_output_device().and_then(|d| d.name().ok());
        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            let name = match device.name() {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping unnamed output device: {}", e);
                    continue;
                }
            };
            let format = match OutputFormat::for_device(&device) {
                Ok(format) => format,
                Err(e) => {
                    debug!("Skipping output device '{}': {}", name, e);
                    continue;
                }
            };

            self.infos.push(DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name: name.clone(),
                sample_rate: format.sample_rate,
                channels: format.channels,
                sample_format: format!("{:?}", format.sample_format),
            });
            self.devices.insert(name, device);
        }

        self.infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(())
    }

    pub fn list_devices(&self) -> Vec<String> {
        self.infos.iter().map(|info| info.name.clone()).collect()
    }

    pub fn device_infos(&self) -> &[DeviceInfo] {
        &self.infos
    }

    pub fn default_device(&self) -> Result<Device, AudioError> {
        self.host
            .default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))
    }

    /// Look a device up by name, falling back to the default device when it is missing
    pub fn select_device_with_fallback(&self, device_name: Option<&str>) -> Result<Device, AudioError> {
        match device_name {
            Some(name) => match self.devices.get(name) {
                Some(device) => Ok(device.clone()),
                None => {
                    warn!("Output device '{}' not found, using the default device", name);
                    self.default_device().map_err(|_| AudioError::DeviceNotFound {
                        device: name.to_string(),
                    })
                }
            },
            None => self.default_device(),
        }
    }
}

/// A running platform output stream pulling from an [`AudioSink`].
///
/// The stream lives on its own "audio-output" thread because cpal streams are
/// not `Send` on every platform. `shutdown` stops it exactly once; dropping the
/// binding shuts it down too.
pub struct OutputBinding {
    format: OutputFormat,
    device_name: String,
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputBinding {
    /// Build and start the stream, waiting until the output thread reports success.
    ///
    /// `on_error` fires for every runtime stream error; after one, the
    /// platform may never call the sink again.
    pub fn start(
        device: Device,
        format: OutputFormat,
        sink: Arc<dyn AudioSink>,
        on_error: StreamErrorHook,
    ) -> Result<Self, AudioError> {
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        let (init_tx, init_rx) = bounded::<Result<(), AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_thread(device, format, sink, on_error, init_tx, shutdown_rx))
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to create audio thread: {}", e)))?;

        let init = init_rx
            .recv_timeout(STREAM_START_TIMEOUT)
            .unwrap_or_else(|_| Err(AudioError::InitializationFailed("Audio thread did not start".to_string())));

        let mut binding = Self {
            format,
            device_name,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        };

        match init {
            Ok(()) => {
                info!(
                    "Output stream started on '{}' ({} Hz, {} channel(s), {:?})",
                    binding.device_name, format.sample_rate, format.channels, format.sample_format
                );
                Ok(binding)
            }
            Err(err) => {
                binding.shutdown();
                Err(err)
            }
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Stop the stream and join the output thread; later calls do nothing
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Audio output thread for '{}' panicked during shutdown", self.device_name);
            } else {
                debug!("Output stream on '{}' closed", self.device_name);
            }
        }
    }
}

impl Drop for OutputBinding {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_output_thread(
    device: Device,
    format: OutputFormat,
    sink: Arc<dyn AudioSink>,
    on_error: StreamErrorHook,
    init_tx: Sender<Result<(), AudioError>>,
    shutdown_rx: Receiver<()>,
) {
    let config = format.stream_config();
    let stream_result = match format.sample_format {
        SampleFormat::F32 => create_output_stream::<f32>(&device, &config, sink, on_error),
        SampleFormat::I16 => create_output_stream::<i16>(&device, &config, sink, on_error),
        SampleFormat::U16 => create_output_stream::<u16>(&device, &config, sink, on_error),
        other => Err(AudioError::UnsupportedFormat {
            format: format!("{:?}", other),
        }),
    };

    let stream = match stream_result {
        Ok(stream) => stream,
        Err(err) => {
            let _ = init_tx.send(Err(err));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = init_tx.send(Err(AudioError::StreamError(format!("Failed to start audio stream: {}", e))));
        return;
    }
    let _ = init_tx.send(Ok(()));

    // Blocks until shutdown is requested or the binding is dropped.
    let _ = shutdown_rx.recv();

    if let Err(e) = stream.pause() {
        warn!("{}", AudioError::CleanupFailed(format!("Failed to pause stream: {}", e)));
    }
}

/// Build a typed output stream that renders mono from the sink and fans it
/// out to every device channel
fn create_output_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: Arc<dyn AudioSink>,
    on_error: StreamErrorHook,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = (config.channels as usize).max(1);
    let mut scratch = vec![0.0f32; SCRATCH_FRAMES];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                render_interleaved(data, channels, &mut scratch, sink.as_ref());
            },
            stream_error_callback(on_error),
            None,
        )
        .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))
}

/// Log a runtime stream error and report it through the hook
fn stream_error_callback(on_error: StreamErrorHook) -> impl FnMut(StreamError) + Send + 'static {
    move |err| {
        error!("Audio stream error: {}", err);
        on_error(err.to_string());
    }
}

/// Fill an interleaved device buffer from a mono sink using a preallocated scratch slice
fn render_interleaved<T>(data: &mut [T], channels: usize, scratch: &mut [f32], sink: &dyn AudioSink)
where
    T: SizedSample + FromSample<f32>,
{
    let frames_per_pass = scratch.len().max(1);
    for block in data.chunks_mut(frames_per_pass * channels) {
        let frame_count = block.len() / channels;
        let mono = &mut scratch[..frame_count];
        sink.fill_buffer(mono);
        fan_out(block, mono, channels);
    }
}

/// Copy each mono sample to all channels of its frame; a trailing partial frame is silenced
fn fan_out<T>(interleaved: &mut [T], mono: &[f32], channels: usize)
where
    T: SizedSample + FromSample<f32>,
{
    let mut frames = interleaved.chunks_mut(channels);
    for (sample, frame) in mono.iter().zip(frames.by_ref()) {
        let value = T::from_sample(*sample);
        frame.fill(value);
    }
    for frame in frames {
        frame.fill(T::EQUILIBRIUM);
    }
}
