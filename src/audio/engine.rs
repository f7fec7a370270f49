use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use log::{debug, warn};
use tokio::task::{AbortHandle, JoinHandle};

use crate::audio::assembler::SegmentAssembler;
use crate::audio::decoders::DecoderChain;
use crate::audio::buffer::AppendError;
use crate::audio::device::{DeviceManager, OutputBinding, OutputFormat, StreamErrorHook};
use crate::audio::mixer::MixerSettings;
use crate::audio::session::PlaybackSession;
use crate::audio::AudioSink;
use crate::config::PlayerConfig;
use crate::error::{AudioError, PlayerError, TransportError};
use crate::logging::EngineLogger;
use crate::models::{AudioSegment, PcmBuffer, PlaybackPhase, PlaybackReport, SpeechRequest, StatusSnapshot};
use crate::transport::SpeechClient;

/// How often the supervisor checks the session for phase changes
const SUPERVISOR_TICK: Duration = Duration::from_millis(20);

/// Decodes slower than this are logged as performance warnings
const DECODE_WARN_THRESHOLD: Duration = Duration::from_millis(100);

/// Back-off while the playback queue is at capacity
const QUEUE_FULL_RETRY: Duration = Duration::from_millis(10);

/// Runtime settings for the engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub endpoint: String,
    pub preferred_device: Option<String>,
    pub fade_duration: Duration,
    pub final_silence: Duration,
    pub status_interval: Duration,
    pub debug_status: bool,
    pub request_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        PlayerConfig::default().engine_settings()
    }
}

impl EngineSettings {
    pub fn mixer_settings(&self, sample_rate: u32) -> MixerSettings {
        MixerSettings::for_rate(sample_rate, self.fade_duration, self.final_silence)
    }
}

/// Streaming text-to-speech playback engine.
///
/// Each call to [`TtsEngine::start_playback`] gets its own session, output
/// stream and pipeline task; nothing is shared between requests.
pub struct TtsEngine {
    settings: EngineSettings,
    logger: EngineLogger,
    next_session_id: AtomicU64,
}

impl TtsEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_logger(settings, EngineLogger::new())
    }

    pub fn with_logger(settings: EngineSettings, logger: EngineLogger) -> Self {
        Self {
            settings,
            logger,
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn logger(&self) -> &EngineLogger {
        &self.logger
    }

    /// Open the output device, send the request and start streaming playback
    pub async fn start_playback(&self, request: SpeechRequest) -> Result<PlaybackHandle, PlayerError> {
        let client = SpeechClient::new(&self.settings.endpoint, self.settings.request_timeout)?;
        let session = self.open_output().await?;

        let stream = match client.open_stream(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                self.logger.log_transport_error(session.id(), &err.to_string());
                session.full_stop();
                release_session(Arc::clone(&session), self.logger.clone()).await;
                return Err(err.into());
            }
        };

        Ok(self.attach(session, stream, client.endpoint().as_str()))
    }

    /// Play any byte stream of concatenated segments through a fresh output stream
    pub async fn start_stream<S, B>(&self, stream: S, source: &str) -> Result<PlaybackHandle, PlayerError>
    where
        S: Stream<Item = Result<B, TransportError>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        let session = self.open_output().await?;
        Ok(self.attach(session, stream, source))
    }

    /// Create a session that is not bound to any device; the caller pulls
    /// samples through [`AudioSink::fill_buffer`]
    pub fn detached_session(&self, sample_rate: u32) -> Arc<PlaybackSession> {
        Arc::new(PlaybackSession::new(
            self.next_id(),
            sample_rate,
            self.settings.mixer_settings(sample_rate),
        ))
    }

    /// Start the pipeline and supervisor tasks for an existing session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach<S, B>(&self, session: Arc<PlaybackSession>, stream: S, source: &str) -> PlaybackHandle
    where
        S: Stream<Item = Result<B, TransportError>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
    {
        self.logger.log_session_started(session.id(), source, session.sample_rate());

        let chain = Arc::new(DecoderChain::new(session.sample_rate()));
        let pipeline = tokio::spawn(run_pipeline(
            Arc::clone(&session),
            stream,
            chain,
            self.logger.clone(),
        ));

        let control = PlaybackControl {
            session: Arc::clone(&session),
            pipeline: pipeline.abort_handle(),
        };

        let supervisor = tokio::spawn(supervise(
            session,
            pipeline,
            self.settings.status_interval,
            self.settings.debug_status,
            self.logger.clone(),
        ));

        PlaybackHandle { control, supervisor }
    }

    fn next_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn open_output(&self) -> Result<Arc<PlaybackSession>, PlayerError> {
        let id = self.next_id();
        let settings = self.settings.clone();
        let session = tokio::task::spawn_blocking(move || open_output_blocking(id, &settings))
            .await
            .map_err(|e| AudioError::InitializationFailed(format!("Output setup task failed: {}", e)))??;
        Ok(session)
    }
}

/// Select the device, build the session at the device rate and start the stream
fn open_output_blocking(id: u64, settings: &EngineSettings) -> Result<Arc<PlaybackSession>, AudioError> {
    let manager = DeviceManager::new()?;
    let device = manager.select_device_with_fallback(settings.preferred_device.as_deref())?;
    let format = OutputFormat::for_device(&device)?;

    let session = Arc::new(PlaybackSession::new(
        id,
        format.sample_rate,
        settings.mixer_settings(format.sample_rate),
    ));

    let sink: Arc<dyn AudioSink> = session.clone();
    let binding = OutputBinding::start(device, format, sink, output_failure_hook(&session))?;
    session.set_release_hook(move || {
        let mut binding = binding;
        binding.shutdown();
    });

    Ok(session)
}

/// Route runtime device errors into the session's full-stop path.
///
/// Holds the session weakly: the binding is owned by the session's release hook.
pub(crate) fn output_failure_hook(session: &Arc<PlaybackSession>) -> StreamErrorHook {
    let session: Weak<PlaybackSession> = Arc::downgrade(session);
    Arc::new(move |reason: String| {
        if let Some(session) = session.upgrade() {
            if session.fail_output(reason) {
                warn!("Session {}: output device failed; stopping", session.id());
            }
        }
    })
}

/// Network → assembler → decoder → queue, in stream order
async fn run_pipeline<S, B>(
    session: Arc<PlaybackSession>,
    stream: S,
    chain: Arc<DecoderChain>,
    logger: EngineLogger,
) -> Result<(), PlayerError>
where
    S: Stream<Item = Result<B, TransportError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let mut stream = Box::pin(stream);
    let mut assembler = SegmentAssembler::new();

    while let Some(chunk) = stream.next().await {
        if session.is_stopped() {
            return Ok(());
        }
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                logger.log_transport_error(session.id(), &err.to_string());
                session.full_stop();
                return Err(err.into());
            }
        };

        for segment in assembler.push(chunk.as_ref()) {
            decode_and_queue(&session, &chain, &logger, segment).await;
        }
    }

    session.mark_stream_complete();
    debug!(
        "Session {}: stream complete after {} bytes",
        session.id(),
        assembler.bytes_received()
    );

    for segment in assembler.finish() {
        decode_and_queue(&session, &chain, &logger, segment).await;
    }
    session.mark_all_segments_queued();
    Ok(())
}

/// Decode one segment off the async runtime and append the result.
///
/// Always appends exactly one buffer (possibly empty) so buffer positions
/// match segment positions.
async fn decode_and_queue(
    session: &Arc<PlaybackSession>,
    chain: &Arc<DecoderChain>,
    logger: &EngineLogger,
    segment: AudioSegment,
) {
    let index = segment.index;
    session.record_segment_assembled();
    logger.log_segment_assembled(session.id(), index, segment.len());

    let decode_chain = Arc::clone(chain);
    let decoded = tokio::task::spawn_blocking(move || {
        crate::time_operation_with_threshold!("Segment decode", DECODE_WARN_THRESHOLD, {
            decode_chain.decode(&segment)
        })
    })
    .await;

    let (outcome, took) = match decoded {
        Ok(result) => result,
        Err(err) => {
            logger.log_decode_failed(session.id(), index, &format!("decode task failed: {}", err));
            session.record_segment_decoded(true);
            queue_buffer(session, PcmBuffer::empty(chain.target_rate())).await;
            return;
        }
    };

    if took > DECODE_WARN_THRESHOLD {
        logger.log_performance_warning(session.id(), "Segment decode", took, DECODE_WARN_THRESHOLD);
    }

    match outcome.decoder {
        Some(decoder) => {
            if outcome.used_fallback() {
                let reason = outcome
                    .failures
                    .first()
                    .map(|(name, err)| format!("{} failed: {}", name, err))
                    .unwrap_or_default();
                logger.log_decode_fallback(session.id(), index, &reason);
            }
            logger.log_segment_decoded(session.id(), index, decoder, outcome.buffer.len(), took);
        }
        None => {
            let reason = outcome
                .failures
                .iter()
                .map(|(name, err)| format!("{}: {}", name, err))
                .collect::<Vec<_>>()
                .join("; ");
            logger.log_decode_failed(session.id(), index, &reason);
        }
    }

    session.record_segment_decoded(outcome.is_failure());
    queue_buffer(session, outcome.buffer).await;
}

/// Append a buffer, waiting while the queue is full.
///
/// Gives up once the session stops or stops accepting audio.
async fn queue_buffer(session: &PlaybackSession, mut buffer: PcmBuffer) {
    loop {
        match session.try_append(buffer) {
            Ok(()) => return,
            Err(AppendError::Full(returned)) => {
                buffer = returned;
                tokio::time::sleep(QUEUE_FULL_RETRY).await;
            }
            Err(AppendError::Closed) => {
                debug!("Session {}: buffer dropped, session no longer accepts audio", session.id());
                return;
            }
        }
    }
}

/// Watch a session until it stops, publish status, then tear it down once
async fn supervise(
    session: Arc<PlaybackSession>,
    pipeline: JoinHandle<Result<(), PlayerError>>,
    status_interval: Duration,
    debug_status: bool,
    logger: EngineLogger,
) -> Result<PlaybackReport, PlayerError> {
    let mut pipeline = Some(pipeline);
    let mut pipeline_error: Option<PlayerError> = None;
    let mut ticker = tokio::time::interval(SUPERVISOR_TICK);
    let mut last_phase = session.phase();
    let mut last_publish = Instant::now();

    loop {
        ticker.tick().await;

        if pipeline.as_ref().map_or(false, |handle| handle.is_finished()) {
            if let Some(handle) = pipeline.take() {
                pipeline_error = join_pipeline(&session, handle).await;
            }
        }

        let phase = session.phase();
        if phase != last_phase {
            observe_phase_change(&session, &logger, phase);
            last_phase = phase;
        }

        if last_publish.elapsed() >= status_interval {
            let snapshot = session.publish_status();
            if debug_status {
                debug!("{}", format_status_line(&snapshot));
            }
            last_publish = Instant::now();
        }

        if session.is_stopped() {
            break;
        }
    }

    // A pipeline that stopped the session itself may still be finishing.
    if let Some(handle) = pipeline.take() {
        handle.abort();
        if let Some(err) = join_pipeline(&session, handle).await {
            pipeline_error.get_or_insert(err);
        }
    }

    // A dead output device outranks whatever the pipeline saw after it.
    if let Some(reason) = session.output_error() {
        logger.log_output_error(session.id(), &reason);
        pipeline_error = Some(AudioError::StreamError(reason).into());
    }

    release_session(Arc::clone(&session), logger.clone()).await;

    let snapshot = session.publish_status();
    let reason = match (&pipeline_error, snapshot.hard_stopped) {
        (Some(_), _) => "error",
        (None, true) => "cancelled",
        (None, false) => "finished",
    };
    logger.log_session_stopped(session.id(), reason, snapshot.elapsed);

    match pipeline_error {
        Some(err) => Err(err),
        None => Ok(PlaybackReport {
            segments: snapshot.segments_decoded,
            decode_failures: snapshot.decode_failures,
            samples_played: snapshot.samples_played,
            fade_entries: snapshot.fade_entries,
            cancelled: snapshot.hard_stopped,
            elapsed: snapshot.elapsed,
        }),
    }
}

/// Collect the pipeline's outcome; aborted pipelines are not errors
async fn join_pipeline(
    session: &PlaybackSession,
    handle: JoinHandle<Result<(), PlayerError>>,
) -> Option<PlayerError> {
    match handle.await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err),
        Err(err) if err.is_cancelled() => {
            debug!("Session {}: pipeline aborted", session.id());
            // stop_fetching aborts the pipeline; drain what is queued.
            session.mark_all_segments_queued();
            None
        }
        Err(err) => {
            session.full_stop();
            Some(AudioError::StreamError(format!("Pipeline task failed: {}", err)).into())
        }
    }
}

fn observe_phase_change(session: &PlaybackSession, logger: &EngineLogger, phase: PlaybackPhase) {
    match phase {
        PlaybackPhase::DrainingWithFade => {
            logger.log_fade_entered(session.id(), session.snapshot().buffers_consumed);
        }
        PlaybackPhase::FinalSilence => logger.log_final_silence(session.id()),
        PlaybackPhase::Filling | PlaybackPhase::Stopped => {
            debug!("Session {} phase -> {}", session.id(), phase.as_str());
        }
    }
}

/// Run the session's release hook off the async runtime
async fn release_session(session: Arc<PlaybackSession>, logger: EngineLogger) {
    let id = session.id();
    if let Err(err) = tokio::task::spawn_blocking(move || session.release()).await {
        let err = AudioError::CleanupFailed(format!("release task failed: {}", err));
        warn!("{}", err);
        logger.log_cleanup_error(id, &err.to_string());
    }
}

fn format_status_line(snapshot: &StatusSnapshot) -> String {
    format!(
        "session {} [{}] segments {}/{} (failed {}) buffers {}/{} played {:.2}s fades {}",
        snapshot.session_id,
        snapshot.phase.as_str(),
        snapshot.segments_decoded,
        snapshot.segments_assembled,
        snapshot.decode_failures,
        snapshot.buffers_consumed,
        snapshot.buffers_queued,
        snapshot.played_duration().as_secs_f64(),
        snapshot.fade_entries
    )
}

/// Cloneable control surface for a running session
#[derive(Clone)]
pub struct PlaybackControl {
    session: Arc<PlaybackSession>,
    pipeline: AbortHandle,
}

impl PlaybackControl {
    /// Hard stop: abandon queued audio and tear down immediately
    pub fn cancel(&self) {
        if self.session.full_stop() {
            debug!("Session {} cancelled", self.session.id());
        }
        self.pipeline.abort();
    }

    /// Soft stop: stop fetching, then let queued audio fade and finish.
    ///
    /// The session stops accepting buffers before the pipeline is aborted, so
    /// a decode still in flight cannot land behind the final silence.
    pub fn stop_fetching(&self) {
        self.session.mark_all_segments_queued();
        self.pipeline.abort();
    }

    pub fn status(&self) -> StatusSnapshot {
        self.session.snapshot()
    }

    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.session.on_status(callback);
    }

    pub fn session(&self) -> &Arc<PlaybackSession> {
        &self.session
    }
}

/// Handle to one playback request
pub struct PlaybackHandle {
    control: PlaybackControl,
    supervisor: JoinHandle<Result<PlaybackReport, PlayerError>>,
}

impl PlaybackHandle {
    pub fn control(&self) -> PlaybackControl {
        self.control.clone()
    }

    pub fn session_id(&self) -> u64 {
        self.control.session.id()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn stop_fetching(&self) {
        self.control.stop_fetching();
    }

    pub fn status(&self) -> StatusSnapshot {
        self.control.status()
    }

    pub fn on_status<F>(&self, callback: F)
    where
        F: Fn(&StatusSnapshot) + Send + Sync + 'static,
    {
        self.control.on_status(callback);
    }

    /// Wait for the session to stop and its output to be released
    pub async fn finished(self) -> Result<PlaybackReport, PlayerError> {
        match self.supervisor.await {
            Ok(result) => result,
            Err(err) => {
                self.control.session.full_stop();
                self.control.session.release();
                Err(AudioError::StreamError(format!("Playback supervisor failed: {}", err)).into())
            }
        }
    }
}
