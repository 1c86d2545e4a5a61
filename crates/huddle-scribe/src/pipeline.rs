//! Streaming transcription: capture thread → bounded queue → transcription thread → index.
//!
//! The capture stage owns the audio device for the whole session and pushes
//! fixed-size frames into a bounded `tokio::sync::mpsc` channel. The transcription
//! stage blocks on that channel, accumulates frames into windows and hands each
//! window to the STT backend. Non-empty results are appended to the transcript
//! log, indexed under the transcript source and then broadcast to subscribers.
//!
//! Stopping is cooperative: the stop flag ends the capture loop, which drops the
//! sender; the transcription stage then drains every queued frame, flushes the
//! partial window and exits.

use crate::error::{ScribeError, ScribeResult};
use crate::transcript::{TranscriptLog, TranscriptSegment};
use chrono::{DateTime, Utc};
use huddle_core::{Backpressure, KnowledgeBase, TranscriptionSettings};
use huddle_voice::{rms, AudioDevice, AudioFrame, FrameRead, SttBackend, VoiceResult};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

/// Runtime knobs for one pipeline session.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Frames the hand-off queue holds before backpressure applies.
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    /// Samples accumulated per model call.
    pub window_samples: usize,
    /// RMS below which a window is silence and skips the model. 0 disables the gate.
    pub silence_rms: f32,
    /// How long the capture stage waits for a frame before re-checking the stop flag.
    pub read_timeout: Duration,
}

impl PipelineConfig {
    pub fn from_settings(settings: &TranscriptionSettings) -> Self {
        Self {
            sample_rate: settings.sample_rate,
            queue_capacity: settings.queue_capacity.max(1),
            backpressure: settings.backpressure,
            window_samples: settings.window_samples(),
            silence_rms: settings.silence_rms.max(0.0),
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&TranscriptionSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Capturing,
    /// Stop was requested; queued frames are being transcribed.
    Draining,
    Stopped,
}

/// Counter snapshot. `frames_captured - frames_dropped` frames reach the transcription stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_transcribed: u64,
    pub windows_transcribed: u64,
    pub silent_windows: u64,
    pub inference_failures: u64,
    pub segments_committed: u64,
    pub index_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    frames_transcribed: AtomicU64,
    windows_transcribed: AtomicU64,
    silent_windows: AtomicU64,
    inference_failures: AtomicU64,
    segments_committed: AtomicU64,
    index_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_transcribed: self.frames_transcribed.load(Ordering::Relaxed),
            windows_transcribed: self.windows_transcribed.load(Ordering::Relaxed),
            silent_windows: self.silent_windows.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            segments_committed: self.segments_committed.load(Ordering::Relaxed),
            index_failures: self.index_failures.load(Ordering::Relaxed),
        }
    }
}

/// State shared by both stage threads and the handle.
struct Shared {
    config: PipelineConfig,
    stt: Arc<dyn SttBackend>,
    knowledge: Arc<KnowledgeBase>,
    transcript: Arc<TranscriptLog>,
    subscribers: Mutex<Vec<UnboundedSender<TranscriptSegment>>>,
    counters: Counters,
    stop: AtomicBool,
}

struct StageHandles {
    capture: JoinHandle<()>,
    transcription: JoinHandle<()>,
}

/// One capture/transcription session over a single audio device.
pub struct TranscriptionPipeline {
    shared: Arc<Shared>,
    state: Mutex<PipelineState>,
    handles: Mutex<Option<StageHandles>>,
}

impl TranscriptionPipeline {
    pub fn new(
        config: PipelineConfig,
        stt: Arc<dyn SttBackend>,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                stt,
                knowledge,
                transcript: Arc::new(TranscriptLog::new()),
                subscribers: Mutex::new(Vec::new()),
                counters: Counters::default(),
                stop: AtomicBool::new(false),
            }),
            state: Mutex::new(PipelineState::Idle),
            handles: Mutex::new(None),
        }
    }

    /// Open `device` on the capture thread and launch both stages.
    ///
    /// Returns once the device is open. An open failure is returned as
    /// [`ScribeError::Device`] and the pipeline stays `Idle`. A device that does not
    /// declare mono audio at `config.sample_rate` is refused before it is opened.
    pub fn start(&self, device: Box<dyn AudioDevice>) -> ScribeResult<()> {
        let mut state = lock(&self.state);
        if *state != PipelineState::Idle {
            return Err(ScribeError::InvalidState(format!(
                "cannot start a pipeline that is {:?}",
                *state
            )));
        }
        let declared = device.config();
        if declared.sample_rate != self.shared.config.sample_rate || declared.channels != 1 {
            return Err(ScribeError::InvalidState(format!(
                "device {} delivers {} Hz x{} channels; pipeline expects {} Hz mono",
                device.name(),
                declared.sample_rate,
                declared.channels,
                self.shared.config.sample_rate
            )));
        }
        // An aborted earlier start may have left the flag raised.
        self.shared.stop.store(false, Ordering::Release);

        let device_name = device.name();
        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(self.shared.config.queue_capacity);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<VoiceResult<()>>(1);

        let shared = Arc::clone(&self.shared);
        let capture = thread::Builder::new()
            .name("huddle-capture".to_string())
            .spawn(move || run_capture(device, frame_tx, ready_tx, shared))
            .map_err(|e| ScribeError::Thread(format!("failed to spawn capture stage: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = capture.join();
                error!("Audio device {} failed to open: {}", device_name, e);
                return Err(ScribeError::Device(e));
            }
            Err(_) => {
                let _ = capture.join();
                return Err(ScribeError::Thread(
                    "capture stage exited before opening the device".to_string(),
                ));
            }
        }

        let shared = Arc::clone(&self.shared);
        let transcription = match thread::Builder::new()
            .name("huddle-transcribe".to_string())
            .spawn(move || run_transcription(frame_rx, shared))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.stop.store(true, Ordering::Release);
                let _ = capture.join();
                return Err(ScribeError::Thread(format!(
                    "failed to spawn transcription stage: {}",
                    e
                )));
            }
        };

        *lock(&self.handles) = Some(StageHandles {
            capture,
            transcription,
        });
        *state = PipelineState::Capturing;
        info!(
            device = %device_name,
            queue_capacity = self.shared.config.queue_capacity,
            window_samples = self.shared.config.window_samples,
            "Transcription pipeline started"
        );
        Ok(())
    }

    /// Signal the capture stage, then join both stages once the queue is drained.
    pub fn stop(&self) -> ScribeResult<PipelineStats> {
        match self.state() {
            PipelineState::Idle => {
                return Err(ScribeError::InvalidState(
                    "pipeline was never started".to_string(),
                ))
            }
            PipelineState::Stopped => return Ok(self.stats()),
            PipelineState::Capturing | PipelineState::Draining => {}
        }
        self.shared.stop.store(true, Ordering::Release);
        self.set_state(PipelineState::Draining);
        self.join()
    }

    /// Join both stages without signalling; returns when the device closes on its own.
    pub fn wait(&self) -> ScribeResult<PipelineStats> {
        match self.state() {
            PipelineState::Idle => Err(ScribeError::InvalidState(
                "pipeline was never started".to_string(),
            )),
            PipelineState::Stopped => Ok(self.stats()),
            PipelineState::Capturing | PipelineState::Draining => self.join(),
        }
    }

    /// Receive every segment committed from now on, in commit order.
    pub fn subscribe(&self) -> UnboundedReceiver<TranscriptSegment> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscribers).push(tx);
        rx
    }

    pub fn transcript(&self) -> Arc<TranscriptLog> {
        Arc::clone(&self.shared.transcript)
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.shared.knowledge
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot()
    }

    pub fn state(&self) -> PipelineState {
        *lock(&self.state)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    fn set_state(&self, state: PipelineState) {
        *lock(&self.state) = state;
    }

    fn join(&self) -> ScribeResult<PipelineStats> {
        let handles = lock(&self.handles).take();
        let mut result = Ok(());
        if let Some(StageHandles {
            capture,
            transcription,
        }) = handles
        {
            if capture.join().is_err() {
                result = Err(ScribeError::Thread("capture stage panicked".to_string()));
            }
            if transcription.join().is_err() {
                result = Err(ScribeError::Thread(
                    "transcription stage panicked".to_string(),
                ));
            }
        }
        self.set_state(PipelineState::Stopped);
        let stats = self.stats();
        info!(
            frames_captured = stats.frames_captured,
            frames_dropped = stats.frames_dropped,
            segments = stats.segments_committed,
            "Transcription pipeline stopped"
        );
        result.map(|_| stats)
    }
}

impl Drop for TranscriptionPipeline {
    fn drop(&mut self) {
        if let Some(handles) = lock(&self.handles).take() {
            self.shared.stop.store(true, Ordering::Release);
            let _ = handles.capture.join();
            let _ = handles.transcription.join();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn run_capture(
    device: Box<dyn AudioDevice>,
    frame_tx: mpsc::Sender<AudioFrame>,
    ready_tx: std::sync::mpsc::SyncSender<VoiceResult<()>>,
    shared: Arc<Shared>,
) {
    let mut source = match device.open() {
        Ok(source) => {
            let _ = ready_tx.send(Ok(()));
            source
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let counters = &shared.counters;

    while !shared.stop.load(Ordering::Acquire) {
        let frame = match source.next_frame(shared.config.read_timeout) {
            Ok(FrameRead::Frame(frame)) => frame,
            Ok(FrameRead::Timeout) => continue,
            Ok(FrameRead::Closed) => {
                info!("Audio input closed");
                break;
            }
            Err(e) => {
                warn!("Audio read failed, ending capture: {}", e);
                break;
            }
        };
        Counters::bump(&counters.frames_captured);

        match shared.config.backpressure {
            Backpressure::Drop => match frame_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let dropped = counters.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    if dropped.is_power_of_two() {
                        warn!(dropped, "Frame queue full, dropping audio");
                    }
                }
                Err(TrySendError::Closed(_)) => break,
            },
            Backpressure::Block => {
                if frame_tx.blocking_send(frame).is_err() {
                    break;
                }
            }
        }
    }
    debug!("Capture stage exiting");
}

/// Frames accumulated for the next model call.
struct Window {
    samples: Vec<f32>,
    started_at: Option<DateTime<Utc>>,
    offset_secs: f64,
}

fn run_transcription(mut frame_rx: mpsc::Receiver<AudioFrame>, shared: Arc<Shared>) {
    let config = &shared.config;
    let mut window = Window {
        samples: Vec::with_capacity(config.window_samples),
        started_at: None,
        offset_secs: 0.0,
    };
    let mut consumed = Duration::ZERO;

    while let Some(frame) = frame_rx.blocking_recv() {
        Counters::bump(&shared.counters.frames_transcribed);
        if window.started_at.is_none() {
            window.started_at = Some(frame.captured_at);
            window.offset_secs = consumed.as_secs_f64();
        }
        consumed += frame.duration(config.sample_rate);
        window.samples.extend_from_slice(&frame.samples);

        if window.samples.len() >= config.window_samples {
            shared.transcribe_window(&mut window);
        }
    }
    if !window.samples.is_empty() {
        shared.transcribe_window(&mut window);
    }
    debug!("Transcription stage drained");
}

impl Shared {
    fn transcribe_window(&self, window: &mut Window) {
        let samples = std::mem::take(&mut window.samples);
        let started_at = window.started_at.take().unwrap_or_else(Utc::now);
        let offset_secs = window.offset_secs;

        if self.config.silence_rms > 0.0 && rms(&samples) < self.config.silence_rms {
            Counters::bump(&self.counters.silent_windows);
            debug!(offset_secs, "Window below silence threshold");
            return;
        }

        Counters::bump(&self.counters.windows_transcribed);
        match self.stt.transcribe(&samples, self.config.sample_rate) {
            Ok(t) if t.is_empty() => {
                Counters::bump(&self.counters.silent_windows);
                debug!(offset_secs, "No speech recognized");
            }
            Ok(t) => self.commit(TranscriptSegment {
                text: t.text.trim().to_string(),
                language: t.language,
                timestamp: started_at,
                offset_secs,
            }),
            Err(e) => {
                Counters::bump(&self.counters.inference_failures);
                warn!(offset_secs, "Transcription failed for window: {}", e);
            }
        }
    }

    fn commit(&self, segment: TranscriptSegment) {
        info!("[{:.1}s] {}", segment.offset_secs, segment.text);
        self.transcript.append(segment.clone());

        match self.knowledge.index_transcript(&segment.text) {
            Ok(report) => {
                if report.skipped() > 0 {
                    self.counters
                        .index_failures
                        .fetch_add(report.skipped() as u64, Ordering::Relaxed);
                }
            }
            Err(e) => {
                Counters::bump(&self.counters.index_failures);
                if e.is_recoverable() {
                    warn!("Failed to index transcript segment: {}", e);
                } else {
                    error!("Index rejected transcript segment: {}", e);
                }
            }
        }
        Counters::bump(&self.counters.segments_committed);

        lock(&self.subscribers).retain(|tx| tx.send(segment.clone()).is_ok());
    }
}
