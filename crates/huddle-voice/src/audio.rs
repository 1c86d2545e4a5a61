//! Audio capture: fixed-size mono frames at 16 kHz from a microphone (cpal).
//!
//! Devices are opened on the thread that reads them, because cpal streams are
//! `!Send` on some platforms. [`AudioDevice::open`] is the only place a device
//! failure can surface; once open, a source yields frames until it is closed.

use crate::error::{VoiceError, VoiceResult};
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Target sample rate for Whisper-style models.
pub const WHISPER_SAMPLE_RATE: u32 = 16000;

/// Audio configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate in Hz (default: 16000)
    pub sample_rate: u32,

    /// Number of channels delivered to consumers (default: 1 for mono)
    pub channels: u16,

    /// Samples per frame (default: 1024, 64ms at 16kHz)
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: WHISPER_SAMPLE_RATE,
            channels: 1,
            frame_size: 1024,
        }
    }
}

/// One captured frame. Consumed exactly once by the transcription stage.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Mono samples normalized to -1.0..1.0
    pub samples: Vec<f32>,

    /// Wall-clock time the frame was completed
    pub captured_at: DateTime<Utc>,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            captured_at: Utc::now(),
        }
    }

    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / sample_rate.max(1) as f64)
    }
}

/// Result of waiting for the next frame.
#[derive(Debug)]
pub enum FrameRead {
    Frame(AudioFrame),
    /// Nothing arrived within the timeout; the source is still open.
    Timeout,
    /// The source is exhausted or its stream ended.
    Closed,
}

/// An open audio input yielding frames.
pub trait FrameSource {
    /// Block until the next frame, the timeout, or the end of the source.
    fn next_frame(&mut self, timeout: Duration) -> VoiceResult<FrameRead>;
}

/// An input that can be opened once.
pub trait AudioDevice: Send {
    /// Human-readable device name for logs.
    fn name(&self) -> String;

    fn config(&self) -> &AudioConfig;

    /// Open the device. Called on the capture thread.
    fn open(self: Box<Self>) -> VoiceResult<Box<dyn FrameSource>>;
}

/// 16-bit PCM to normalized floats.
pub fn pcm_i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Convert interleaved multi-channel audio at any rate to mono at `to_rate`
/// (channel average, nearest-sample resampling).
pub fn to_mono_resampled(samples: &[f32], channels: usize, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if channels == 0 || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return Vec::new();
    }
    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    if from_rate == to_rate {
        return mono;
    }
    let out_len = (mono.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = (i as f64 * from_rate as f64 / to_rate as f64) as usize;
        if src_idx >= mono.len() {
            break;
        }
        out.push(mono[src_idx]);
    }
    out
}

/// Root-mean-square level of a block of samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Microphone input through cpal: default input device, or the first whose name contains `device_name`.
pub struct CpalDevice {
    config: AudioConfig,
    device_name: Option<String>,
}

impl CpalDevice {
    pub fn new(config: AudioConfig) -> Self {
        Self {
            config,
            device_name: None,
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    fn find_device(&self) -> VoiceResult<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(wanted) => {
                let wanted_lower = wanted.to_lowercase();
                host.input_devices()?
                    .find(|d| {
                        d.name()
                            .map(|n| n.to_lowercase().contains(&wanted_lower))
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| VoiceError::AudioDevice(format!("No input device matching '{}'", wanted)))
            }
            None => host
                .default_input_device()
                .ok_or_else(|| VoiceError::AudioDevice("No input device available".to_string())),
        }
    }
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> String {
        self.device_name
            .clone()
            .unwrap_or_else(|| "default input".to_string())
    }

    fn config(&self) -> &AudioConfig {
        &self.config
    }

    fn open(self: Box<Self>) -> VoiceResult<Box<dyn FrameSource>> {
        let device = self.find_device()?;
        let label = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let default_config = device.default_input_config()?;
        let device_rate = default_config.sample_rate().0;
        let channels = default_config.channels() as usize;
        let target_rate = self.config.sample_rate;
        let stream_config: StreamConfig = default_config.clone().into();

        info!(
            "🎤 Opening input '{}' ({} Hz, {} ch) → mono {} Hz",
            label, device_rate, channels, target_rate
        );

        let (tx, rx) = mpsc::channel::<Vec<f32>>();

        let stream = match default_config.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = to_mono_resampled(data, channels, device_rate, target_rate);
                    // The receiver is gone once the capture stage stops.
                    let _ = tx.send(mono);
                },
                move |err| warn!("Audio stream error: {}", err),
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats = pcm_i16_to_f32(data);
                    let mono = to_mono_resampled(&floats, channels, device_rate, target_rate);
                    let _ = tx.send(mono);
                },
                move |err| warn!("Audio stream error: {}", err),
                None,
            )?,
            other => {
                return Err(VoiceError::AudioDevice(format!(
                    "Unsupported sample format {:?} (need F32 or I16)",
                    other
                )))
            }
        };
        stream.play()?;

        info!("✅ Audio capture started on '{}'", label);
        Ok(Box::new(CpalSource {
            _stream: stream,
            rx,
            pending: Vec::with_capacity(self.config.frame_size * 2),
            frame_size: self.config.frame_size.max(1),
        }))
    }
}

/// Live cpal stream re-framed into fixed-size blocks.
struct CpalSource {
    _stream: Stream,
    rx: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    frame_size: usize,
}

impl FrameSource for CpalSource {
    fn next_frame(&mut self, timeout: Duration) -> VoiceResult<FrameRead> {
        let deadline = Instant::now() + timeout;
        while self.pending.len() < self.frame_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(samples) => self.pending.extend_from_slice(&samples),
                Err(RecvTimeoutError::Timeout) => return Ok(FrameRead::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Ok(FrameRead::Closed),
            }
        }
        let samples: Vec<f32> = self.pending.drain(..self.frame_size).collect();
        Ok(FrameRead::Frame(AudioFrame::new(samples)))
    }
}

/// List available input devices
pub fn list_input_devices() -> VoiceResult<Vec<String>> {
    let host = cpal::default_host();
    let devices = host.input_devices()?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            device_names.push(name);
        }
    }

    Ok(device_names)
}
