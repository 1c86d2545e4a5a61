//! Non-live audio inputs: in-memory frames and WAV file replay.

use crate::audio::{
    pcm_i16_to_f32, to_mono_resampled, AudioConfig, AudioDevice, AudioFrame, FrameRead, FrameSource,
};
use crate::error::{VoiceError, VoiceResult};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Yields pre-built frames, then closes. Optionally repeats one frame forever.
pub struct MemoryDevice {
    config: AudioConfig,
    frames: Vec<Vec<f32>>,
    repeat: Option<Vec<f32>>,
    pace: Option<Duration>,
    open_error: Option<String>,
}

impl MemoryDevice {
    pub fn new(frames: Vec<Vec<f32>>) -> Self {
        let frame_size = frames.first().map(Vec::len).unwrap_or(1024).max(1);
        Self {
            config: AudioConfig {
                frame_size,
                ..AudioConfig::default()
            },
            frames,
            repeat: None,
            pace: None,
            open_error: None,
        }
    }

    /// Split a sample buffer into `frame_size` frames; the last frame may be short.
    pub fn from_samples(samples: &[f32], frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        let mut device = Self::new(samples.chunks(frame_size).map(<[f32]>::to_vec).collect());
        device.config.frame_size = frame_size;
        device
    }

    /// `count` frames of digital silence.
    pub fn silent(count: usize, frame_size: usize) -> Self {
        Self::from_samples(&vec![0.0; count * frame_size], frame_size)
    }

    /// Never closes: yields `frame` every `pace` after the scripted frames are exhausted.
    pub fn repeating(frame: Vec<f32>, pace: Duration) -> Self {
        let mut device = Self::new(Vec::new());
        device.config.frame_size = frame.len().max(1);
        device.repeat = Some(frame);
        device.pace = Some(pace);
        device
    }

    /// A device whose `open` fails, as a missing microphone would.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut device = Self::new(Vec::new());
        device.open_error = Some(message.into());
        device
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }
}

impl AudioDevice for MemoryDevice {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn config(&self) -> &AudioConfig {
        &self.config
    }

    fn open(self: Box<Self>) -> VoiceResult<Box<dyn FrameSource>> {
        if let Some(message) = self.open_error {
            return Err(VoiceError::AudioDevice(message));
        }
        Ok(Box::new(MemorySource {
            frames: self.frames.into(),
            repeat: self.repeat,
            pace: self.pace,
            next_due: None,
        }))
    }
}

struct MemorySource {
    frames: VecDeque<Vec<f32>>,
    repeat: Option<Vec<f32>>,
    pace: Option<Duration>,
    /// When the next paced frame is ready; carried across timed-out reads.
    next_due: Option<Instant>,
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self, timeout: Duration) -> VoiceResult<FrameRead> {
        if let Some(pace) = self.pace {
            let due = *self.next_due.get_or_insert_with(|| Instant::now() + pace);
            let wait = due.saturating_duration_since(Instant::now());
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(FrameRead::Timeout);
            }
            std::thread::sleep(wait);
            self.next_due = Some(due + pace);
        }
        if let Some(samples) = self.frames.pop_front() {
            return Ok(FrameRead::Frame(AudioFrame::new(samples)));
        }
        match &self.repeat {
            Some(samples) => Ok(FrameRead::Frame(AudioFrame::new(samples.clone()))),
            None => Ok(FrameRead::Closed),
        }
    }
}

/// Replays a WAV recording as frames at the configured rate (down-mixed to mono).
pub struct WavFileDevice {
    path: PathBuf,
    config: AudioConfig,
}

impl WavFileDevice {
    pub fn new(path: impl AsRef<Path>, config: AudioConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
        }
    }

    /// Decode the whole file to mono f32 at the configured rate.
    pub fn read_samples(&self) -> VoiceResult<Vec<f32>> {
        let mut reader = hound::WavReader::open(&self.path).map_err(|e| {
            VoiceError::AudioDevice(format!("cannot open {}: {}", self.path.display(), e))
        })?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, _) => reader.samples::<f32>().collect::<Result<_, _>>()?,
            (hound::SampleFormat::Int, 16) => {
                let raw: Vec<i16> = reader.samples::<i16>().collect::<Result<_, _>>()?;
                pcm_i16_to_f32(&raw)
            }
            (hound::SampleFormat::Int, bits) => {
                let scale = (1i64 << (bits.saturating_sub(1))) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()?
            }
        };
        Ok(to_mono_resampled(
            &interleaved,
            spec.channels as usize,
            spec.sample_rate,
            self.config.sample_rate,
        ))
    }
}

impl AudioDevice for WavFileDevice {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn config(&self) -> &AudioConfig {
        &self.config
    }

    fn open(self: Box<Self>) -> VoiceResult<Box<dyn FrameSource>> {
        let samples = self.read_samples()?;
        let frame_size = self.config.frame_size.max(1);
        info!(
            "Replaying {} ({:.1}s of audio)",
            self.path.display(),
            samples.len() as f64 / self.config.sample_rate.max(1) as f64
        );
        Ok(Box::new(MemorySource {
            frames: samples.chunks(frame_size).map(<[f32]>::to_vec).collect(),
            repeat: None,
            pace: None,
            next_due: None,
        }))
    }
}
