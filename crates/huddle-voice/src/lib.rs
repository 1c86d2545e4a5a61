//! # Huddle Voice
//!
//! Audio input and speech recognition for the meeting copilot.
//!
//! ```text
//! ┌──────────────┐   AudioFrame    ┌──────────────┐  Transcription
//! │ AudioDevice  │ ──────────────→ │  SttBackend  │ ──────────────→
//! │ cpal / WAV / │  (16 kHz mono)  │ Whisper/API/ │
//! │   memory     │                 │ placeholder  │
//! └──────────────┘                 └──────────────┘
//! ```
//!
//! Frame queuing, windowing and transcript bookkeeping live in `huddle-scribe`.

pub mod audio;
pub mod error;
pub mod replay;
pub mod stt;

pub use audio::{
    list_input_devices, rms, to_mono_resampled, AudioConfig, AudioDevice, AudioFrame, CpalDevice,
    FrameRead, FrameSource, WHISPER_SAMPLE_RATE,
};
pub use error::{VoiceError, VoiceResult};
pub use replay::{MemoryDevice, WavFileDevice};
pub use stt::{encode_wav, OpenAiStt, PlaceholderStt, SttBackend, Transcription};
#[cfg(feature = "whisper")]
pub use stt::WhisperStt;
