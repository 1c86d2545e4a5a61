//! # Huddle Scribe - live meeting transcription
//!
//! Microphone (or WAV replay) → bounded frame queue → STT → transcript log and
//! semantic index. The transcript becomes searchable alongside the meeting
//! documents as soon as each segment is committed.

pub mod error;
pub mod pipeline;
pub mod stt;
pub mod transcript;

pub use error::{ScribeError, ScribeResult};
pub use pipeline::{PipelineConfig, PipelineState, PipelineStats, TranscriptionPipeline};
pub use stt::create_stt;
pub use transcript::{TranscriptLog, TranscriptSegment};
