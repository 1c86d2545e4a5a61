//! Pipeline errors. Only startup and lifecycle problems surface here; per-window
//! failures are logged and counted in [`crate::PipelineStats`].

use huddle_voice::VoiceError;
use thiserror::Error;

pub type ScribeResult<T> = Result<T, ScribeError>;

#[derive(Error, Debug)]
pub enum ScribeError {
    /// The audio device could not be opened; the pipeline did not start.
    #[error("Audio device failed to open: {0}")]
    Device(#[from] VoiceError),

    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// A stage thread could not be spawned or panicked.
    #[error("Pipeline thread error: {0}")]
    Thread(String),
}
