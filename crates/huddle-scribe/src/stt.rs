//! Builds the configured speech-to-text backend.

use huddle_core::{SttProvider, TranscriptionSettings};
use huddle_voice::{OpenAiStt, PlaceholderStt, SttBackend, VoiceError, VoiceResult};
use std::sync::Arc;
use tracing::info;

/// Backend for `settings.stt_provider`. A missing API key or model path is a config error;
/// requesting Whisper without the `whisper` feature falls back to the placeholder.
pub fn create_stt(settings: &TranscriptionSettings) -> VoiceResult<Arc<dyn SttBackend>> {
    match settings.stt_provider {
        SttProvider::Placeholder => {
            info!("Using placeholder STT (no speech will be recognized)");
            Ok(Arc::new(PlaceholderStt::new()))
        }
        SttProvider::OpenAi => {
            let key = settings.resolved_api_key().ok_or_else(|| {
                VoiceError::Config(
                    "openai STT requires transcription.stt_api_key, STT_API_KEY or OPENAI_API_KEY"
                        .to_string(),
                )
            })?;
            info!("Using OpenAI-compatible STT at {} ({})", settings.stt_api_url, settings.stt_model);
            let stt = OpenAiStt::new(&settings.stt_api_url, key, &settings.stt_model)?
                .with_language(settings.language.clone());
            Ok(Arc::new(stt))
        }
        SttProvider::Whisper => create_whisper(settings),
    }
}

#[cfg(feature = "whisper")]
fn create_whisper(settings: &TranscriptionSettings) -> VoiceResult<Arc<dyn SttBackend>> {
    let path = settings
        .whisper_model_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            VoiceError::Config("whisper STT requires transcription.whisper_model_path".to_string())
        })?;
    info!("Loading Whisper model from {}", path);
    let stt = huddle_voice::WhisperStt::new(path, Some(settings.language.clone()))?;
    Ok(Arc::new(stt))
}

#[cfg(not(feature = "whisper"))]
fn create_whisper(_settings: &TranscriptionSettings) -> VoiceResult<Arc<dyn SttBackend>> {
    tracing::warn!("Built without the `whisper` feature; falling back to placeholder STT");
    Ok(Arc::new(PlaceholderStt::new()))
}
