//! Speech-to-text backends: turn a window of mono f32 PCM into text.
//!
//! `SttBackend` is the seam between the capture pipeline and whatever model does the
//! inference: a local Whisper model (`whisper` feature), an OpenAI-compatible
//! `/audio/transcriptions` endpoint, or a scripted placeholder for tests.

use crate::error::{VoiceError, VoiceResult};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Text recognized in one audio window. Empty `text` means nothing was heard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
}

impl Transcription {
    pub fn new(text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            text: text.into(),
            language,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

pub trait SttBackend: Send + Sync {
    /// Transcribe `samples` (mono f32 at `sample_rate`). Silence yields an empty transcription.
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcription>;

    fn name(&self) -> &str {
        "stt"
    }
}

/// Encode mono f32 PCM as a 16-bit WAV for API upload.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> VoiceResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0).round() as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Returns a fixed response for every window; empty unless configured otherwise.
#[derive(Debug, Default)]
pub struct PlaceholderStt {
    pub response: Option<String>,
}

impl PlaceholderStt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: impl Into<String>) -> Self {
        Self {
            response: Some(s.into()),
        }
    }
}

impl SttBackend for PlaceholderStt {
    fn transcribe(&self, samples: &[f32], _sample_rate: u32) -> VoiceResult<Transcription> {
        debug!("placeholder STT received {} samples", samples.len());
        Ok(match &self.response {
            Some(r) => Transcription::new(r.clone(), None),
            None => Transcription::empty(),
        })
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}

/// OpenAI-compatible transcription API (OpenAI Whisper, OpenRouter, local servers).
#[derive(Debug, Clone)]
pub struct OpenAiStt {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    /// whisper-1, gpt-4o-transcribe, etc.
    pub model: String,
    /// ISO-639-1 hint sent with each request.
    pub language: Option<String>,
    client: reqwest::blocking::Client,
}

impl OpenAiStt {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            language: None,
            client,
        })
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        let language = language.into();
        self.language = (!language.trim().is_empty()).then_some(language);
        self
    }
}

impl SttBackend for OpenAiStt {
    fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcription> {
        if samples.is_empty() {
            return Ok(Transcription::empty());
        }
        let wav = encode_wav(samples, sample_rate)?;
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        let mut form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        if let Some(lang) = &self.language {
            form = form.text("language", lang.clone());
        }
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Stt(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Stt(format!("STT API error {}: {}", status, body)));
        }
        let json: serde_json::Value = res.json().map_err(|e| VoiceError::Stt(e.to_string()))?;
        let text = json
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let language = json
            .get("language")
            .and_then(|l| l.as_str())
            .map(str::to_string)
            .or_else(|| self.language.clone());
        Ok(Transcription::new(text, language))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(feature = "whisper")]
mod whisper_stt {
    use super::*;
    use crate::audio::WHISPER_SAMPLE_RATE;
    use std::sync::Mutex;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Local Whisper inference on a ggml model (e.g. ggml-base.en.bin). Audio must be 16 kHz mono.
    pub struct WhisperStt {
        #[allow(dead_code)]
        context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
        language: Option<String>,
    }

    impl WhisperStt {
        pub fn new(model_path: &str, language: Option<String>) -> VoiceResult<Self> {
            let path = model_path.trim();
            if path.is_empty() {
                return Err(VoiceError::Config("Whisper model path is empty".to_string()));
            }
            let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
                .map_err(|e| VoiceError::Stt(format!("Whisper load failed: {}", e)))?;
            let state = context
                .create_state()
                .map_err(|e| VoiceError::Stt(format!("Whisper state init failed: {}", e)))?;
            Ok(Self {
                context,
                state: Mutex::new(state),
                language: language.filter(|l| !l.trim().is_empty()),
            })
        }
    }

    impl SttBackend for WhisperStt {
        fn transcribe(&self, samples: &[f32], sample_rate: u32) -> VoiceResult<Transcription> {
            if samples.is_empty() {
                return Ok(Transcription::empty());
            }
            if sample_rate != WHISPER_SAMPLE_RATE {
                return Err(VoiceError::Stt(format!(
                    "Whisper expects {} Hz; got {} Hz",
                    WHISPER_SAMPLE_RATE, sample_rate
                )));
            }
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(self.language.as_deref());

            let mut state = self
                .state
                .lock()
                .map_err(|e| VoiceError::Stt(format!("Whisper lock poisoned: {}", e)))?;
            state
                .full(params, samples)
                .map_err(|e| VoiceError::Stt(format!("Whisper inference failed: {}", e)))?;
            let text = state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok().map(str::to_string))
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string();
            Ok(Transcription::new(text, self.language.clone()))
        }

        fn name(&self) -> &str {
            "whisper"
        }
    }
}

#[cfg(feature = "whisper")]
pub use whisper_stt::WhisperStt;
