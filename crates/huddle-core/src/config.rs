//! Huddle configuration: built-in defaults, optional TOML file, then environment.
//!
//! | Source | Example |
//! |--------|---------|
//! | `HUDDLE_CONFIG` | path to a TOML file (default `config/huddle.toml`, optional) |
//! | `HUDDLE_CHUNKING__SIZE` | `800` |
//! | `HUDDLE_EMBEDDING__PROVIDER` | `hashing` \| `openai` |
//! | `HUDDLE_TRANSCRIPTION__BACKPRESSURE` | `drop` \| `block` |
//! | `EMBEDDING_API_KEY` / `STT_API_KEY` | fallback secrets when the config leaves keys empty |

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config/huddle.toml";

/// Top-level configuration for the indexing engine and the transcription pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub transcription: TranscriptionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target chunk length in characters.
    pub size: usize,
    /// Characters shared between consecutive chunks. Must be below `size`.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local feature-hashing embedder; deterministic, no model download.
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint.
    #[serde(alias = "open_ai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Vector length. Fixed for the lifetime of the process.
    pub dimension: usize,
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            // all-MiniLM-L6-v2 width
            dimension: 384,
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
        }
    }
}

impl EmbeddingSettings {
    /// Configured key, else `EMBEDDING_API_KEY`, else `OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_opt_string("EMBEDDING_API_KEY"))
            .or_else(|| env_opt_string("OPENAI_API_KEY"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// What the capture stage does when the hand-off queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Drop the newest frame and count it.
    Drop,
    /// Wait for the transcription stage to free a slot.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    Placeholder,
    #[serde(alias = "open_ai")]
    OpenAi,
    Whisper,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub sample_rate: u32,
    /// Samples per captured frame.
    pub frame_size: usize,
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
    /// Seconds of audio accumulated before each model call.
    pub window_secs: f32,
    /// Windows whose RMS falls below this are treated as silence without a model call. 0 disables.
    pub silence_rms: f32,
    pub language: String,
    pub stt_provider: SttProvider,
    pub stt_api_url: String,
    pub stt_api_key: Option<String>,
    pub stt_model: String,
    pub whisper_model_path: Option<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 1024,
            queue_capacity: 512,
            backpressure: Backpressure::Drop,
            window_secs: 5.0,
            silence_rms: 0.0,
            language: "en".to_string(),
            stt_provider: SttProvider::Placeholder,
            stt_api_url: "https://api.openai.com/v1".to_string(),
            stt_api_key: None,
            stt_model: "whisper-1".to_string(),
            whisper_model_path: None,
        }
    }
}

impl TranscriptionSettings {
    /// Number of samples per transcription window (at least one frame).
    pub fn window_samples(&self) -> usize {
        let samples = (self.window_secs * self.sample_rate as f32).round() as usize;
        samples.max(self.frame_size).max(1)
    }

    /// Configured key, else `STT_API_KEY`, else `OPENAI_API_KEY`.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.stt_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_opt_string("STT_API_KEY"))
            .or_else(|| env_opt_string("OPENAI_API_KEY"))
    }
}

impl HuddleConfig {
    /// Load config from file and environment. Precedence: env > `HUDDLE_CONFIG` file > defaults.
    pub fn load() -> CoreResult<Self> {
        let config_path =
            std::env::var("HUDDLE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = config::Config::builder();

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("HUDDLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document on top of the defaults (no environment).
    pub fn from_toml_str(toml: &str) -> CoreResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.chunking.size == 0 {
            return Err(CoreError::InvalidConfig("chunking.size must be positive".into()));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(CoreError::InvalidConfig(format!(
                "chunking.overlap ({}) must be less than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.embedding.dimension == 0 {
            return Err(CoreError::InvalidConfig("embedding.dimension must be positive".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(CoreError::InvalidConfig("retrieval.top_k must be positive".into()));
        }
        let t = &self.transcription;
        if t.sample_rate == 0 || t.frame_size == 0 {
            return Err(CoreError::InvalidConfig(
                "transcription.sample_rate and transcription.frame_size must be positive".into(),
            ));
        }
        if t.queue_capacity == 0 {
            return Err(CoreError::InvalidConfig("transcription.queue_capacity must be positive".into()));
        }
        if !(t.window_secs > 0.0) {
            return Err(CoreError::InvalidConfig("transcription.window_secs must be positive".into()));
        }
        Ok(())
    }
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = HuddleConfig::default();
        assert_eq!(c.chunking.size, 1000);
        assert_eq!(c.chunking.overlap, 200);
        assert_eq!(c.retrieval.top_k, 3);
        assert_eq!(c.embedding.provider, EmbeddingProvider::Hashing);
        assert_eq!(c.transcription.sample_rate, 16_000);
        assert_eq!(c.transcription.backpressure, Backpressure::Drop);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let c = HuddleConfig::from_toml_str(
            r#"
            [chunking]
            size = 500

            [embedding]
            provider = "openai"
            dimension = 1536

            [transcription]
            backpressure = "block"
            stt_provider = "whisper"
            "#,
        )
        .unwrap();
        assert_eq!(c.chunking.size, 500);
        assert_eq!(c.chunking.overlap, 200);
        assert_eq!(c.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(c.embedding.dimension, 1536);
        assert_eq!(c.transcription.backpressure, Backpressure::Block);
        assert_eq!(c.transcription.stt_provider, SttProvider::Whisper);
        assert_eq!(c.transcription.frame_size, 1024);
    }

    #[test]
    fn overlap_must_be_below_size() {
        let err = HuddleConfig::from_toml_str("[chunking]\nsize = 100\noverlap = 100\n").unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn window_samples_never_below_one_frame() {
        let mut t = TranscriptionSettings::default();
        assert_eq!(t.window_samples(), 80_000);
        t.window_secs = 0.001;
        assert_eq!(t.window_samples(), t.frame_size);
    }
}
