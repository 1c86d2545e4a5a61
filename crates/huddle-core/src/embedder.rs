//! **Embedders** - map a text segment to a fixed-length vector.
//!
//! Implement [`Embedder`] for a local model or a remote embedding API. The
//! dimension is fixed for the lifetime of the process and identical text must
//! always produce an identical vector.

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Most inputs sent in one `/embeddings` request.
pub const MAX_INPUTS_PER_REQUEST: usize = 64;

/// Backend for turning text into embedding vectors.
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed one text. Blocking.
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// Embed several texts, reporting failures per item.
    fn embed_batch(&self, texts: &[&str]) -> Vec<CoreResult<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Local feature-hashing embedder.
///
/// Lowercased alphanumeric tokens (and adjacent-token bigrams at half weight)
/// are hashed into signed buckets, then the vector is L2-normalized. Stable
/// across runs and platforms, which makes it suitable for fixtures and for
/// running without a model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> CoreResult<Self> {
        if dimension == 0 {
            return Err(CoreError::InvalidConfig("embedding dimension must be positive".into()));
        }
        Ok(Self { dimension })
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let h = fnv1a(feature.as_bytes());
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            return Err(CoreError::Model(format!(
                "no embeddable tokens in {:?}",
                truncate_for_log(text)
            )));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            // Every feature cancelled out; fall back to the first token's bucket.
            self.add_feature(&mut vector, &tokens[0], 1.0);
            let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Remote embedder: OpenAI-compatible `POST {base_url}/embeddings`.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    dimension: usize,
    client: reqwest::blocking::Client,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> CoreResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CoreError::Model(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension,
            client,
        })
    }

    pub fn from_settings(settings: &EmbeddingSettings) -> CoreResult<Self> {
        let api_key = settings.resolved_api_key().ok_or_else(|| {
            CoreError::InvalidConfig(
                "openai embeddings require embedding.api_key, EMBEDDING_API_KEY or OPENAI_API_KEY"
                    .to_string(),
            )
        })?;
        Self::new(&settings.api_url, api_key, &settings.model, settings.dimension)
    }

    fn request(&self, texts: &[&str]) -> CoreResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .map_err(|e| CoreError::Model(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(CoreError::Model(format!("embedding API error {}: {}", status, body)));
        }
        let mut parsed: EmbeddingResponse = res.json().map_err(|e| CoreError::Model(e.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(CoreError::Model(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn check_dimension(&self, vector: Vec<f32>) -> CoreResult<Vec<f32>> {
        if vector.len() != self.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut vectors = self.request(&[text])?;
        let vector = vectors
            .pop()
            .ok_or_else(|| CoreError::Model("embedding API returned no vector".into()))?;
        self.check_dimension(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Vec<CoreResult<Vec<f32>>> {
        if texts.is_empty() {
            return Vec::new();
        }
        let mut results = Vec::with_capacity(texts.len());
        for group in texts.chunks(MAX_INPUTS_PER_REQUEST) {
            match self.request(group) {
                Ok(vectors) => {
                    results.extend(vectors.into_iter().map(|v| self.check_dimension(v)))
                }
                Err(e) if group.len() == 1 => results.push(Err(e)),
                Err(e) => {
                    // One rejected input fails the whole request; isolate it.
                    warn!(inputs = group.len(), "Batch embedding failed, retrying per text: {}", e);
                    results.extend(group.iter().map(|t| self.embed(t)));
                }
            }
        }
        results
    }
}

/// Build the configured embedder.
pub fn create_embedder(settings: &EmbeddingSettings) -> CoreResult<Arc<dyn Embedder>> {
    match settings.provider {
        EmbeddingProvider::Hashing => {
            info!(dimension = settings.dimension, "Using local hashing embedder");
            Ok(Arc::new(HashingEmbedder::new(settings.dimension)?))
        }
        EmbeddingProvider::OpenAi => {
            let embedder = OpenAiEmbedder::from_settings(settings)?;
            info!(
                model = %embedder.model,
                dimension = settings.dimension,
                "Using remote embedder at {}",
                embedder.base_url
            );
            Ok(Arc::new(embedder))
        }
    }
}

pub(crate) fn truncate_for_log(text: &str) -> String {
    const MAX: usize = 60;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(MAX).collect();
        s.push('…');
        s
    }
}
