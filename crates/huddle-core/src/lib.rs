//! # Huddle Core - semantic index over documents and the live transcript
//!
//! ```text
//! documents ─┐
//!            ├─▶ Chunker ─▶ Embedder ─▶ VectorIndex ◀── Retriever ◀── query
//! transcript ┘
//! ```
//!
//! The index lives in memory for the life of the process: it is created empty,
//! grows by appending, and is searched by brute-force cosine similarity.

pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod knowledge;
pub mod retrieval;

pub use chunker::{Chunker, TextSpan, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{
    Backpressure, ChunkingSettings, EmbeddingProvider, EmbeddingSettings, HuddleConfig,
    RetrievalSettings, SttProvider, TranscriptionSettings,
};
pub use embedder::{
    create_embedder, Embedder, HashingEmbedder, OpenAiEmbedder, MAX_INPUTS_PER_REQUEST,
};
pub use error::{CoreError, CoreResult};
pub use index::{
    cosine_similarity, Chunk, IndexedEntry, InsertReport, SearchHit, SkippedEntry, VectorIndex,
};
pub use knowledge::{Document, IngestReport, KnowledgeBase, TRANSCRIPT_SOURCE};
pub use retrieval::{RetrievedPassage, Retriever, DEFAULT_TOP_K};
