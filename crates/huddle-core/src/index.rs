//! In-memory vector index with brute-force cosine search.
//!
//! Entries are appended under a write lock that covers only the commit of one
//! batch; embedding happens before the lock is taken. Readers see an entry
//! only once its text, source, sequence id and embedding are all committed.
//! A single sequence counter is shared by every source, so ids are unique and
//! strictly increasing for the lifetime of the index.

use crate::embedder::{truncate_for_log, Embedder};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

/// An immutable text segment with its origin and global insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Document file name, or the transcript marker.
    pub source: String,
    pub sequence_id: u64,
}

/// A chunk together with its embedding. Owned by the index, never mutated.
#[derive(Debug, Clone)]
pub struct IndexedEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    /// Cosine similarity, higher is more similar.
    pub score: f32,
    pub sequence_id: u64,
}

/// An entry that `insert_batch` did not store.
#[derive(Debug)]
pub struct SkippedEntry {
    /// Position of the entry in the submitted batch.
    pub position: usize,
    pub source: String,
    pub error: CoreError,
}

/// Outcome of one `insert_batch` call.
#[derive(Debug, Default)]
pub struct InsertReport {
    /// Sequence ids assigned, in batch order.
    pub inserted: Vec<u64>,
    pub skipped: Vec<SkippedEntry>,
}

impl InsertReport {
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[derive(Default)]
struct Store {
    entries: Vec<Arc<IndexedEntry>>,
    next_sequence: u64,
}

/// Append-only vector index. Always constructed empty.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    store: RwLock<Store>,
}

impl VectorIndex {
    /// Create an empty index whose dimension is fixed by the embedder.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let dimension = embedder.dimension();
        Self {
            embedder,
            dimension,
            store: RwLock::new(Store::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed and append `(text, source)` entries.
    ///
    /// Entries that are blank or fail to embed are skipped and reported; the
    /// rest are committed together and receive consecutive sequence ids in
    /// batch order. Safe to call concurrently with itself and with `query`.
    pub fn insert_batch<I, T, S>(&self, entries: I) -> CoreResult<InsertReport>
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        let mut pending: Vec<Option<(String, String)>> = entries
            .into_iter()
            .map(|(t, s)| Some((t.into(), s.into())))
            .collect();
        let mut report = InsertReport::default();

        let mut to_embed = Vec::with_capacity(pending.len());
        for (position, entry) in pending.iter().enumerate() {
            if let Some((text, source)) = entry {
                if text.trim().is_empty() {
                    report.skipped.push(SkippedEntry {
                        position,
                        source: source.clone(),
                        error: CoreError::InvalidInput("blank chunk text".into()),
                    });
                } else {
                    to_embed.push(position);
                }
            }
        }

        let texts: Vec<&str> = to_embed
            .iter()
            .filter_map(|&p| pending[p].as_ref().map(|(t, _)| t.as_str()))
            .collect();
        let mut results = self.embedder.embed_batch(&texts).into_iter();

        let mut ready = Vec::with_capacity(to_embed.len());
        for &position in &to_embed {
            let outcome = results
                .next()
                .unwrap_or_else(|| Err(CoreError::Model("embedder returned too few vectors".into())))
                .and_then(|v| self.check_dimension(v));
            match outcome {
                Ok(embedding) => ready.push((position, embedding)),
                Err(error) => {
                    let (text, source) = pending[position]
                        .as_ref()
                        .map(|(t, s)| (t.as_str(), s.clone()))
                        .unwrap_or_default();
                    warn!(
                        source = %source,
                        "Skipping chunk {:?}: {}",
                        truncate_for_log(text),
                        error
                    );
                    report.skipped.push(SkippedEntry {
                        position,
                        source,
                        error,
                    });
                }
            }
        }
        report.skipped.sort_by_key(|s| s.position);

        if ready.is_empty() {
            return Ok(report);
        }

        let mut store = self
            .store
            .write()
            .map_err(|_| CoreError::InvariantViolation("vector index lock poisoned".into()))?;

        if let Some(last) = store.entries.last() {
            if last.chunk.sequence_id >= store.next_sequence {
                return Err(CoreError::InvariantViolation(format!(
                    "sequence counter {} not ahead of last committed id {}",
                    store.next_sequence, last.chunk.sequence_id
                )));
            }
        }

        for (position, embedding) in ready {
            let Some((text, source)) = pending[position].take() else {
                continue;
            };
            let sequence_id = store.next_sequence;
            store.next_sequence += 1;
            store.entries.push(Arc::new(IndexedEntry {
                chunk: Chunk {
                    text,
                    source,
                    sequence_id,
                },
                embedding,
            }));
            report.inserted.push(sequence_id);
        }

        debug!(
            inserted = report.inserted.len(),
            skipped = report.skipped.len(),
            total = store.entries.len(),
            "Committed batch to vector index"
        );
        Ok(report)
    }

    /// Top-`k` entries by cosine similarity to `text`, ties broken by lower sequence id.
    ///
    /// An empty index, `k == 0` or a blank query yield an empty result.
    pub fn query(&self, text: &str, k: usize) -> CoreResult<Vec<SearchHit>> {
        if k == 0 || text.trim().is_empty() || self.is_empty() {
            return Ok(Vec::new());
        }
        let query = self.embedder.embed(text)?;
        let query = self.check_dimension(query)?;
        self.search_by_vector(&query, k)
    }

    /// Linear scan over every committed entry.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> CoreResult<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let store = self
            .store
            .read()
            .map_err(|_| CoreError::InvariantViolation("vector index lock poisoned".into()))?;

        // Entries are stored in sequence order, so position order is insertion order.
        let mut scored: Vec<(f32, usize)> = store
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (cosine_similarity(query, &e.embedding), i))
            .collect();

        let ranking = |a: &(f32, usize), b: &(f32, usize)| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1));
        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, ranking);
            scored.truncate(k);
        }
        scored.sort_by(ranking);

        Ok(scored
            .into_iter()
            .map(|(score, i)| {
                let chunk = &store.entries[i].chunk;
                SearchHit {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    score,
                    sequence_id: chunk.sequence_id,
                }
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.snapshot().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All committed entries in insertion order.
    pub fn entries(&self) -> Vec<Arc<IndexedEntry>> {
        self.snapshot().entries.clone()
    }

    /// Committed entries from one source, in insertion order.
    pub fn entries_from(&self, source: &str) -> Vec<Arc<IndexedEntry>> {
        self.snapshot()
            .entries
            .iter()
            .filter(|e| e.chunk.source == source)
            .cloned()
            .collect()
    }

    /// Distinct sources with their entry counts, in order of first insertion.
    pub fn sources(&self) -> Vec<(String, usize)> {
        let store = self.snapshot();
        let mut out: Vec<(String, usize)> = Vec::new();
        for entry in &store.entries {
            match out.iter_mut().find(|(s, _)| *s == entry.chunk.source) {
                Some((_, n)) => *n += 1,
                None => out.push((entry.chunk.source.clone(), 1)),
            }
        }
        out
    }

    /// Read access for introspection. Committed entries are never half-written,
    /// so a poisoned lock still holds a consistent store.
    fn snapshot(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
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

/// Cosine similarity; 0.0 when either vector has zero length or the result is not finite.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let sim = dot / (na.sqrt() * nb.sqrt());
    if sim.is_finite() {
        sim
    } else {
        0.0
    }
}
