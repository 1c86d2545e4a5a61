//! Retrieval query service: the API surface consumed by the reasoning layer.

use crate::error::CoreResult;
use crate::index::{SearchHit, VectorIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default number of passages returned by [`Retriever::retrieve_default`].
pub const DEFAULT_TOP_K: usize = 3;

/// A source-attributed passage, in ranking order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub source: String,
    pub content: String,
}

impl From<SearchHit> for RetrievedPassage {
    fn from(hit: SearchHit) -> Self {
        Self {
            source: hit.source,
            content: hit.text,
        }
    }
}

/// Embeds a query and ranks indexed chunks against it.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    default_k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self {
            index,
            default_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Up to `k` passages, most similar first.
    pub fn retrieve(&self, query: &str, k: usize) -> CoreResult<Vec<RetrievedPassage>> {
        Ok(self
            .retrieve_scored(query, k)?
            .into_iter()
            .map(RetrievedPassage::from)
            .collect())
    }

    pub fn retrieve_default(&self, query: &str) -> CoreResult<Vec<RetrievedPassage>> {
        self.retrieve(query, self.default_k)
    }

    /// Same ranking as [`retrieve`](Self::retrieve), keeping scores and sequence ids.
    pub fn retrieve_scored(&self, query: &str, k: usize) -> CoreResult<Vec<SearchHit>> {
        let hits = self.index.query(query, k)?;
        debug!(k, returned = hits.len(), "Retrieved passages");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn retriever_with(entries: &[(&str, &str)]) -> Retriever {
        let index = Arc::new(VectorIndex::new(Arc::new(HashingEmbedder::new(256).unwrap())));
        index.insert_batch(entries.iter().copied()).unwrap();
        Retriever::new(index)
    }

    #[test]
    fn passages_drop_scores_but_keep_order() {
        let r = retriever_with(&[
            ("weekly sync agenda", "agenda.txt"),
            ("penalty for late delivery is five percent", "contract.pdf"),
        ]);
        let scored = r.retrieve_scored("late delivery penalty", 2).unwrap();
        let passages = r.retrieve("late delivery penalty", 2).unwrap();
        let expected: Vec<RetrievedPassage> = scored.into_iter().map(Into::into).collect();
        assert_eq!(passages, expected);
        assert_eq!(passages[0].source, "contract.pdf");
    }

    #[test]
    fn default_k_is_three() {
        let r = retriever_with(&[("one", "a"), ("two", "a"), ("three", "a"), ("four", "a")]);
        assert_eq!(r.default_k(), 3);
        assert_eq!(r.retrieve_default("one two three four").unwrap().len(), 3);
        assert_eq!(r.clone().with_default_k(0).default_k(), 1);
    }
}
