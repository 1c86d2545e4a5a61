//! Knowledge base: the write path (chunk → embed → index) for documents and
//! the live transcript, plus the read path through [`Retriever`].

use crate::chunker::Chunker;
use crate::config::HuddleConfig;
use crate::embedder::{create_embedder, Embedder};
use crate::error::CoreResult;
use crate::index::{InsertReport, VectorIndex};
use crate::retrieval::{RetrievedPassage, Retriever};
use std::sync::Arc;
use tracing::{info, warn};

/// Source marker for chunks that came from the meeting transcript.
pub const TRANSCRIPT_SOURCE: &str = "transcript";

/// Text already extracted from a file by the format-parsing collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    /// Usually the file name without directories.
    pub source: String,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

impl<T: Into<String>, S: Into<String>> From<(T, S)> for Document {
    fn from((text, source): (T, S)) -> Self {
        Self::new(text, source)
    }
}

/// What one ingestion call did.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Documents (or transcript texts) that produced at least one chunk.
    pub documents: usize,
    pub chunks: usize,
    pub insert: InsertReport,
}

impl IngestReport {
    pub fn inserted(&self) -> usize {
        self.insert.inserted_count()
    }

    pub fn skipped(&self) -> usize {
        self.insert.skipped_count()
    }
}

/// Chunker + embedder + vector index, always constructed with an empty index.
pub struct KnowledgeBase {
    chunker: Chunker,
    index: Arc<VectorIndex>,
    retriever: Retriever,
}

impl KnowledgeBase {
    pub fn new(chunker: Chunker, embedder: Arc<dyn Embedder>) -> Self {
        let index = Arc::new(VectorIndex::new(embedder));
        let retriever = Retriever::new(Arc::clone(&index));
        Self {
            chunker,
            index,
            retriever,
        }
    }

    /// Build chunker, embedder and retriever from configuration.
    pub fn from_config(config: &HuddleConfig) -> CoreResult<Self> {
        let chunker = Chunker::from_settings(&config.chunking)?;
        let embedder = create_embedder(&config.embedding)?;
        let mut kb = Self::new(chunker, embedder);
        kb.retriever = kb.retriever.with_default_k(config.retrieval.top_k);
        Ok(kb)
    }

    /// Chunk every document and insert all chunks as one batch.
    pub fn index_documents<I, D>(&self, documents: I) -> CoreResult<IngestReport>
    where
        I: IntoIterator<Item = D>,
        D: Into<Document>,
    {
        let mut report = IngestReport::default();
        let mut batch: Vec<(String, String)> = Vec::new();

        for doc in documents.into_iter().map(Into::into) {
            let chunks = self.chunker.split(&doc.text);
            if chunks.is_empty() {
                warn!(source = %doc.source, "Document has no text; skipping");
                continue;
            }
            report.documents += 1;
            report.chunks += chunks.len();
            batch.extend(chunks.into_iter().map(|c| (c, doc.source.clone())));
        }

        if batch.is_empty() {
            return Ok(report);
        }

        report.insert = self.index.insert_batch(batch)?;
        info!(
            documents = report.documents,
            chunks = report.chunks,
            inserted = report.inserted(),
            skipped = report.skipped(),
            "Indexed documents"
        );
        Ok(report)
    }

    /// Chunk transcript text and insert it under [`TRANSCRIPT_SOURCE`]. Blank text is a no-op.
    pub fn index_transcript(&self, text: &str) -> CoreResult<IngestReport> {
        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            return Ok(IngestReport::default());
        }
        let mut report = IngestReport {
            documents: 1,
            chunks: chunks.len(),
            ..Default::default()
        };
        report.insert = self
            .index
            .insert_batch(chunks.into_iter().map(|c| (c, TRANSCRIPT_SOURCE)))?;
        Ok(report)
    }

    pub fn retrieve(&self, query: &str, k: usize) -> CoreResult<Vec<RetrievedPassage>> {
        self.retriever.retrieve(query, k)
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn kb(size: usize, overlap: usize) -> KnowledgeBase {
        KnowledgeBase::new(
            Chunker::new(size, overlap).unwrap(),
            Arc::new(HashingEmbedder::new(128).unwrap()),
        )
    }

    #[test]
    fn documents_are_chunked_and_attributed() {
        let kb = kb(60, 10);
        let long = "Payment is due within thirty days. Invoices are sent monthly. ".repeat(4);
        let report = kb
            .index_documents([
                Document::new(long.as_str(), "terms.txt"),
                Document::new("   ", "empty.txt"),
                Document::new("Short note.", "note.txt"),
            ])
            .unwrap();
        assert_eq!(report.documents, 2);
        assert!(report.chunks > 2);
        assert_eq!(report.inserted(), report.chunks);
        let sources: Vec<String> = kb.index().sources().into_iter().map(|(s, _)| s).collect();
        assert_eq!(sources, vec!["terms.txt", "note.txt"]);
    }

    #[test]
    fn transcript_text_uses_the_marker_source() {
        let kb = kb(1000, 200);
        kb.index_transcript("We agreed to move the launch to May.").unwrap();
        assert!(kb.index_transcript("  \n").unwrap().insert.inserted.is_empty());
        let entries = kb.index().entries_from(TRANSCRIPT_SOURCE);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].chunk.text, "We agreed to move the launch to May.");
    }

    #[test]
    fn tuples_convert_into_documents() {
        let kb = kb(1000, 200);
        let report = kb.index_documents([("hello there", "a.txt")]).unwrap();
        assert_eq!(report.inserted(), 1);
        assert_eq!(kb.retrieve("hello", 1).unwrap()[0].source, "a.txt");
    }
}
