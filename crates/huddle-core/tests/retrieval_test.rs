//! End-to-end retrieval over the public API: ingestion, ranking, concurrency.
//!
//! Run with: `cargo test -p huddle-core --test retrieval_test`

use huddle_core::{
    Chunker, Document, HashingEmbedder, KnowledgeBase, VectorIndex, TRANSCRIPT_SOURCE,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

fn knowledge_base() -> KnowledgeBase {
    KnowledgeBase::new(Chunker::default(), Arc::new(HashingEmbedder::new(384).unwrap()))
}

#[test]
fn late_delivery_question_finds_the_contract() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let kb = knowledge_base();
    kb.index_documents([Document::new(
        "Late delivery incurs a 5% penalty per week.",
        "contract.pdf",
    )])
    .expect("index contract");

    let results = kb.retrieve("What happens if delivery is late?", 1).expect("retrieve");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, "contract.pdf");
    assert!(results[0].content.contains("penalty"));
}

#[test]
fn empty_index_answers_with_nothing() {
    let kb = knowledge_base();
    let results = kb.retrieve("anything", 3).expect("retrieve on empty index");
    assert!(results.is_empty());
}

#[test]
fn documents_and_transcript_are_searched_together() {
    let kb = knowledge_base();
    kb.index_documents([
        ("The vendor must deliver the hardware by March.", "sow.txt"),
        ("The office plants get watered every Tuesday.", "facilities.txt"),
    ])
    .unwrap();
    kb.index_transcript("Alice said the hardware delivery will slip to April.")
        .unwrap();

    let hits = kb.retriever().retrieve_scored("hardware delivery date", 3).unwrap();
    assert_eq!(hits.len(), 3);
    let top_two: HashSet<&str> = hits[..2].iter().map(|h| h.source.as_str()).collect();
    assert!(top_two.contains("sow.txt"));
    assert!(top_two.contains(TRANSCRIPT_SOURCE));
    assert_eq!(hits[2].source, "facilities.txt");
}

#[test]
fn reinserting_identical_chunks_keeps_both() {
    let kb = knowledge_base();
    kb.index_documents([("Budget approved.", "minutes.txt")]).unwrap();
    kb.index_documents([("Budget approved.", "minutes.txt")]).unwrap();
    assert_eq!(kb.index().len(), 2);

    let hits = kb.retriever().retrieve_scored("budget approved", 2).unwrap();
    assert_eq!(hits[0].sequence_id, 0);
    assert_eq!(hits[1].sequence_id, 1);
}

#[test]
fn concurrent_batches_lose_nothing_and_never_reuse_ids() {
    const WRITERS: usize = 8;
    const PER_WRITER: usize = 50;

    let index = Arc::new(VectorIndex::new(Arc::new(HashingEmbedder::new(64).unwrap())));

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for batch in 0..(PER_WRITER / 5) {
                    let entries: Vec<(String, String)> = (0..5)
                        .map(|i| (format!("writer {} batch {} item {}", w, batch, i), format!("source-{}", w)))
                        .collect();
                    index.insert_batch(entries).expect("insert");
                }
            })
        })
        .collect();

    let reader = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for _ in 0..50 {
                for hit in index.query("writer batch item", 5).expect("query") {
                    assert!(hit.text.starts_with("writer "));
                }
            }
        })
    };

    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();

    let entries = index.entries();
    assert_eq!(entries.len(), WRITERS * PER_WRITER);
    let ids: HashSet<u64> = entries.iter().map(|e| e.chunk.sequence_id).collect();
    assert_eq!(ids.len(), WRITERS * PER_WRITER);
    for pair in entries.windows(2) {
        assert!(pair[0].chunk.sequence_id < pair[1].chunk.sequence_id);
    }

    // Each writer's own entries stay in the order it submitted them.
    for w in 0..WRITERS {
        let texts: Vec<String> = index
            .entries_from(&format!("source-{}", w))
            .iter()
            .map(|e| e.chunk.text.clone())
            .collect();
        let expected: Vec<String> = (0..PER_WRITER / 5)
            .flat_map(|b| (0..5).map(move |i| format!("writer {} batch {} item {}", w, b, i)))
            .collect();
        assert_eq!(texts, expected);
    }
}

#[test]
fn chunk_coverage_holds_for_long_documents() {
    let text = "Section one covers scope and deliverables.\n\nSection two covers fees, \
                penalties and the schedule. Either party may terminate with notice. "
        .repeat(40);
    let chunker = Chunker::default();
    let spans = chunker.split_spans(&text);
    assert!(spans.len() > 1);

    let mut rebuilt = String::new();
    for (i, span) in spans.iter().enumerate() {
        let stop = spans.get(i + 1).map(|n| n.start).unwrap_or(span.end);
        rebuilt.push_str(&text[span.start..stop]);
    }
    assert_eq!(rebuilt, text.trim());
}
