//! End-to-end pipeline tests: scripted audio devices → STT → transcript log → index.

use huddle_core::{Backpressure, Chunker, Document, HashingEmbedder, KnowledgeBase, TRANSCRIPT_SOURCE};
use huddle_scribe::{PipelineConfig, PipelineState, ScribeError, TranscriptionPipeline};
use huddle_voice::{
    AudioConfig, MemoryDevice, PlaceholderStt, SttBackend, Transcription, VoiceError, VoiceResult,
    WavFileDevice,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn knowledge() -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::new(
        Chunker::default(),
        Arc::new(HashingEmbedder::new(128).unwrap()),
    ))
}

fn config(window_samples: usize) -> PipelineConfig {
    PipelineConfig {
        window_samples,
        backpressure: Backpressure::Block,
        read_timeout: Duration::from_millis(10),
        ..PipelineConfig::default()
    }
}

/// Replays a fixed script of results, one per window, then reports silence.
struct ScriptedStt {
    script: Mutex<VecDeque<VoiceResult<Transcription>>>,
}

impl ScriptedStt {
    fn new(script: Vec<VoiceResult<Transcription>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    fn texts(texts: &[&str]) -> Self {
        Self::new(
            texts
                .iter()
                .map(|t| Ok(Transcription::new(*t, Some("en".to_string()))))
                .collect(),
        )
    }
}

impl SttBackend for ScriptedStt {
    fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> VoiceResult<Transcription> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Transcription::empty()))
    }
}

struct SlowStt(Duration);

impl SttBackend for SlowStt {
    fn transcribe(&self, _samples: &[f32], _sample_rate: u32) -> VoiceResult<Transcription> {
        std::thread::sleep(self.0);
        Ok(Transcription::empty())
    }
}

#[test]
fn silent_frames_leave_transcript_and_index_untouched() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let kb = knowledge();
    kb.index_documents(vec![Document::new("Quarterly revenue grew by ten percent.", "report.md")])
        .unwrap();
    let before = kb.index().len();

    let pipeline = TranscriptionPipeline::new(
        PipelineConfig {
            backpressure: Backpressure::Block,
            read_timeout: Duration::from_millis(10),
            ..PipelineConfig::default()
        },
        Arc::new(PlaceholderStt::new()),
        Arc::clone(&kb),
    );
    pipeline.start(Box::new(MemoryDevice::silent(3, 1024))).unwrap();
    let stats = pipeline.wait().unwrap();

    assert_eq!(stats.frames_captured, 3);
    assert_eq!(stats.frames_transcribed, 3);
    assert_eq!(stats.segments_committed, 0);
    assert_eq!(pipeline.transcript().len(), 0);
    assert_eq!(kb.index().len(), before);
}

#[test]
fn transcript_entries_follow_transcription_order() {
    let kb = knowledge();
    let stt = ScriptedStt::texts(&[
        "Welcome to the vendor review.",
        "The shipment slipped by two weeks.",
        "Legal will check the penalty clause.",
    ]);
    let pipeline = TranscriptionPipeline::new(config(256), Arc::new(stt), Arc::clone(&kb));

    // Document ingestion racing the transcript writes.
    let docs_kb = Arc::clone(&kb);
    let ingest = std::thread::spawn(move || {
        for i in 0..20 {
            docs_kb
                .index_documents(vec![Document::new(format!("Appendix note number {}.", i), "appendix.txt")])
                .unwrap();
        }
    });

    pipeline
        .start(Box::new(MemoryDevice::from_samples(&[0.2; 768], 256)))
        .unwrap();
    pipeline.wait().unwrap();
    ingest.join().unwrap();

    let entries = kb.index().entries_from(TRANSCRIPT_SOURCE);
    let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Welcome to the vendor review.",
            "The shipment slipped by two weeks.",
            "Legal will check the penalty clause.",
        ]
    );
    assert!(entries
        .windows(2)
        .all(|w| w[0].chunk.sequence_id < w[1].chunk.sequence_id));
    assert_eq!(kb.index().len(), 23);
    assert_eq!(pipeline.transcript().full_text().lines().count(), 3);
}

#[test]
fn failed_inference_does_not_stop_the_pipeline() {
    let kb = knowledge();
    let stt = ScriptedStt::new(vec![
        Ok(Transcription::new("Budget is approved.", None)),
        Err(VoiceError::Stt("decoder overflow".to_string())),
        Ok(Transcription::new("Next meeting on Friday.", None)),
    ]);
    let pipeline = TranscriptionPipeline::new(config(100), Arc::new(stt), Arc::clone(&kb));
    pipeline
        .start(Box::new(MemoryDevice::from_samples(&[0.2; 300], 100)))
        .unwrap();
    let stats = pipeline.wait().unwrap();

    assert_eq!(stats.inference_failures, 1);
    assert_eq!(stats.segments_committed, 2);
    let texts: Vec<String> = pipeline
        .transcript()
        .segments()
        .into_iter()
        .map(|s| s.text)
        .collect();
    assert_eq!(texts, vec!["Budget is approved.", "Next meeting on Friday."]);
    assert_eq!(kb.index().entries_from(TRANSCRIPT_SOURCE).len(), 2);
}

#[test]
fn device_open_failure_is_reported_and_pipeline_stays_idle() {
    let pipeline = TranscriptionPipeline::new(
        config(1024),
        Arc::new(PlaceholderStt::new()),
        knowledge(),
    );
    let err = pipeline
        .start(Box::new(MemoryDevice::failing("no input device available")))
        .unwrap_err();

    assert!(matches!(err, ScribeError::Device(VoiceError::AudioDevice(_))));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert_eq!(pipeline.stats().frames_captured, 0);
}

#[test]
fn device_with_foreign_sample_rate_is_refused() {
    let kb = knowledge();
    let pipeline = TranscriptionPipeline::new(
        config(2048),
        Arc::new(PlaceholderStt::with_response("should not be indexed")),
        Arc::clone(&kb),
    );
    let err = pipeline
        .start(Box::new(MemoryDevice::from_samples(&[0.2; 2048], 1024).with_sample_rate(8_000)))
        .unwrap_err();

    assert!(matches!(err, ScribeError::InvalidState(ref m) if m.contains("8000 Hz")));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(kb.index().is_empty());

    pipeline
        .start(Box::new(MemoryDevice::from_samples(&[0.2; 2048], 1024)))
        .unwrap();
    assert_eq!(pipeline.wait().unwrap().segments_committed, 1);
}

#[test]
fn stop_drains_queued_frames_and_accounts_for_drops() {
    let pipeline = TranscriptionPipeline::new(
        PipelineConfig {
            queue_capacity: 4,
            backpressure: Backpressure::Drop,
            window_samples: 160,
            read_timeout: Duration::from_millis(10),
            ..PipelineConfig::default()
        },
        Arc::new(SlowStt(Duration::from_millis(5))),
        knowledge(),
    );
    pipeline
        .start(Box::new(MemoryDevice::repeating(vec![0.1; 160], Duration::from_millis(1))))
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::Capturing);

    std::thread::sleep(Duration::from_millis(200));
    let stats = pipeline.stop().unwrap();

    assert_eq!(pipeline.state(), PipelineState::Stopped);
    assert!(stats.frames_captured > 0);
    assert_eq!(
        stats.frames_captured - stats.frames_dropped,
        stats.frames_transcribed
    );
    assert_eq!(stats.windows_transcribed, stats.frames_transcribed);
}

#[test]
fn subscribers_receive_committed_segments_in_order() {
    let stt = ScriptedStt::texts(&["First point.", "Second point."]);
    let pipeline = TranscriptionPipeline::new(config(512), Arc::new(stt), knowledge());
    let mut updates = pipeline.subscribe();

    pipeline
        .start(Box::new(MemoryDevice::from_samples(&[0.2; 1024], 512)))
        .unwrap();
    pipeline.wait().unwrap();

    assert_eq!(updates.try_recv().unwrap().text, "First point.");
    let second = updates.try_recv().unwrap();
    assert_eq!(second.text, "Second point.");
    assert_eq!(second.language.as_deref(), Some("en"));
    assert!(updates.try_recv().is_err());
}

#[test]
fn wav_replay_makes_the_meeting_searchable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("standup.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..32_000 {
        writer
            .write_sample((((i as f32) * 0.03).sin() * 8000.0) as i16)
            .unwrap();
    }
    writer.finalize().unwrap();

    let kb = knowledge();
    kb.index_documents(vec![Document::new("Office plants get watered every Tuesday.", "facilities.txt")])
        .unwrap();
    let pipeline = TranscriptionPipeline::new(
        config(32_000),
        Arc::new(PlaceholderStt::with_response("The hardware budget was approved.")),
        Arc::clone(&kb),
    );
    pipeline
        .start(Box::new(WavFileDevice::new(&path, AudioConfig::default())))
        .unwrap();
    let stats = pipeline.wait().unwrap();

    assert_eq!(stats.windows_transcribed, 1);
    let results = kb.retrieve("hardware budget approved", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].source, TRANSCRIPT_SOURCE);
    assert!(results[0].content.contains("budget"));
}
