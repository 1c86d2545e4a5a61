//! Huddle CLI: index meeting documents, transcribe the meeting live, ask questions.
//!
//! Usage:
//!   cargo run -p huddle-scribe -- --docs agenda.md,contract.txt --record --duration 60 --ask "What is the penalty?"
//!
//! Settings come from config/huddle.toml (or HUDDLE_CONFIG) and HUDDLE_* env vars.

use anyhow::Context;
use huddle_core::{Document, HuddleConfig, KnowledgeBase};
use huddle_scribe::{create_stt, PipelineConfig, TranscriptionPipeline};
use huddle_voice::{list_input_devices, AudioConfig, AudioDevice, CpalDevice, WavFileDevice};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Default)]
struct CliArgs {
    docs: Vec<PathBuf>,
    record: bool,
    duration_secs: u64,
    wav: Option<PathBuf>,
    device: Option<String>,
    ask: Option<String>,
    k: Option<usize>,
    list_devices: bool,
}

impl CliArgs {
    fn parse() -> Self {
        let mut cli = CliArgs {
            duration_secs: 30,
            ..Default::default()
        };
        let mut args = std::env::args().skip(1);
        while let Some(a) = args.next() {
            match a.as_str() {
                "--docs" => {
                    if let Some(list) = args.next() {
                        cli.docs.extend(
                            list.split(',')
                                .map(str::trim)
                                .filter(|p| !p.is_empty())
                                .map(PathBuf::from),
                        );
                    }
                }
                "--record" => cli.record = true,
                "--duration" => {
                    if let Some(d) = args.next() {
                        cli.duration_secs = d.parse().unwrap_or(30);
                    }
                }
                "--wav" => cli.wav = args.next().map(PathBuf::from),
                "--device" => cli.device = args.next(),
                "--ask" => cli.ask = args.next(),
                "--k" => cli.k = args.next().and_then(|k| k.parse().ok()),
                "--list-devices" => cli.list_devices = true,
                other => warn!("Ignoring unknown argument {}", other),
            }
        }
        cli
    }

    fn is_empty(&self) -> bool {
        self.docs.is_empty()
            && !self.record
            && self.wav.is_none()
            && self.ask.is_none()
            && !self.list_devices
    }
}

fn print_usage() {
    eprintln!("Huddle: meeting copilot");
    eprintln!("  --docs a.txt,b.md   Index documents (.txt / .md) before the meeting");
    eprintln!("  --record            Transcribe the microphone (default 30s, or --duration N)");
    eprintln!("  --duration N        Recording length in seconds");
    eprintln!("  --device \"Name\"     Input device (default: system default)");
    eprintln!("  --wav file.wav      Transcribe a recording instead of the microphone");
    eprintln!("  --ask \"question\"    Print the top-k passages for a question");
    eprintln!("  --k N               Number of passages (default retrieval.top_k)");
    eprintln!("  --list-devices      List audio input devices");
    eprintln!();
    eprintln!("Config: config/huddle.toml or HUDDLE_CONFIG; overrides via HUDDLE_<SECTION>__<KEY>.");
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = CliArgs::parse();
    if cli.is_empty() {
        print_usage();
        return Ok(());
    }

    if cli.list_devices {
        for name in list_input_devices()? {
            println!("{}", name);
        }
    }

    let config = HuddleConfig::load().context("loading configuration")?;
    let knowledge = Arc::new(KnowledgeBase::from_config(&config)?);

    if !cli.docs.is_empty() {
        let documents: Vec<Document> = cli.docs.iter().filter_map(|p| read_document(p)).collect();
        let report = knowledge.index_documents(documents)?;
        info!(
            documents = report.documents,
            chunks = report.chunks,
            inserted = report.inserted(),
            skipped = report.skipped(),
            "Documents indexed"
        );
    }

    if cli.record || cli.wav.is_some() {
        let settings = &config.transcription;
        let audio = AudioConfig {
            sample_rate: settings.sample_rate,
            channels: 1,
            frame_size: settings.frame_size,
        };
        let device: Box<dyn AudioDevice> = match &cli.wav {
            Some(path) => Box::new(WavFileDevice::new(path, audio)),
            None => {
                let mic = CpalDevice::new(audio);
                match &cli.device {
                    Some(name) => Box::new(mic.with_device_name(name.clone())),
                    None => Box::new(mic),
                }
            }
        };

        let stt = create_stt(settings)?;
        let pipeline = TranscriptionPipeline::new(
            PipelineConfig::from_settings(settings),
            stt,
            Arc::clone(&knowledge),
        );
        pipeline.start(device)?;

        let stats = if cli.wav.is_some() {
            pipeline.wait()?
        } else {
            info!("Recording for {}s...", cli.duration_secs);
            thread::sleep(Duration::from_secs(cli.duration_secs));
            pipeline.stop()?
        };

        let transcript = pipeline.transcript();
        println!("## Transcript ({} segments)\n", transcript.len());
        for segment in transcript.segments() {
            println!("- [{:.0}s] {}", segment.offset_secs, segment.text);
        }
        println!("\n## Pipeline\n\n{}", serde_json::to_string_pretty(&stats)?);
    }

    if let Some(question) = &cli.ask {
        let k = cli.k.unwrap_or(config.retrieval.top_k);
        let hits = knowledge.retriever().retrieve_scored(question, k)?;
        println!("\n## Results for \"{}\"\n", question);
        if hits.is_empty() {
            println!("(no indexed content)");
        }
        for (rank, hit) in hits.iter().enumerate() {
            println!("{}. [{}] ({:.3}) {}", rank + 1, hit.source, hit.score, hit.text);
        }
    }

    Ok(())
}

/// Read a plain-text document; unsupported or unreadable files are skipped with a warning.
fn read_document(path: &Path) -> Option<Document> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if !matches!(ext.as_deref(), Some("txt") | Some("md")) {
        warn!("Skipping {}: only .txt and .md are supported", path.display());
        return None;
    }
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match std::fs::read_to_string(path) {
        Ok(text) => Some(Document::new(text, source)),
        Err(e) => {
            warn!("Skipping {}: {}", path.display(), e);
            None
        }
    }
}
