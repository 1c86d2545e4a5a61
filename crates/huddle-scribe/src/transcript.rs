//! Transcript segments and the in-memory, ordered transcript log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

/// Recognized text for one audio window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub language: Option<String>,
    /// Capture time of the first frame in the window.
    pub timestamp: DateTime<Utc>,
    /// Seconds of audio consumed before this window, from the start of the session.
    pub offset_secs: f64,
}

/// Append-only log of committed segments, in transcription order.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    segments: Mutex<Vec<TranscriptSegment>>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment; returns its position in the log.
    pub fn append(&self, segment: TranscriptSegment) -> usize {
        let mut segments = self.lock();
        segments.push(segment);
        segments.len() - 1
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn segments(&self) -> Vec<TranscriptSegment> {
        self.lock().clone()
    }

    /// All segment texts, one per line.
    pub fn full_text(&self) -> String {
        self.lock()
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    // Segments are only ever pushed whole, so a poisoned guard still holds a consistent log.
    fn lock(&self) -> MutexGuard<'_, Vec<TranscriptSegment>> {
        self.segments.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, offset_secs: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            language: Some("en".to_string()),
            timestamp: Utc::now(),
            offset_secs,
        }
    }

    #[test]
    fn log_keeps_append_order() {
        let log = TranscriptLog::new();
        assert!(log.is_empty());
        assert_eq!(log.append(segment("Good morning.", 0.0)), 0);
        assert_eq!(log.append(segment("Let's review the budget.", 5.0)), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.full_text(), "Good morning.\nLet's review the budget.");
        assert_eq!(log.segments()[1].offset_secs, 5.0);
    }

    #[test]
    fn segment_serializes_with_timestamp() {
        let json = serde_json::to_value(segment("hi", 1.5)).unwrap();
        assert_eq!(json["text"], "hi");
        assert_eq!(json["offset_secs"], 1.5);
        assert!(json["timestamp"].is_string());
    }
}
