//! Append-only transcript history and the speaker label merge.
//!
//! The history is the pipeline's single output surface: ordered batches
//! arrive from the committer task and are appended behind a monotonic
//! de-duplication rule, so replayed audio (overlapping windows, retried
//! engines) never produces doubled text.
//!
//! Diarization itself is an external collaborator; the core only defines
//! the [`Diarizer`] interface and performs the max-overlap join between
//! transcript fragments and speaker segments.

use crate::defaults;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::mpsc;

/// One committed line of the transcript, in absolute stream time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySegment {
    /// Wall-clock time the segment was committed.
    pub timestamp: DateTime<Utc>,
    pub speaker_id: u32,
    pub text: String,
    /// Absolute stream time, seconds since capture start.
    pub start_sec: f64,
    pub end_sec: f64,
}

/// A diarized span in window-local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub start_sec: f64,
    pub end_sec: f64,
    pub speaker_id: u32,
}

/// External speaker diarization over a window WAV.
///
/// Implementations run out of process (embedding + clustering); the core
/// only consumes their segment lists.
pub trait Diarizer: Send + Sync {
    fn diarize(&self, wav: &Path) -> Result<Vec<SpeakerSegment>>;
}

/// Speaker id used when no diarizer is configured or nothing overlaps.
pub const DEFAULT_SPEAKER: u32 = 1;

/// Picks the speaker whose segments overlap `[start_sec, end_sec]` the
/// most, summed across segments. Falls back to [`DEFAULT_SPEAKER`].
pub fn assign_speaker(start_sec: f64, end_sec: f64, speakers: &[SpeakerSegment]) -> u32 {
    let mut overlap_by_speaker: HashMap<u32, f64> = HashMap::new();
    for segment in speakers {
        let overlap = (end_sec.min(segment.end_sec) - start_sec.max(segment.start_sec)).max(0.0);
        if overlap > 0.0 {
            *overlap_by_speaker.entry(segment.speaker_id).or_default() += overlap;
        }
    }

    overlap_by_speaker
        .into_iter()
        .max_by(|(id_a, ov_a), (id_b, ov_b)| {
            // Largest overlap wins; ties break toward the smaller id so
            // the choice is deterministic.
            ov_a.partial_cmp(ov_b)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(id_b.cmp(id_a))
        })
        .map(|(id, _)| id)
        .unwrap_or(DEFAULT_SPEAKER)
}

/// Append-only transcript with monotonic de-duplication.
pub struct TranscriptHistory {
    segments: Vec<HistorySegment>,
    last_committed_end: f64,
    epsilon: f64,
    subscribers: Vec<mpsc::UnboundedSender<Vec<HistorySegment>>>,
}

impl TranscriptHistory {
    pub fn new() -> Self {
        Self::with_epsilon(defaults::DEDUP_EPSILON_SEC)
    }

    pub fn with_epsilon(epsilon: f64) -> Self {
        Self {
            segments: Vec::new(),
            last_committed_end: f64::NEG_INFINITY,
            epsilon,
            subscribers: Vec::new(),
        }
    }

    /// Appends a batch, dropping segments that do not advance the
    /// committed end by more than the epsilon. Returns how many survived.
    pub fn append(&mut self, batch: Vec<HistorySegment>) -> usize {
        let mut appended = Vec::new();
        for segment in batch {
            if segment.end_sec > self.last_committed_end + self.epsilon {
                self.last_committed_end = segment.end_sec;
                appended.push(segment);
            }
        }
        if appended.is_empty() {
            return 0;
        }

        let count = appended.len();
        self.segments.extend(appended.iter().cloned());
        self.subscribers
            .retain(|tx| tx.send(appended.clone()).is_ok());
        count
    }

    /// All committed segments, oldest first.
    pub fn segments(&self) -> &[HistorySegment] {
        &self.segments
    }

    /// Concatenated text of the whole history.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Stream time up to which text has been committed.
    pub fn last_committed_end(&self) -> f64 {
        self.last_committed_end
    }

    /// Subscribe to appended batches. Dead receivers are pruned on the
    /// next append.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Vec<HistorySegment>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }
}

impl Default for TranscriptHistory {
    fn default() -> Self {
        Self::new()
    }
}
