//! Default configuration constants for streamscribe.
//!
//! Shared across config defaults and component constructors so the
//! numbers live in exactly one place.

/// Audio sample rate in Hz. The core only accepts 16 kHz mono PCM;
/// capture layers resample before frames enter the pipeline.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per 16-bit mono sample.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes of audio per second at the fixed format (16 kHz * 2 bytes).
pub const BYTES_PER_SEC: usize = SAMPLE_RATE as usize * BYTES_PER_SAMPLE;

/// RMS threshold separating speech from silence (0.0 to 1.0).
///
/// Shared by the VAD and the word-boundary scan so both agree on what
/// counts as a pause.
pub const SILENCE_THRESHOLD_RMS: f32 = 0.007;

/// Seconds of continuous silence before the VAD reports a phrase end.
pub const SILENCE_HOLD_SEC: f64 = 1.0;

/// Nominal window length in seconds.
pub const WINDOW_SIZE_SEC: f64 = 3.0;

/// Heartbeat period in seconds; 0 means "use the window size".
pub const STEP_SEC: f64 = 0.0;

/// Seconds of audio included before a detected speech onset.
pub const PRE_ROLL_SEC: f64 = 0.4;

/// Maximum extra seconds past the nominal window size while searching
/// for an inter-word pause.
pub const MAX_EXTENSION_SEC: f64 = 0.5;

/// Cap on the extension expressed as a ratio of the window size.
pub const MAX_EXTENSION_RATIO: f64 = 1.5;

/// Length of the trailing region scanned for a word boundary, seconds.
pub const BOUNDARY_SCAN_SEC: f64 = 0.3;

/// Chunk size of the word-boundary scan, seconds.
pub const BOUNDARY_CHUNK_SEC: f64 = 0.01;

/// Contiguous silence required to accept an inter-word pause, seconds.
pub const WORD_PAUSE_SEC: f64 = 0.05;

/// Minimum window duration before an early silence termination, seconds.
pub const MIN_EARLY_EMIT_SEC: f64 = 0.5;

/// Bounded intake queue capacity; oldest windows are dropped on overflow.
pub const INTAKE_CAPACITY: usize = 10;

/// Number of parallel transcription runners.
pub const WORKER_COUNT: usize = 2;

/// Seconds an engine gets to signal readiness during warm-up.
pub const WARM_UP_TIMEOUT_SEC: f64 = 60.0;

/// Seconds a single transcribe call may take before the worker gives up.
pub const TRANSCRIBE_TIMEOUT_SEC: f64 = 30.0;

/// Minimum gap between committed history segments, seconds. Results whose
/// end lies within this of the last committed end are treated as replays.
pub const DEDUP_EPSILON_SEC: f64 = 0.05;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_rate_matches_format() {
        assert_eq!(BYTES_PER_SEC, 32_000);
    }

    #[test]
    fn boundary_scan_is_a_whole_number_of_chunks() {
        let chunks = BOUNDARY_SCAN_SEC / BOUNDARY_CHUNK_SEC;
        assert!((chunks - chunks.round()).abs() < 1e-9);
    }
}
