//! Voice Activity Detection (VAD).
//!
//! Edge-triggered RMS detector on the capture stream clock. Downstream
//! consumers see one `SpeechDetected` per phrase onset and one
//! `SilenceDetected` once silence has held for the configured duration,
//! not a per-frame classification.
//!
//! The silence hold is measured against frame timestamps rather than a
//! wall clock: the capture driver delivers silence frames continuously,
//! so the deadline check on the next frame is equivalent to a one-shot
//! timer and keeps tests fully deterministic.

use crate::defaults;

/// Configuration for voice activity detection.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub threshold: f32,
    /// Seconds of continuous silence before `SilenceDetected` fires.
    pub hold_sec: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::SILENCE_THRESHOLD_RMS,
            hold_sec: defaults::SILENCE_HOLD_SEC,
        }
    }
}

/// Events emitted by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// First frame above the threshold after silence.
    SpeechDetected,
    /// Silence has held for at least the configured duration.
    SilenceDetected,
}

/// Edge-triggered voice activity detector.
pub struct Vad {
    config: VadConfig,
    in_silence: bool,
    /// Stream time of the falling edge, while the hold is pending.
    silence_since: Option<f64>,
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            in_silence: true,
            silence_since: None,
        }
    }

    /// Processes one whole frame and returns the edge it produced, if any.
    ///
    /// `t` is the stream time at the end of the frame.
    pub fn process(&mut self, samples: &[i16], t: f64) -> Option<VadEvent> {
        self.advance(rms(samples), t)
    }

    /// Byte-level variant for the capture path, which receives raw
    /// little-endian PCM.
    pub fn process_bytes(&mut self, bytes: &[u8], t: f64) -> Option<VadEvent> {
        self.advance(rms_bytes(bytes), t)
    }

    fn advance(&mut self, level: f32, t: f64) -> Option<VadEvent> {
        if level > self.config.threshold {
            if self.in_silence {
                self.in_silence = false;
                self.silence_since = None;
                return Some(VadEvent::SpeechDetected);
            }
            None
        } else {
            if !self.in_silence {
                self.in_silence = true;
                self.silence_since = Some(t);
                return None;
            }
            if let Some(since) = self.silence_since
                && t - since >= self.config.hold_sec
            {
                // One-shot: the hold fires once per falling edge.
                self.silence_since = None;
                return Some(VadEvent::SilenceDetected);
            }
            None
        }
    }

    /// Returns true while no speech is being observed.
    pub fn in_silence(&self) -> bool {
        self.in_silence
    }

    /// Returns to the initial state: silent, no pending hold.
    ///
    /// Used on manual resume so ongoing speech re-triggers a start edge.
    pub fn reset(&mut self) {
        self.in_silence = true;
        self.silence_since = None;
    }
}

/// Root-mean-square level of 16-bit samples, normalized to [0, 1].
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let s = sample as f64;
            s * s
        })
        .sum();

    ((sum_squares / samples.len() as f64).sqrt() / 32768.0) as f32
}

/// RMS over little-endian 16-bit PCM bytes. Odd trailing bytes are ignored.
pub fn rms_bytes(bytes: &[u8]) -> f32 {
    if bytes.len() < 2 {
        return 0.0;
    }

    let sum_squares: f64 = bytes
        .chunks_exact(2)
        .map(|pair| {
            let s = i16::from_le_bytes([pair[0], pair[1]]) as f64;
            s * s
        })
        .sum();

    ((sum_squares / (bytes.len() / 2) as f64).sqrt() / 32768.0) as f32
}
