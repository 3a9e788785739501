//! Audio primitives: RMS voice activity detection, the time-indexed
//! ring buffer, and WAV emission.

pub mod ring;
pub mod vad;
pub mod wav;

pub use ring::RingBuffer;
pub use vad::{Vad, VadConfig, VadEvent};
