//! streamscribe - real-time system-audio transcription core.
//!
//! Captured PCM flows through voice activity detection into an adaptive
//! window buffer, which cuts speech-bounded WAV windows. Windows fan out
//! to parallel long-lived transcription engines; a reorder buffer puts
//! the results back into strict capture order before they land in the
//! append-only transcript history.
//!
//! Platform capture, hotkeys, text injection and the concrete engines
//! live outside this crate; see [`stt::SpeechEngine`] for the engine
//! contract and [`pipeline::AudioPipeline::push_frame`] for the frame
//! entry point.

pub mod audio;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pause;
pub mod pipeline;
pub mod stt;
pub mod transcript;

pub use config::Config;
pub use error::{Result, StreamscribeError};
pub use pause::{PauseController, PauseState};
pub use pipeline::{AudioPipeline, QueueStats};
pub use stt::{MockEngine, ProcessEngine, SpeechEngine, TranscriptFragment};
pub use transcript::{Diarizer, HistorySegment, SpeakerSegment, TranscriptHistory};
