//! Speech-to-text engine interface.
//!
//! The core never runs recognition itself: it hands window WAVs to
//! long-lived engines behind the [`SpeechEngine`] trait and consumes
//! window-local transcript fragments. Concrete engines are either
//! in-process recognizers or the subprocess bridge in [`process`].

pub mod engine;
pub mod process;

pub use engine::{MockEngine, SpeechEngine, TranscriptFragment};
pub use process::{ProcessEngine, ProcessEngineConfig};
