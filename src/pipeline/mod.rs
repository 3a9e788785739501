//! The audio-to-ordered-transcript pipeline.
//!
//! ```text
//! ┌─────────┐   ┌─────┐   ┌────────────┐   ┌────────┐   ┌─────────────┐
//! │ capture │──▶│ VAD │──▶│   window   │──▶│ intake │──▶│ dispatcher  │
//! │  frames │   └─────┘   │   buffer   │   │ (≤ Qᵢ) │   │ + runners   │
//! └─────────┘      │      └────────────┘   └────────┘   └──────┬──────┘
//!      │           ▼            ▲                              ▼
//!      │      ┌────────┐       ring            ┌───────────┐  results
//!      └─────▶│ pause  │                       │  reorder  │◀────┘
//!             └────────┘                       │  buffer   │──▶ history
//!                                              └───────────┘
//! ```

pub mod orchestrator;
pub mod reorder;
pub mod runner;
pub mod stats;
pub mod window;

pub use orchestrator::AudioPipeline;
pub use reorder::ReorderBuffer;
pub use runner::{RunnerPool, RunnerPoolConfig, WindowTask, WorkerResult};
pub use stats::{QueueStats, RunnerStats, StatsHub};
pub use window::{WindowBuffer, WindowBufferConfig, WindowReady};
