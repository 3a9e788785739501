//! The engine trait and its test double.

use crate::audio::wav::read_wav_samples;
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, StreamscribeError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One transcribed span in window-local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Seconds from the start of the window.
    pub start_sec: f64,
    /// Seconds from the start of the window.
    pub end_sec: f64,
    pub text: String,
}

/// A long-lived transcription engine.
///
/// Engines are strictly serial per instance: the runner pool guarantees
/// one in-flight `transcribe` call at a time, so implementations need no
/// internal concurrency handling.
pub trait SpeechEngine: Send + Sync {
    /// Prepares the engine. Called once before the first window and again
    /// after a restart; must be cheap when already warm.
    fn warm_up(&self) -> Result<()>;

    /// Transcribes one window WAV into window-local fragments.
    ///
    /// The file stays owned by the caller; engines must not delete it.
    fn transcribe(&self, wav: &Path) -> Result<Vec<TranscriptFragment>>;

    /// Tears down engine state after a failure so the next `warm_up`
    /// starts fresh. Default is a no-op for stateless engines.
    fn restart(&self) {}

    /// Name for logging.
    fn name(&self) -> &str;
}

/// Allow sharing a single engine instance behind an `Arc`.
impl<T: SpeechEngine> SpeechEngine for Arc<T> {
    fn warm_up(&self) -> Result<()> {
        (**self).warm_up()
    }

    fn transcribe(&self, wav: &Path) -> Result<Vec<TranscriptFragment>> {
        (**self).transcribe(wav)
    }

    fn restart(&self) {
        (**self).restart()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Scripted outcome for one mock call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// One fragment spanning the whole window with this text.
    Text(String),
    /// Explicit fragments.
    Fragments(Vec<TranscriptFragment>),
    /// Transcription failure.
    Fail,
}

#[derive(Debug, Clone)]
struct MockCall {
    delay: Duration,
    outcome: MockOutcome,
}

/// Mock engine for tests.
///
/// Returns a configurable default response; individual calls can be
/// scripted (in order) with `push_call` for delays, custom fragments or
/// failures.
pub struct MockEngine {
    name: String,
    default_call: Mutex<MockCall>,
    script: Mutex<VecDeque<MockCall>>,
    warm_up_fails: bool,
    transcribe_calls: AtomicUsize,
    warm_up_calls: AtomicUsize,
    restarts: AtomicUsize,
}

impl MockEngine {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_call: Mutex::new(MockCall {
                delay: Duration::ZERO,
                outcome: MockOutcome::Text("mock transcription".to_string()),
            }),
            script: Mutex::new(VecDeque::new()),
            warm_up_fails: false,
            transcribe_calls: AtomicUsize::new(0),
            warm_up_calls: AtomicUsize::new(0),
            restarts: AtomicUsize::new(0),
        }
    }

    /// Default response text for unscripted calls.
    pub fn with_text(self, text: &str) -> Self {
        self.default_call.lock().unwrap().outcome = MockOutcome::Text(text.to_string());
        self
    }

    /// Default delay applied before every unscripted response.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.default_call.lock().unwrap().delay = delay;
        self
    }

    /// Fail every unscripted call.
    pub fn with_failure(self) -> Self {
        self.default_call.lock().unwrap().outcome = MockOutcome::Fail;
        self
    }

    /// Fail warm-up.
    pub fn with_warm_up_failure(mut self) -> Self {
        self.warm_up_fails = true;
        self
    }

    /// Scripts the next call (FIFO across calls).
    pub fn push_call(&self, delay: Duration, outcome: MockOutcome) {
        self.script.lock().unwrap().push_back(MockCall { delay, outcome });
    }

    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    pub fn warm_up_calls(&self) -> usize {
        self.warm_up_calls.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for MockEngine {
    fn warm_up(&self) -> Result<()> {
        self.warm_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.warm_up_fails {
            Err(StreamscribeError::Engine {
                message: "mock warm-up failure".to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn transcribe(&self, wav: &Path) -> Result<Vec<TranscriptFragment>> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);

        let call = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_call.lock().unwrap().clone());

        if !call.delay.is_zero() {
            std::thread::sleep(call.delay);
        }

        match call.outcome {
            MockOutcome::Text(text) => {
                let samples = read_wav_samples(wav)?;
                let duration = samples.len() as f64 / SAMPLE_RATE as f64;
                Ok(vec![TranscriptFragment {
                    start_sec: 0.0,
                    end_sec: duration,
                    text,
                }])
            }
            MockOutcome::Fragments(fragments) => {
                // Still touch the file so ownership bugs surface in tests.
                read_wav_samples(wav)?;
                Ok(fragments)
            }
            MockOutcome::Fail => Err(StreamscribeError::Engine {
                message: "mock transcription failure".to_string(),
            }),
        }
    }

    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}
