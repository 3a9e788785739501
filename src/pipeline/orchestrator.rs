//! Audio pipeline orchestrator.
//!
//! Wires the components into the full flow:
//!
//! ```text
//! capture ─► VAD ─► window buffer ─► intake ─► dispatcher ─► runners
//!    │         │         ▲                                      │
//!    │         └─ pause ──┘ (speech-resume / auto-silence)       ▼
//!    └────────────► ring                     committer ─► reorder ─► history
//! ```
//!
//! The capture path (`push_frame`) is synchronous and serialized under
//! one lock; everything downstream of the intake runs on tokio tasks.
//! Sequence numbers are assigned under the intake lock, so their order
//! matches window emission order exactly.

use crate::audio::vad::{Vad, VadConfig, VadEvent};
use crate::config::Config;
use crate::defaults::BYTES_PER_SEC;
use crate::error::{Result, StreamscribeError};
use crate::pause::{PauseController, PauseState};
use crate::pipeline::reorder::ReorderBuffer;
use crate::pipeline::runner::{RunnerPool, RunnerPoolConfig, WorkerResult};
use crate::pipeline::stats::{QueueStats, StatsHub};
use crate::pipeline::window::{WindowBuffer, WindowBufferConfig};
use crate::stt::SpeechEngine;
use crate::transcript::{
    DEFAULT_SPEAKER, Diarizer, HistorySegment, TranscriptHistory, assign_speaker,
};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// VAD and window buffer, serialized under one lock. The capture thread
/// is the only writer.
struct CaptureState {
    vad: Vad,
    window: WindowBuffer,
}

/// The assembled pipeline. Create with [`AudioPipeline::start`] inside a
/// tokio runtime; feed it frames from the capture callback; read the
/// transcript through the history accessors.
pub struct AudioPipeline {
    pause: PauseController,
    capture: Arc<Mutex<CaptureState>>,
    pool: Arc<RunnerPool>,
    stats: Arc<StatsHub>,
    history: Arc<Mutex<TranscriptHistory>>,
    /// Set when a manual resume must re-arm the VAD and raise the window
    /// start barrier on the next frame.
    manual_resume_pending: AtomicBool,
    /// Set by `shutdown`; frames arriving afterwards are rejected.
    closed: AtomicBool,
    pool_handles: Mutex<Vec<JoinHandle<()>>>,
    committer_handle: Mutex<Option<JoinHandle<()>>>,
    heartbeat_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPipeline {
    /// Starts the pipeline with one runner per engine.
    pub fn start(config: Config, engines: Vec<Arc<dyn SpeechEngine>>) -> Result<Self> {
        Self::start_with_diarizer(config, engines, None)
    }

    /// Starts the pipeline with `queue.worker_count` engines built by the
    /// factory (one call per runner index).
    pub fn start_with_factory<F>(config: Config, make_engine: F) -> Result<Self>
    where
        F: Fn(usize) -> Arc<dyn SpeechEngine>,
    {
        let engines = (0..config.queue.worker_count).map(make_engine).collect();
        Self::start_with_diarizer(config, engines, None)
    }

    /// Starts the pipeline with speaker diarization enabled.
    pub fn start_with_diarizer(
        config: Config,
        engines: Vec<Arc<dyn SpeechEngine>>,
        diarizer: Option<Arc<dyn Diarizer>>,
    ) -> Result<Self> {
        config.validate()?;
        if engines.is_empty() {
            return Err(StreamscribeError::ConfigInvalidValue {
                key: "queue.worker_count".to_string(),
                message: "no engines supplied".to_string(),
            });
        }

        let window_config = WindowBufferConfig::from_config(&config);
        std::fs::create_dir_all(&window_config.wav_dir)?;

        let stats = Arc::new(StatsHub::new(config.queue.intake_capacity, engines.len()));
        let diarization_enabled = diarizer.is_some();
        let (pool, results_rx) = RunnerPool::new(
            engines,
            diarizer,
            RunnerPoolConfig::from_config(&config),
            stats.clone(),
        );
        let pool_handles = pool.spawn();

        let capture = Arc::new(Mutex::new(CaptureState {
            vad: Vad::new(VadConfig {
                threshold: config.vad.silence_threshold_rms,
                hold_sec: config.vad.silence_hold_sec,
            }),
            window: WindowBuffer::new(window_config),
        }));

        let history = Arc::new(Mutex::new(TranscriptHistory::new()));
        let committer = tokio::spawn(commit_loop(
            results_rx,
            history.clone(),
            stats.clone(),
            diarization_enabled,
        ));

        let heartbeat = tokio::spawn(heartbeat_loop(
            capture.clone(),
            pool.clone(),
            config.heartbeat_period_sec(),
        ));

        info!(
            workers = stats.snapshot().per_runner.len(),
            window_sec = config.window.window_size_sec,
            "pipeline started"
        );

        Ok(Self {
            pause: PauseController::new(),
            capture,
            pool,
            stats,
            history,
            manual_resume_pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pool_handles: Mutex::new(pool_handles),
            committer_handle: Mutex::new(Some(committer)),
            heartbeat_handle: Mutex::new(Some(heartbeat)),
        })
    }

    /// Feeds one capture frame: little-endian 16-bit mono PCM at 16 kHz,
    /// with `stream_time` the monotonic capture clock at the frame's end.
    ///
    /// Called from the capture thread; never blocks beyond queue pushes.
    pub fn push_frame(&self, bytes: &[u8], stream_time: f64) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamscribeError::PipelineClosed);
        }
        if bytes.len() % 2 != 0 {
            return Err(StreamscribeError::CaptureFormatMismatch {
                expected: "16-bit PCM (even byte count)".to_string(),
                actual: format!("odd byte count {}", bytes.len()),
            });
        }

        let frame_sec = bytes.len() as f64 / BYTES_PER_SEC as f64;
        let mut capture = self.capture.lock().unwrap();

        if self.manual_resume_pending.swap(false, Ordering::SeqCst) {
            // Re-arm the speech edge so ongoing speech restarts a window,
            // and fence the window start at the resume boundary.
            capture.vad.reset();
            capture
                .window
                .set_paused(false, Some(stream_time - frame_sec));
        }

        let event = capture.vad.process_bytes(bytes, stream_time);

        // Speech lifts an automatic pause before the window buffer sees
        // the frame, so the very frame that resumed also starts a window.
        if event == Some(VadEvent::SpeechDetected) {
            self.pause.apply_speech_resume();
        }

        capture
            .window
            .set_paused(self.pause.state().is_paused(), None);
        let emitted = capture.window.push_frame(bytes, stream_time, event);

        // Auto-silence engages after the window buffer had its chance to
        // emit the early-terminated window for this same silence.
        if event == Some(VadEvent::SilenceDetected) {
            self.pause.apply_auto_silence();
            capture.window.set_paused(true, None);
        }
        drop(capture);

        for window in emitted {
            let sequence = self.pool.submit(window.wav_path, window.start_sec);
            debug!(sequence, start = window.start_sec, "window submitted");
        }
        Ok(())
    }

    /// Toggles the user-facing pause.
    pub fn set_manual_pause(&self, on: bool) {
        if let Some(transition) = self.pause.set_manual(on) {
            info!(?transition, "manual pause toggled");
            if transition.to == PauseState::None {
                self.manual_resume_pending.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Current pause state.
    pub fn pause_state(&self) -> PauseState {
        self.pause.state()
    }

    /// Subscribe to pause transitions.
    pub fn subscribe_pause(&self) -> watch::Receiver<PauseState> {
        self.pause.subscribe()
    }

    /// Latest queue statistics snapshot.
    pub fn stats(&self) -> QueueStats {
        self.stats.snapshot()
    }

    /// Subscribe to QueueStatsChanged events.
    pub fn subscribe_stats(&self) -> watch::Receiver<QueueStats> {
        self.stats.subscribe()
    }

    /// Committed history segments, oldest first.
    pub fn transcript_segments(&self) -> Vec<HistorySegment> {
        self.history.lock().unwrap().segments().to_vec()
    }

    /// Concatenated committed text.
    pub fn transcript_text(&self) -> String {
        self.history.lock().unwrap().full_text()
    }

    /// Subscribe to appended history batches.
    pub fn subscribe_transcript(&self) -> mpsc::UnboundedReceiver<Vec<HistorySegment>> {
        self.history.lock().unwrap().subscribe()
    }

    /// Stops the pipeline: drains queued windows through the workers,
    /// flushes the committer, and tears the tasks down. Frames pushed
    /// after this return [`StreamscribeError::PipelineClosed`].
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.heartbeat_handle.lock().unwrap().take().map(|h| h.abort());

        self.pool.shutdown();
        let handles: Vec<_> = self.pool_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.pool.close_results();
        let committer = self.committer_handle.lock().unwrap().take();
        if let Some(committer) = committer {
            let _ = committer.await;
        }
        info!("pipeline stopped");
    }
}

/// Dedicated committer: joins speaker labels, restores capture order,
/// and appends to the history. Worker completion contexts never touch
/// the transcript sink directly.
async fn commit_loop(
    mut results_rx: mpsc::UnboundedReceiver<WorkerResult>,
    history: Arc<Mutex<TranscriptHistory>>,
    stats: Arc<StatsHub>,
    diarization_enabled: bool,
) {
    let mut reorder: ReorderBuffer<Vec<HistorySegment>> = ReorderBuffer::new();

    while let Some(result) = results_rx.recv().await {
        let segments: Vec<HistorySegment> = result
            .fragments
            .iter()
            .map(|fragment| {
                let speaker_id = if diarization_enabled {
                    assign_speaker(fragment.start_sec, fragment.end_sec, &result.speakers)
                } else {
                    DEFAULT_SPEAKER
                };
                HistorySegment {
                    timestamp: Utc::now(),
                    speaker_id,
                    text: fragment.text.clone(),
                    start_sec: result.start_sec + fragment.start_sec,
                    end_sec: result.start_sec + fragment.end_sec,
                }
            })
            .collect();

        let released = reorder.insert(result.sequence, segments);
        if !released.is_empty() {
            let mut history = history.lock().unwrap();
            for (sequence, segments) in released {
                debug!(sequence, count = segments.len(), "committing result");
                if !segments.is_empty() {
                    history.append(segments);
                }
            }
        }
        stats.update(|s| s.reorder_count = reorder.pending_len());
    }
}

/// Coarse heartbeat that force-emits full windows while speech runs on.
async fn heartbeat_loop(
    capture: Arc<Mutex<CaptureState>>,
    pool: Arc<RunnerPool>,
    period_sec: f64,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(period_sec));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it.
    interval.tick().await;

    loop {
        interval.tick().await;
        let window = capture.lock().unwrap().window.heartbeat();
        if let Some(window) = window {
            let sequence = pool.submit(window.wav_path, window.start_sec);
            debug!(sequence, "heartbeat-forced window");
        }
    }
}
