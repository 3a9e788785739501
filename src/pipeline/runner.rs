//! Runner pool: bounded intake, runner selection, dispatcher and the
//! per-runner worker tasks.
//!
//! Windows flow intake → runner queue → engine → result channel. The
//! intake is bounded with oldest-drop overflow (the dropped window's WAV
//! is unlinked); per-runner queues are FIFO and observable. One
//! single-flight dispatcher drains the intake; one single-flight worker
//! task per runner pops its queue and drives the engine, so each engine
//! instance sees strictly serial calls.
//!
//! Lock order is intake → runner queue; neither is ever held across an
//! await or while taking the other.

use crate::config::Config;
use crate::defaults;
use crate::error::StreamscribeError;
use crate::pipeline::stats::StatsHub;
use crate::stt::{SpeechEngine, TranscriptFragment};
use crate::transcript::{Diarizer, SpeakerSegment};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A window queued for transcription. Owns its WAV file; ownership moves
/// with the task and the worker deletes the file after use.
#[derive(Debug)]
pub struct WindowTask {
    pub wav_path: PathBuf,
    /// Absolute stream time of the window's first sample.
    pub start_sec: f64,
    /// Assigned in submission order, starting at 0.
    pub sequence: u64,
}

/// What a worker hands back for one window.
#[derive(Debug)]
pub struct WorkerResult {
    pub sequence: u64,
    pub start_sec: f64,
    /// Window-local fragments; empty on any engine failure.
    pub fragments: Vec<TranscriptFragment>,
    /// Window-local speaker segments when diarization is enabled.
    pub speakers: Vec<SpeakerSegment>,
}

/// Configuration for the pool.
#[derive(Debug, Clone)]
pub struct RunnerPoolConfig {
    pub intake_capacity: usize,
    pub warm_up_timeout: Duration,
    pub transcribe_timeout: Duration,
}

impl Default for RunnerPoolConfig {
    fn default() -> Self {
        Self {
            intake_capacity: defaults::INTAKE_CAPACITY,
            warm_up_timeout: Duration::from_secs_f64(defaults::WARM_UP_TIMEOUT_SEC),
            transcribe_timeout: Duration::from_secs_f64(defaults::TRANSCRIBE_TIMEOUT_SEC),
        }
    }
}

impl RunnerPoolConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            intake_capacity: config.queue.intake_capacity,
            warm_up_timeout: Duration::from_secs_f64(config.engine.warm_up_timeout_sec),
            transcribe_timeout: Duration::from_secs_f64(config.engine.transcribe_timeout_sec),
        }
    }
}

/// One runner: an engine plus its FIFO queue and status flags.
struct RunnerState {
    id: usize,
    engine: Arc<dyn SpeechEngine>,
    queue: Mutex<VecDeque<WindowTask>>,
    notify: Notify,
    processing: AtomicBool,
    available: AtomicBool,
    needs_warm_up: AtomicBool,
}

struct Intake {
    queue: VecDeque<WindowTask>,
    next_sequence: u64,
}

/// Occupancy view used by the selection rule.
#[derive(Debug, Clone, Copy)]
struct RunnerOccupancy {
    available: bool,
    processing: bool,
    queue_len: usize,
}

/// Picks the runner for a new task: first idle runner scanning
/// round-robin from `last_selected + 1`; otherwise the shortest queue
/// among available runners (ties to the smallest index); otherwise the
/// shortest queue outright.
fn pick_runner(occupancy: &[RunnerOccupancy], last_selected: usize) -> usize {
    let n = occupancy.len();
    let start = last_selected.wrapping_add(1) % n;

    for i in 0..n {
        let idx = (start + i) % n;
        let r = occupancy[idx];
        if r.available && !r.processing && r.queue_len == 0 {
            return idx;
        }
    }

    let shortest = |indices: &mut dyn Iterator<Item = usize>| {
        indices.min_by_key(|&idx| (occupancy[idx].queue_len, idx))
    };

    shortest(&mut (0..n).filter(|&idx| occupancy[idx].available))
        .or_else(|| shortest(&mut (0..n)))
        .unwrap_or(0)
}

/// The pool of transcription runners.
pub struct RunnerPool {
    config: RunnerPoolConfig,
    intake: Mutex<Intake>,
    runners: Vec<Arc<RunnerState>>,
    last_selected: AtomicUsize,
    dispatch_notify: Notify,
    running: AtomicBool,
    stats: Arc<StatsHub>,
    /// Taken by `close_results` after the workers drain, which closes the
    /// channel and lets the committer exit.
    results_tx: Mutex<Option<mpsc::UnboundedSender<WorkerResult>>>,
    diarizer: Option<Arc<dyn Diarizer>>,
}

impl RunnerPool {
    /// Builds a pool over the given engines (one runner per engine).
    /// Returns the pool and the receiver carrying worker results.
    pub fn new(
        engines: Vec<Arc<dyn SpeechEngine>>,
        diarizer: Option<Arc<dyn Diarizer>>,
        config: RunnerPoolConfig,
        stats: Arc<StatsHub>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<WorkerResult>) {
        assert!(!engines.is_empty(), "need at least one engine");

        let runners = engines
            .into_iter()
            .enumerate()
            .map(|(id, engine)| {
                Arc::new(RunnerState {
                    id,
                    engine,
                    queue: Mutex::new(VecDeque::new()),
                    notify: Notify::new(),
                    processing: AtomicBool::new(false),
                    available: AtomicBool::new(true),
                    needs_warm_up: AtomicBool::new(true),
                })
            })
            .collect();

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            config,
            intake: Mutex::new(Intake {
                queue: VecDeque::new(),
                next_sequence: 0,
            }),
            runners,
            last_selected: AtomicUsize::new(usize::MAX),
            dispatch_notify: Notify::new(),
            running: AtomicBool::new(true),
            stats,
            results_tx: Mutex::new(Some(results_tx)),
            diarizer,
        });
        (pool, results_rx)
    }

    /// Spawns the dispatcher and one worker per runner.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = vec![tokio::spawn(self.clone().dispatch_loop())];
        for runner in &self.runners {
            handles.push(tokio::spawn(self.clone().worker_loop(runner.clone())));
        }
        handles
    }

    /// Submits a window under the intake lock: assigns its sequence
    /// number, applies overflow, enqueues, and wakes the dispatcher.
    /// Sequence order therefore matches submission order exactly.
    pub fn submit(&self, wav_path: PathBuf, start_sec: f64) -> u64 {
        let (sequence, intake_len, dropped) = {
            let mut intake = self.intake.lock().unwrap();
            let sequence = intake.next_sequence;
            intake.next_sequence += 1;

            let dropped = if intake.queue.len() >= self.config.intake_capacity {
                intake.queue.pop_front()
            } else {
                None
            };

            intake.queue.push_back(WindowTask {
                wav_path,
                start_sec,
                sequence,
            });
            (sequence, intake.queue.len(), dropped)
        };

        let overflowed = dropped.is_some();
        if let Some(dropped) = dropped {
            warn!(
                sequence = dropped.sequence,
                "intake overflow: dropping oldest window"
            );
            remove_wav(&dropped.wav_path);
            // The dropped sequence still needs a (empty) result or the
            // reorder buffer would stall on it forever.
            self.send_result(WorkerResult {
                sequence: dropped.sequence,
                start_sec: dropped.start_sec,
                fragments: Vec::new(),
                speakers: Vec::new(),
            });
        }

        self.stats.update(|s| {
            s.intake_count = intake_len;
            if overflowed {
                s.dropped_windows += 1;
            }
        });
        self.dispatch_notify.notify_one();
        sequence
    }

    /// Stops accepting work and wakes every task so queued windows drain.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.dispatch_notify.notify_one();
        for runner in &self.runners {
            runner.notify.notify_one();
        }
    }

    /// Closes the result channel. Call after the worker tasks have
    /// drained so the consumer's `recv` loop terminates.
    pub fn close_results(&self) {
        self.results_tx.lock().unwrap().take();
    }

    fn send_result(&self, result: WorkerResult) {
        if let Some(tx) = self.results_tx.lock().unwrap().as_ref() {
            let _ = tx.send(result);
        }
    }

    fn occupancy(&self) -> Vec<RunnerOccupancy> {
        self.runners
            .iter()
            .map(|r| RunnerOccupancy {
                available: r.available.load(Ordering::SeqCst),
                processing: r.processing.load(Ordering::SeqCst),
                queue_len: r.queue.lock().unwrap().len(),
            })
            .collect()
    }

    /// Single-flight dispatcher: drains the intake into runner queues,
    /// yielding between items, and parks when the intake is empty.
    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            let task = {
                let mut intake = self.intake.lock().unwrap();
                intake.queue.pop_front()
            };

            let Some(task) = task else {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                self.dispatch_notify.notified().await;
                continue;
            };

            let idx = pick_runner(
                &self.occupancy(),
                self.last_selected.load(Ordering::SeqCst),
            );
            self.last_selected.store(idx, Ordering::SeqCst);

            let runner = &self.runners[idx];
            let queue_len = {
                let mut queue = runner.queue.lock().unwrap();
                queue.push_back(task);
                queue.len()
            };
            debug!(runner = idx, queue_len, "dispatched window");

            let intake_len = self.intake.lock().unwrap().queue.len();
            self.stats.update(|s| {
                s.intake_count = intake_len;
                s.per_runner[idx].queue_count = queue_len;
            });
            runner.notify.notify_one();

            tokio::task::yield_now().await;
        }
    }

    /// Single-flight worker: pops its own queue in FIFO order and drives
    /// the engine. Every popped task produces exactly one result, empty
    /// on failure, so sequence numbering never breaks.
    async fn worker_loop(self: Arc<Self>, runner: Arc<RunnerState>) {
        self.warm_runner(&runner).await;

        loop {
            let task = {
                let mut queue = runner.queue.lock().unwrap();
                queue.pop_front()
            };

            let Some(task) = task else {
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                runner.notify.notified().await;
                continue;
            };

            runner.processing.store(true, Ordering::SeqCst);
            let queue_len = runner.queue.lock().unwrap().len();
            self.stats.update(|s| {
                s.per_runner[runner.id].queue_count = queue_len;
                s.per_runner[runner.id].is_processing = true;
            });

            if runner.needs_warm_up.load(Ordering::SeqCst) {
                self.warm_runner(&runner).await;
            }

            let fragments = self.run_transcribe(&runner, &task).await;
            let speakers = if fragments.is_empty() {
                Vec::new()
            } else {
                self.run_diarize(&task).await
            };

            // The WAV has served its purpose; the worker owns the delete.
            remove_wav(&task.wav_path);

            self.send_result(WorkerResult {
                sequence: task.sequence,
                start_sec: task.start_sec,
                fragments,
                speakers,
            });

            runner.processing.store(false, Ordering::SeqCst);
            self.stats
                .update(|s| s.per_runner[runner.id].is_processing = false);
        }
    }

    async fn warm_runner(&self, runner: &Arc<RunnerState>) {
        if !runner.needs_warm_up.load(Ordering::SeqCst) {
            return;
        }

        let engine = runner.engine.clone();
        let name = engine.name().to_string();
        let outcome = timeout(
            self.config.warm_up_timeout,
            tokio::task::spawn_blocking(move || engine.warm_up()),
        )
        .await;

        let ok = match outcome {
            Ok(Ok(Ok(()))) => true,
            Ok(Ok(Err(e))) => {
                warn!(runner = runner.id, engine = %name, error = %e, "warm-up failed");
                false
            }
            Ok(Err(e)) => {
                warn!(runner = runner.id, engine = %name, error = %e, "warm-up panicked");
                false
            }
            Err(_) => {
                let e = StreamscribeError::EngineWarmupTimeout {
                    name,
                    timeout_sec: self.config.warm_up_timeout.as_secs_f64(),
                };
                warn!(runner = runner.id, error = %e, "warm-up timed out");
                runner.engine.restart();
                false
            }
        };

        runner.needs_warm_up.store(!ok, Ordering::SeqCst);
        runner.available.store(ok, Ordering::SeqCst);
        self.stats
            .update(|s| s.per_runner[runner.id].is_available = ok);
    }

    async fn run_transcribe(
        &self,
        runner: &Arc<RunnerState>,
        task: &WindowTask,
    ) -> Vec<TranscriptFragment> {
        let engine = runner.engine.clone();
        let wav = task.wav_path.clone();
        let outcome = timeout(
            self.config.transcribe_timeout,
            tokio::task::spawn_blocking(move || engine.transcribe(&wav)),
        )
        .await;

        match outcome {
            Ok(Ok(Ok(fragments))) => fragments,
            Ok(Ok(Err(e))) => {
                warn!(sequence = task.sequence, error = %e, "transcription failed");
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(sequence = task.sequence, error = %e, "transcription panicked");
                Vec::new()
            }
            Err(_) => {
                let e = StreamscribeError::EngineTranscribeTimeout {
                    name: runner.engine.name().to_string(),
                };
                warn!(
                    sequence = task.sequence,
                    runner = runner.id,
                    error = %e,
                    "transcription timed out; restarting engine"
                );
                runner.engine.restart();
                runner.needs_warm_up.store(true, Ordering::SeqCst);
                Vec::new()
            }
        }
    }

    async fn run_diarize(&self, task: &WindowTask) -> Vec<SpeakerSegment> {
        let Some(diarizer) = self.diarizer.clone() else {
            return Vec::new();
        };
        let wav = task.wav_path.clone();
        match tokio::task::spawn_blocking(move || diarizer.diarize(&wav)).await {
            Ok(Ok(speakers)) => speakers,
            Ok(Err(e)) => {
                warn!(sequence = task.sequence, error = %e, "diarization failed");
                Vec::new()
            }
            Err(e) => {
                warn!(sequence = task.sequence, error = %e, "diarization panicked");
                Vec::new()
            }
        }
    }
}

fn remove_wav(path: &std::path::Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to unlink window WAV");
    }
}
