//! Queue statistics surface.
//!
//! A snapshot of every queue in the pipeline, republished on each
//! mutation so UIs can render backlog without polling the queues
//! themselves.

use tokio::sync::watch;

/// Occupancy of one runner queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunnerStats {
    /// Windows waiting in this runner's queue.
    pub queue_count: usize,
    /// True while the runner is inside a transcribe call.
    pub is_processing: bool,
    /// False when the engine failed warm-up and is being skipped.
    pub is_available: bool,
}

/// Snapshot of all pipeline queues.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Windows waiting in the bounded intake.
    pub intake_count: usize,
    pub intake_cap: usize,
    pub per_runner: Vec<RunnerStats>,
    /// Results parked in the reorder buffer behind a gap.
    pub reorder_count: usize,
    /// Windows dropped by intake overflow since startup.
    pub dropped_windows: u64,
}

impl QueueStats {
    /// Total windows queued anywhere (intake + runners).
    pub fn queued_total(&self) -> usize {
        self.intake_count + self.per_runner.iter().map(|r| r.queue_count).sum::<usize>()
    }
}

/// Publisher side of the stats surface.
pub struct StatsHub {
    tx: watch::Sender<QueueStats>,
}

impl StatsHub {
    pub fn new(intake_cap: usize, worker_count: usize) -> Self {
        let initial = QueueStats {
            intake_cap,
            per_runner: vec![
                RunnerStats {
                    is_available: true,
                    ..Default::default()
                };
                worker_count
            ],
            ..Default::default()
        };
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Publishes a new snapshot; fires one change event per call.
    pub fn publish(&self, stats: QueueStats) {
        let _ = self.tx.send(stats);
    }

    /// Mutates the current snapshot in place and republishes it.
    pub fn update(&self, mutate: impl FnOnce(&mut QueueStats)) {
        self.tx.send_modify(mutate);
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> QueueStats {
        self.tx.borrow().clone()
    }

    /// Subscribe to QueueStatsChanged events.
    pub fn subscribe(&self) -> watch::Receiver<QueueStats> {
        self.tx.subscribe()
    }
}
