//! Global pause state machine.
//!
//! Three states gate the whole pipeline: `None` (running), `Manual`
//! (user-requested pause), and `AutoSilence` (nothing worth transcribing
//! right now). Manual strictly dominates: VAD-driven transitions are
//! ignored while the user holds the pause.
//!
//! Components never hold a reference back to the controller; they either
//! query `state()` synchronously (capture thread) or subscribe to the
//! watch channel and react to published transitions.

use tokio::sync::watch;

/// Pause state observed by the capture path and the window buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PauseState {
    /// Pipeline is running normally.
    #[default]
    None,
    /// User-requested pause; dominates all automatic transitions.
    Manual,
    /// Automatically paused after sustained silence.
    AutoSilence,
}

impl PauseState {
    /// Returns true unless the state is `None`.
    pub fn is_paused(self) -> bool {
        self != PauseState::None
    }
}

/// Pause controller: owns the state and publishes every transition.
pub struct PauseController {
    tx: watch::Sender<PauseState>,
}

impl PauseController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PauseState::None);
        Self { tx }
    }

    /// Current state.
    pub fn state(&self) -> PauseState {
        *self.tx.borrow()
    }

    /// Subscribe to state transitions. Exactly one notification fires per
    /// transition; the firing thread is whichever thread triggered it.
    pub fn subscribe(&self) -> watch::Receiver<PauseState> {
        self.tx.subscribe()
    }

    /// User toggles the manual pause. Returns the transition, if any.
    pub fn set_manual(&self, on: bool) -> Option<PauseTransition> {
        self.transition(|current| match (current, on) {
            (PauseState::Manual, true) => None,
            (_, true) => Some(PauseState::Manual),
            (PauseState::Manual, false) => Some(PauseState::None),
            (_, false) => None,
        })
    }

    /// VAD reported sustained silence. No-op unless currently running.
    pub fn apply_auto_silence(&self) -> Option<PauseTransition> {
        self.transition(|current| match current {
            PauseState::None => Some(PauseState::AutoSilence),
            PauseState::Manual | PauseState::AutoSilence => None,
        })
    }

    /// VAD reported speech. Lifts an automatic pause; never a manual one.
    pub fn apply_speech_resume(&self) -> Option<PauseTransition> {
        self.transition(|current| match current {
            PauseState::AutoSilence => Some(PauseState::None),
            PauseState::None | PauseState::Manual => None,
        })
    }

    fn transition(
        &self,
        decide: impl FnOnce(PauseState) -> Option<PauseState>,
    ) -> Option<PauseTransition> {
        let mut result = None;
        self.tx.send_if_modified(|current| match decide(*current) {
            Some(next) => {
                result = Some(PauseTransition {
                    from: *current,
                    to: next,
                });
                *current = next;
                true
            }
            None => false,
        });
        result
    }
}

impl Default for PauseController {
    fn default() -> Self {
        Self::new()
    }
}

/// A single observed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseTransition {
    pub from: PauseState,
    pub to: PauseState,
}
