//! Observable pipeline state.
//!
//! One [`StateCell`] exists per orchestrator. Mutation is crate-internal
//! (the orchestrator is the only writer); observers read the current value,
//! subscribe to a watch channel, or install a transition hook when they need
//! every intermediate state.

use crate::defaults;
use crate::error::{Result, VoxtaskError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;

/// Lifecycle of the capture/processing pipeline.
///
/// The visible state always reflects the head-of-line segment's stage,
/// never a blend of several segments.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Listening,
    Speaking,
    SilenceCountdown,
    FinalizingStt,
    Rewriting,
    Saving,
    Error(String),
}

impl PipelineState {
    pub fn is_error(&self) -> bool {
        matches!(self, PipelineState::Error(_))
    }

    /// Whether a capture session is active in this state.
    pub fn is_recording(&self) -> bool {
        !matches!(self, PipelineState::Idle | PipelineState::Error(_))
    }

    /// Short status line for UI display.
    pub fn status_text(&self) -> String {
        match self {
            PipelineState::Idle => "Ready".to_string(),
            PipelineState::Listening => "Listening...".to_string(),
            PipelineState::Speaking => "Hearing you...".to_string(),
            PipelineState::SilenceCountdown => "Waiting...".to_string(),
            PipelineState::FinalizingStt => "Transcribing...".to_string(),
            PipelineState::Rewriting => "Rewriting...".to_string(),
            PipelineState::Saving => "Saving task...".to_string(),
            PipelineState::Error(message) => message.clone(),
        }
    }
}

/// Result of a successful persistence stage. Single-slot: each save
/// overwrites the previous record.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedTask {
    /// Identifier assigned by the task store.
    pub task_id: String,
    /// Final (rewritten) title.
    pub title: String,
    /// Formatted notes body, if any.
    pub notes: Option<String>,
    pub saved_at: SystemTime,
}

type TransitionHook = Box<dyn Fn(&PipelineState) + Send + Sync>;

/// Shared pipeline state with controlled mutation.
pub struct StateCell {
    tx: watch::Sender<PipelineState>,
    /// Bumped on every transition; lets the error auto-clear detect
    /// that a newer transition superseded it.
    generation: AtomicU64,
    last_saved: Mutex<Option<SavedTask>>,
    last_error: Mutex<Option<String>>,
    error_display: Duration,
    hook: Mutex<Option<TransitionHook>>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self::with_error_display(Duration::from_secs(defaults::ERROR_DISPLAY_SECONDS))
    }

    /// Custom error display window (tests use a short one).
    pub fn with_error_display(error_display: Duration) -> Self {
        let (tx, _) = watch::channel(PipelineState::Idle);
        Self {
            tx,
            generation: AtomicU64::new(0),
            last_saved: Mutex::new(None),
            last_error: Mutex::new(None),
            error_display,
            hook: Mutex::new(None),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.tx.borrow().clone()
    }

    /// Watch receiver for UI observation. Coalesces rapid transitions;
    /// use [`StateCell::set_transition_hook`] when every step matters.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub fn set_transition_hook(&self, hook: TransitionHook) {
        *lock(&self.hook) = Some(hook);
    }

    pub fn last_saved(&self) -> Option<SavedTask> {
        lock(&self.last_saved).clone()
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub(crate) fn transition_to(&self, state: PipelineState) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = lock(&self.hook).as_ref() {
            hook(&state);
        }
        tracing::debug!(state = ?state, "pipeline state transition");
        self.tx.send_replace(state);
    }

    /// Start a capture session: only legal from `Idle` or `Error`.
    pub(crate) fn begin_session(&self) -> Result<()> {
        match self.current() {
            PipelineState::Idle | PipelineState::Error(_) => {
                self.transition_to(PipelineState::Listening);
                Ok(())
            }
            _ => Err(VoxtaskError::SessionActive),
        }
    }

    pub(crate) fn record_saved(&self, task: SavedTask) {
        *lock(&self.last_saved) = Some(task);
    }

    /// Report a user-visible error.
    ///
    /// Enters `Error(message)` and schedules an auto-clear to `Idle` after
    /// the display window, unless a newer transition supersedes it.
    pub(crate) fn handle_error(cell: &Arc<Self>, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(%message, "pipeline error");
        *lock(&cell.last_error) = Some(message.clone());
        cell.transition_to(PipelineState::Error(message));

        let generation = cell.generation.load(Ordering::SeqCst);
        let cell = Arc::clone(cell);
        tokio::spawn(async move {
            tokio::time::sleep(cell.error_display).await;
            if cell.generation.load(Ordering::SeqCst) == generation && cell.current().is_error() {
                cell.transition_to(PipelineState::Idle);
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let cell = StateCell::new();
        assert_eq!(cell.current(), PipelineState::Idle);
        assert_eq!(cell.last_saved(), None);
        assert_eq!(cell.last_error(), None);
    }

    #[test]
    fn test_is_recording() {
        assert!(!PipelineState::Idle.is_recording());
        assert!(!PipelineState::Error("x".into()).is_recording());
        assert!(PipelineState::Listening.is_recording());
        assert!(PipelineState::Saving.is_recording());
    }

    #[test]
    fn test_status_text_error_carries_message() {
        let state = PipelineState::Error("Save failed".to_string());
        assert_eq!(state.status_text(), "Save failed");
        assert_eq!(PipelineState::Idle.status_text(), "Ready");
    }

    #[test]
    fn test_begin_session_from_idle() {
        let cell = StateCell::new();
        cell.begin_session().expect("start from idle");
        assert_eq!(cell.current(), PipelineState::Listening);
    }

    #[test]
    fn test_begin_session_rejected_while_active() {
        let cell = StateCell::new();
        cell.begin_session().expect("start");
        assert!(matches!(
            cell.begin_session(),
            Err(VoxtaskError::SessionActive)
        ));
    }

    #[test]
    fn test_begin_session_allowed_from_error() {
        let cell = StateCell::new();
        cell.transition_to(PipelineState::Error("boom".to_string()));
        cell.begin_session().expect("start from error");
        assert_eq!(cell.current(), PipelineState::Listening);
    }

    #[test]
    fn test_transition_hook_sees_every_state() {
        let cell = StateCell::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.set_transition_hook(Box::new(move |state| {
            sink.lock().expect("lock").push(state.clone());
        }));

        cell.transition_to(PipelineState::Listening);
        cell.transition_to(PipelineState::Speaking);
        cell.transition_to(PipelineState::SilenceCountdown);

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![
                PipelineState::Listening,
                PipelineState::Speaking,
                PipelineState::SilenceCountdown
            ]
        );
    }

    #[test]
    fn test_record_saved_overwrites_slot() {
        let cell = StateCell::new();
        let make = |id: &str| SavedTask {
            task_id: id.to_string(),
            title: "t".to_string(),
            notes: None,
            saved_at: SystemTime::now(),
        };
        cell.record_saved(make("a"));
        cell.record_saved(make("b"));
        assert_eq!(cell.last_saved().map(|t| t.task_id), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_error_auto_clears_to_idle() {
        let cell = Arc::new(StateCell::with_error_display(Duration::from_millis(20)));
        StateCell::handle_error(&cell, "boom");
        assert_eq!(cell.current(), PipelineState::Error("boom".to_string()));
        assert_eq!(cell.last_error(), Some("boom".to_string()));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cell.current(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_error_clear_superseded_by_newer_transition() {
        let cell = Arc::new(StateCell::with_error_display(Duration::from_millis(20)));
        StateCell::handle_error(&cell, "boom");
        cell.transition_to(PipelineState::Listening);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            cell.current(),
            PipelineState::Listening,
            "a newer transition must not be clobbered by the auto-clear"
        );
    }
}
