// src/core/scanner/state.rs

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;
use tracing::debug;

use crate::core::error::ScanError;

/// Lifecycle of a scan. `Stopped`, `Aborted` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScanState {
    Created,
    Running,
    Paused,
    Stopped,
    Aborted,
    Completed,
}

/// Operations that move a scan between states. `Start` and `Complete` are driven by the
/// scan itself; the rest come from the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ScanOperation {
    Start,
    Pause,
    Resume,
    Stop,
    Abort,
    Complete,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanState::Stopped | ScanState::Aborted | ScanState::Completed)
    }

    /// The state `operation` leads to from `self`, if that edge exists.
    pub fn apply(self, operation: ScanOperation) -> Result<ScanState, ScanError> {
        use ScanOperation as Op;
        use ScanState as S;

        if self.is_terminal() {
            return Err(ScanError::Terminal { operation, state: self });
        }
        match (self, operation) {
            (S::Created, Op::Start) => Ok(S::Running),
            (S::Running, Op::Pause) => Ok(S::Paused),
            (S::Paused, Op::Resume) => Ok(S::Running),
            (S::Running | S::Paused, Op::Stop) => Ok(S::Stopped),
            (_, Op::Abort) => Ok(S::Aborted),
            (S::Running, Op::Complete) => Ok(S::Completed),
            (from, operation) => Err(ScanError::InvalidTransition { operation, from }),
        }
    }
}

/// What a worker should do after waiting on the pause gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Proceed,
    Halt,
}

/// The shared lifecycle cell of one scan. Transitions are validated and published
/// atomically; workers and the control channel observe them through `watch` receivers.
#[derive(Debug)]
pub struct ScanControl {
    state: watch::Sender<ScanState>,
}

impl Default for ScanControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanControl {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ScanState::Created);
        Self { state }
    }

    pub fn state(&self) -> ScanState {
        *self.state.borrow()
    }

    /// Applies `operation` and returns the state it left.
    pub fn transition(&self, operation: ScanOperation) -> Result<ScanState, ScanError> {
        let mut outcome = Ok(ScanState::Created);
        self.state.send_if_modified(|state| match state.apply(operation) {
            Ok(next) => {
                outcome = Ok(*state);
                *state = next;
                true
            }
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        if let Ok(from) = &outcome {
            debug!(%operation, %from, to = %self.state(), "Scan state changed.");
        }
        outcome
    }

    /// Resolves once the scan may do more work (`Proceed`) or never will again (`Halt`).
    pub async fn wait_runnable(&self) -> Flow {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ScanState::Running => return Flow::Proceed,
                ScanState::Created | ScanState::Paused => {}
                ScanState::Stopped | ScanState::Aborted | ScanState::Completed => return Flow::Halt,
            }
            if rx.changed().await.is_err() {
                return Flow::Halt;
            }
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ScanState> {
        self.state.subscribe()
    }

    /// Resolves once the scan is aborted.
    pub async fn aborted(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == ScanState::Aborted).await;
    }

    /// Resolves once the scan reaches any terminal state.
    pub async fn finished(&self) -> ScanState {
        let mut rx = self.state.subscribe();
        let terminal = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => Some(*state),
            Err(_) => None,
        };
        terminal.unwrap_or_else(|| self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn lifecycle_edges() {
        assert_eq!(ScanState::Created.apply(ScanOperation::Start).unwrap(), ScanState::Running);
        assert_eq!(ScanState::Running.apply(ScanOperation::Pause).unwrap(), ScanState::Paused);
        assert_eq!(ScanState::Paused.apply(ScanOperation::Resume).unwrap(), ScanState::Running);
        assert_eq!(ScanState::Paused.apply(ScanOperation::Stop).unwrap(), ScanState::Stopped);
        assert_eq!(ScanState::Running.apply(ScanOperation::Stop).unwrap(), ScanState::Stopped);
        assert_eq!(ScanState::Created.apply(ScanOperation::Abort).unwrap(), ScanState::Aborted);
        assert_eq!(ScanState::Paused.apply(ScanOperation::Abort).unwrap(), ScanState::Aborted);
        assert_eq!(ScanState::Running.apply(ScanOperation::Complete).unwrap(), ScanState::Completed);
    }

    #[test]
    fn invalid_edges_are_reported() {
        assert!(matches!(
            ScanState::Paused.apply(ScanOperation::Pause),
            Err(ScanError::InvalidTransition { from: ScanState::Paused, .. })
        ));
        assert!(matches!(ScanState::Running.apply(ScanOperation::Resume), Err(ScanError::InvalidTransition { .. })));
        assert!(matches!(ScanState::Created.apply(ScanOperation::Stop), Err(ScanError::InvalidTransition { .. })));
        assert!(matches!(ScanState::Paused.apply(ScanOperation::Complete), Err(ScanError::InvalidTransition { .. })));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for state in [ScanState::Stopped, ScanState::Aborted, ScanState::Completed] {
            for op in [ScanOperation::Pause, ScanOperation::Resume, ScanOperation::Stop, ScanOperation::Abort] {
                assert!(matches!(state.apply(op), Err(ScanError::Terminal { .. })));
            }
        }
    }

    #[test]
    fn transition_reports_previous_state() {
        let control = ScanControl::new();
        assert_eq!(control.transition(ScanOperation::Start).unwrap(), ScanState::Created);
        assert_eq!(control.transition(ScanOperation::Pause).unwrap(), ScanState::Running);
        assert_eq!(control.state(), ScanState::Paused);
        assert!(control.transition(ScanOperation::Pause).is_err());
        assert_eq!(control.state(), ScanState::Paused);
    }

    #[tokio::test]
    async fn paused_gate_opens_on_resume() {
        let control = Arc::new(ScanControl::new());
        control.transition(ScanOperation::Start).unwrap();
        control.transition(ScanOperation::Pause).unwrap();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_runnable().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.transition(ScanOperation::Resume).unwrap();
        assert_eq!(waiter.await.unwrap(), Flow::Proceed);
    }

    #[tokio::test]
    async fn abort_releases_paused_gate() {
        let control = Arc::new(ScanControl::new());
        control.transition(ScanOperation::Start).unwrap();
        control.transition(ScanOperation::Pause).unwrap();

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_runnable().await })
        };
        control.transition(ScanOperation::Abort).unwrap();
        assert_eq!(waiter.await.unwrap(), Flow::Halt);
        assert_eq!(control.finished().await, ScanState::Aborted);
    }
}
