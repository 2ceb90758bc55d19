//! Server lifecycle state machine.
//!
//! ```text
//! stopped → starting → running → draining → stopped
//!              └──────────────────────────────┘ (startup failure)
//! ```

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Draining,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
        }
    }

    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Stopped)
                | (Running, Draining)
                | (Draining, Stopped)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
    #[error("HTTP listener failed to start: {0}")]
    Listener(#[from] crate::net::ListenerError),
    #[error("{task} task terminated: {reason}")]
    ServerFailed {
        task: &'static str,
        reason: String,
    },
    #[error("{0} task(s) did not drain within the grace period")]
    DrainTimeout(usize),
}

/// Shared handle on the current lifecycle state.
///
/// Cloning yields another handle on the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    tx: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Stopped);
        Self { tx }
    }

    pub fn current(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn advance(&self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        let mut result = Ok(next);
        self.tx.send_if_modified(|state| {
            if state.can_advance_to(next) {
                tracing::debug!(from = %state, to = %next, "Lifecycle transition");
                *state = next;
                true
            } else {
                result = Err(LifecycleError::InvalidTransition { from: *state, to: next });
                false
            }
        });
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
