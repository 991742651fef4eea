use chrono::{DateTime, Utc};
use runproc_common::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_HISTORY: usize = 100;

/// Lifecycle state of a process host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// Constructed, `start` not yet called (or the spawn failed)
    NotStarted,
    /// Spawned and not yet observed to exit
    Running,
    /// Exit observed; the exit outcome is available
    Exited,
    /// Handle released
    Disposed,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::NotStarted => write!(f, "not_started"),
            HostState::Running => write!(f, "running"),
            HostState::Exited => write!(f, "exited"),
            HostState::Disposed => write!(f, "disposed"),
        }
    }
}

impl HostState {
    /// True once `start` has succeeded, i.e. the operations that need a
    /// child are allowed.
    pub fn is_started(&self) -> bool {
        matches!(self, HostState::Running | HostState::Exited)
    }
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: HostState,
    pub to_state: HostState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// State machine guarding a host's lifecycle transitions.
#[derive(Debug, Clone)]
pub struct HostStateMachine {
    host_id: String,
    current_state: HostState,
    state_history: Vec<StateTransition>,
    last_transition_time: DateTime<Utc>,
}

impl HostStateMachine {
    pub fn new(host_id: &str) -> Self {
        Self {
            host_id: host_id.to_string(),
            current_state: HostState::NotStarted,
            state_history: Vec::new(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn current_state(&self) -> HostState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn last_transition_time(&self) -> DateTime<Utc> {
        self.last_transition_time
    }

    /// Check if a transition from current state to target state is valid
    pub fn is_valid_transition(&self, target_state: HostState) -> bool {
        match (self.current_state, target_state) {
            (HostState::NotStarted, HostState::Running) => true,
            (HostState::Running, HostState::Exited) => true,

            // Drop is allowed from anywhere
            (_, HostState::Disposed) => true,

            // Same state (no-op)
            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(&mut self, target_state: HostState, reason: Option<String>) -> ProcessResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(ProcessError::invalid_state(
                &self.host_id,
                format!("a state that can move to {}", target_state),
                self.current_state.to_string(),
            ));
        }

        if self.current_state == target_state {
            return Ok(());
        }

        let now = Utc::now();
        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: now,
            reason,
        });
        if self.state_history.len() > MAX_HISTORY {
            self.state_history.remove(0);
        }

        self.current_state = target_state;
        self.last_transition_time = now;

        tracing::debug!(
            host = %self.host_id,
            from = %from_state,
            to = %target_state,
            "Host state transition"
        );

        Ok(())
    }

    pub fn transition_to_running(&mut self) -> ProcessResult<()> {
        self.transition_to(HostState::Running, Some("Process spawned".to_string()))
    }

    pub fn transition_to_exited(&mut self, reason: String) -> ProcessResult<()> {
        self.transition_to(HostState::Exited, Some(reason))
    }

    pub fn transition_to_disposed(&mut self) -> ProcessResult<()> {
        self.transition_to(HostState::Disposed, Some("Host dropped".to_string()))
    }

    /// Fails with `InvalidState` unless the host is still `NotStarted`.
    pub fn ensure_can_start(&self) -> ProcessResult<()> {
        if self.current_state == HostState::NotStarted {
            Ok(())
        } else {
            Err(ProcessError::invalid_state(
                &self.host_id,
                HostState::NotStarted.to_string(),
                format!("{} (already started)", self.current_state),
            ))
        }
    }

    /// Fails with `OperationNotAllowed` unless the host has been started and
    /// not yet dropped.
    pub fn ensure_started(&self, operation: &str) -> ProcessResult<()> {
        if self.current_state.is_started() {
            Ok(())
        } else {
            Err(ProcessError::operation_not_allowed(
                &self.host_id,
                operation,
                self.current_state.to_string(),
            ))
        }
    }
}
