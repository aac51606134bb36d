//! Output lifecycle state machine

use crate::channel::protocol::Command;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of an output.
///
/// Transitions are validated against the table in [`OutputState::apply`];
/// `Stopped` is terminal. `start()` (CREATED → RUNNING) belongs to bring-up
/// and is not reachable through a runtime command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputState {
    /// Output exists but was never started
    Created,

    /// Output is actively producing data
    Running,

    /// Output is paused (can resume to Running)
    Paused,

    /// Output has stopped and cannot be restarted
    Stopped,
}

/// Why a command was rejected. State is never changed by a rejection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionError {
    #[error("the output is not running")]
    NotRunning,

    #[error("the output is not paused")]
    NotPaused,

    #[error("the output is already paused")]
    AlreadyPaused,

    #[error("the output is already stopped")]
    AlreadyStopped,
}

impl OutputState {
    /// Fold one command over the current state.
    ///
    /// Returns the next state for a legal transition, the rejection reason
    /// otherwise. Pure; the controller performs the engine side effect only
    /// after this accepts.
    pub fn apply(self, command: Command) -> Result<OutputState, TransitionError> {
        use OutputState::*;

        match (self, command) {
            // From Created: only STOP is legal (no-op release)
            (Created, Command::Stop) => Ok(Stopped),
            (Created, Command::Pause | Command::Resume) => Err(TransitionError::NotRunning),

            // From Running
            (Running, Command::Pause) => Ok(Paused),
            (Running, Command::Resume) => Err(TransitionError::NotPaused),
            (Running, Command::Stop) => Ok(Stopped),

            // From Paused
            (Paused, Command::Pause) => Err(TransitionError::AlreadyPaused),
            (Paused, Command::Resume) => Ok(Running),
            (Paused, Command::Stop) => Ok(Stopped),

            // From Stopped - terminal, nothing is legal
            (Stopped, _) => Err(TransitionError::AlreadyStopped),
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            OutputState::Created => "Created",
            OutputState::Running => "Running",
            OutputState::Paused => "Paused",
            OutputState::Stopped => "Stopped",
        }
    }

    /// Check if the output is currently active (running or paused)
    pub fn is_active(&self) -> bool {
        matches!(self, OutputState::Running | OutputState::Paused)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, OutputState::Running)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, OutputState::Stopped)
    }
}

impl std::fmt::Display for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fold a command sequence from Created, ignoring rejections.
    fn fold(commands: &[Command]) -> OutputState {
        commands.iter().fold(OutputState::Created, |state, &cmd| {
            state.apply(cmd).unwrap_or(state)
        })
    }

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            OutputState::Running.apply(Command::Pause),
            Ok(OutputState::Paused)
        );
        assert_eq!(
            OutputState::Paused.apply(Command::Resume),
            Ok(OutputState::Running)
        );
        assert_eq!(
            OutputState::Running.apply(Command::Stop),
            Ok(OutputState::Stopped)
        );
        assert_eq!(
            OutputState::Paused.apply(Command::Stop),
            Ok(OutputState::Stopped)
        );
        // releasing a never-started output is legal
        assert_eq!(
            OutputState::Created.apply(Command::Stop),
            Ok(OutputState::Stopped)
        );
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            OutputState::Created.apply(Command::Pause),
            Err(TransitionError::NotRunning)
        );
        assert_eq!(
            OutputState::Running.apply(Command::Resume),
            Err(TransitionError::NotPaused)
        );
        assert_eq!(
            OutputState::Paused.apply(Command::Pause),
            Err(TransitionError::AlreadyPaused)
        );
        assert_eq!(
            OutputState::Stopped.apply(Command::Pause),
            Err(TransitionError::AlreadyStopped)
        );
        assert_eq!(
            OutputState::Stopped.apply(Command::Resume),
            Err(TransitionError::AlreadyStopped)
        );
        assert_eq!(
            OutputState::Stopped.apply(Command::Stop),
            Err(TransitionError::AlreadyStopped)
        );
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        // commands before the output ever runs have no effect on state
        assert_eq!(
            fold(&[Command::Pause, Command::Pause]),
            OutputState::Created
        );

        let mut state = OutputState::Running;
        state = state.apply(Command::Pause).unwrap();
        assert_eq!(state.apply(Command::Pause), Err(TransitionError::AlreadyPaused));
        assert_eq!(state.apply(Command::Resume), Ok(OutputState::Running));
    }

    #[test]
    fn test_stop_is_idempotent_on_state() {
        let state = OutputState::Running.apply(Command::Stop).unwrap();
        assert_eq!(state, OutputState::Stopped);
        // second STOP is rejected but the fold still ends Stopped
        assert_eq!(state.apply(Command::Stop), Err(TransitionError::AlreadyStopped));
        assert!(state.is_stopped());
    }
}
