use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-node execution state.
///
/// `Idle -> InPath -> Executing -> {Complete | Error} -> Idle` (the last step
/// is the timed decay after a run). A node whose handler is missing goes
/// `Executing -> InPath`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    #[default]
    Idle,
    InPath,
    Executing,
    Complete,
    Error,
}

impl ExecutionState {
    /// Boolean view served to renderers.
    pub fn flags(&self) -> StatusFlags {
        StatusFlags {
            is_in_execution_path: !matches!(self, ExecutionState::Idle),
            is_executing: matches!(self, ExecutionState::Executing),
            execution_complete: matches!(self, ExecutionState::Complete),
            execution_error: matches!(self, ExecutionState::Error),
        }
    }

    /// Whether the executor may move a node from this state to `next`.
    pub fn can_transition_to(&self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (_, Idle)
                | (Idle, InPath)
                | (InPath, InPath)
                | (Complete, InPath)
                | (Error, InPath)
                | (InPath, Executing)
                | (Executing, InPath)
                | (Executing, Complete)
                | (Executing, Error)
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionState::Idle => "idle",
            ExecutionState::InPath => "in_path",
            ExecutionState::Executing => "executing",
            ExecutionState::Complete => "complete",
            ExecutionState::Error => "error",
        };
        f.write_str(label)
    }
}

/// The four runtime flags a canvas node exposes while a run is visible.
///
/// These are never persisted; see [`crate::CanvasDocument`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFlags {
    pub is_executing: bool,
    pub execution_complete: bool,
    pub execution_error: bool,
    pub is_in_execution_path: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_state() {
        assert_eq!(ExecutionState::Idle.flags(), StatusFlags::default());

        let executing = ExecutionState::Executing.flags();
        assert!(executing.is_executing);
        assert!(executing.is_in_execution_path);
        assert!(!executing.execution_complete);

        let failed = ExecutionState::Error.flags();
        assert!(failed.execution_error);
        assert!(!failed.is_executing);
    }

    #[test]
    fn rejects_skipping_execution() {
        assert!(!ExecutionState::Idle.can_transition_to(ExecutionState::Complete));
        assert!(!ExecutionState::InPath.can_transition_to(ExecutionState::Error));
        assert!(ExecutionState::Executing.can_transition_to(ExecutionState::Complete));
        assert!(ExecutionState::Complete.can_transition_to(ExecutionState::Idle));
    }
}
