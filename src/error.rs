//! Failures reported by external collaborators.
//!
//! Broken invariants inside the engine are panics; these types only carry what the solver or the
//! interpreter could not do.

use thiserror::Error;

use crate::state::StateId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    #[error("Solver timed out after {0} ms")]
    Timeout(u64),

    #[error("Unsupported expression: {0}")]
    Unsupported(String),

    #[error("Solver backend failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    #[error("State {state} has no instruction at {statement}")]
    MissingInstruction { state: StateId, statement: String },

    #[error("State {state} hit an unsupported instruction: {message}")]
    Unsupported { state: StateId, message: String },

    #[error("Solver failed while stepping state {state}: {source}")]
    Solver {
        state: StateId,
        #[source]
        source: SolverError,
    },
}

impl InterpreterError {
    /// The state the failed step was executing.
    pub fn state(&self) -> StateId {
        match self {
            InterpreterError::MissingInstruction { state, .. }
            | InterpreterError::Unsupported { state, .. }
            | InterpreterError::Solver { state, .. } => *state,
        }
    }
}
