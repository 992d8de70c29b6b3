//! Core error types.

use thiserror::Error;

/// Errors raised while parsing or validating a machine definition.
///
/// These are fatal: a machine is never constructed from a definition that
/// fails with one of these.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("malformed definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("start state '{state}' is not declared")]
    MissingStartState { state: String },

    #[error("start state '{state}' has no 'auto' transition")]
    MissingAutoTransition { state: String },

    #[error("state '{state}' declares an 'auto' transition but only the start state may")]
    MisplacedAutoTransition { state: String },

    #[error("transition '{state}' --{event}--> '{dest}' targets an undeclared state")]
    UnknownDestination {
        state: String,
        event: String,
        dest: String,
    },

    #[error("state '{state}' handles undeclared event '{event}'")]
    UndeclaredEvent { state: String, event: String },

    #[error("event '{event}' is declared more than once")]
    DuplicateEvent { event: String },

    #[error("event name '{event}' is reserved")]
    ReservedEvent { event: String },

    #[error("invalid action '{spec}': {reason}")]
    InvalidAction { spec: String, reason: String },

    #[error("actions not registered with the host: {}", .names.join(", "))]
    UnresolvedActions { names: Vec<String> },
}

/// An event name that is not part of the machine's declared event set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event: {event}")]
pub struct UnknownEventError {
    pub event: String,
}

impl UnknownEventError {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }
}

/// A failed action invocation.
///
/// Never aborts the surrounding action sequence; it is collected into the
/// step outcome so the host can observe it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unresolved action: {action}")]
    Unresolved { action: String },

    #[error("action {action}({}) reported failure", .arg.as_deref().unwrap_or(""))]
    Failed { action: String, arg: Option<String> },
}

impl ActionError {
    /// Name of the action that failed.
    pub fn action(&self) -> &str {
        match self {
            ActionError::Unresolved { action } | ActionError::Failed { action, .. } => action,
        }
    }
}

/// Errors from the engine's host-facing API.
///
/// Action failures are not among them; they are collected per step in
/// `StepOutcome::failures` and `TickReport::failures`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventError),

    #[error("machine has been torn down")]
    TornDown,
}

impl EngineError {
    /// Returns whether the machine keeps running after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Definition(_) | EngineError::TornDown)
    }

    /// Returns a stable error code suitable for host diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Definition(_) => "BAD_DEFINITION",
            EngineError::UnknownEvent(_) => "UNKNOWN_EVENT",
            EngineError::TornDown => "TORN_DOWN",
        }
    }
}
