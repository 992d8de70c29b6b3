//! # tickfsm-core
//!
//! Declarative state machine engine for single-threaded hosts.
//!
//! This crate provides:
//! - Machine definition parsing and validation
//! - Event queueing and transition dispatch
//! - One-shot and repeating timers that inject events
//! - Host action dispatch by name
//! - A rate-limited per-tick driver

pub mod action;
pub mod definition;
pub mod driver;
pub mod error;
pub mod machine;
pub mod queue;
pub mod timer;
pub mod validate;

pub use action::{ActionContext, ActionFn, ActionRegistry};
pub use definition::{ActionRef, MachineDefinition, StateDef, TransitionDef, AUTO_EVENT};
pub use driver::{EngineConfig, RateLimiter, TickReport};
pub use error::{ActionError, DefinitionError, EngineError, UnknownEventError};
pub use machine::{Machine, StepOutcome};
pub use queue::{Event, EventSource};
pub use timer::{TimerHandle, TimerSet};
