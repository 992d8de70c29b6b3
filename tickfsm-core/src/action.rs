//! Host action registry and dispatch.
//!
//! Definitions refer to actions by name. A host registers a callable per
//! name; the machine resolves names at invocation time, so a definition can
//! name an action the host never registers and only fail when it is called.

use crate::definition::ActionRef;
use crate::error::{ActionError, UnknownEventError};
use crate::queue::{Event, EventQueue};
use crate::timer::{TimerHandle, TimerSet};
use std::collections::HashMap;
use std::fmt;

/// A registered action. Returns `false` to report failure.
pub type ActionFn<H> = Box<dyn FnMut(&mut ActionContext<'_, H>, Option<&str>) -> bool>;

/// What an action can reach while it runs.
pub struct ActionContext<'a, H> {
    pub(crate) host: &'a mut H,
    pub(crate) timers: &'a mut TimerSet,
    pub(crate) queue: &'a mut EventQueue,
    pub(crate) state: &'a str,
    pub(crate) now_ms: u64,
}

impl<'a, H> ActionContext<'a, H> {
    pub fn host(&self) -> &H {
        self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.host
    }

    /// The machine's current state. During transition actions this is still
    /// the source state; during entry actions it is the state being entered.
    pub fn state(&self) -> &str {
        self.state
    }

    /// The engine clock.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Schedules `event` after `delay_ms`, repeating `repeat` more times.
    pub fn add_timer(
        &mut self,
        event: &str,
        delay_ms: u64,
        repeat: u32,
    ) -> Result<TimerHandle, UnknownEventError> {
        self.queue.check(event)?;
        Ok(self.timers.add(event, self.now_ms, delay_ms, repeat))
    }

    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.timers.cancel(handle)
    }

    /// Queues an event behind everything already pending.
    pub fn enqueue(&mut self, event: &str) -> Result<(), UnknownEventError> {
        self.queue.push(Event::external(event))
    }
}

/// Named host actions.
pub struct ActionRegistry<H> {
    actions: HashMap<String, ActionFn<H>>,
}

impl<H> ActionRegistry<H> {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Registers an action, returning any action it replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, action: F) -> Option<ActionFn<H>>
    where
        F: FnMut(&mut ActionContext<'_, H>, Option<&str>) -> bool + 'static,
    {
        self.actions.insert(name.into(), Box::new(action))
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: FnMut(&mut ActionContext<'_, H>, Option<&str>) -> bool + 'static,
    {
        self.register(name, action);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Resolves and calls an action.
    pub fn invoke(
        &mut self,
        action: &ActionRef,
        ctx: &mut ActionContext<'_, H>,
    ) -> Result<(), ActionError> {
        let f = self
            .actions
            .get_mut(action.name())
            .ok_or_else(|| ActionError::Unresolved {
                action: action.name().to_string(),
            })?;

        tracing::trace!(action = %action, state = ctx.state, "invoking action");
        if f(ctx, action.arg()) {
            Ok(())
        } else {
            Err(ActionError::Failed {
                action: action.name().to_string(),
                arg: action.arg().map(str::to_string),
            })
        }
    }
}

impl<H> Default for ActionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for ActionRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
