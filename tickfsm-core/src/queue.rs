//! Pending event queue.

use crate::error::UnknownEventError;
use crate::timer::{FiredTimer, TimerHandle};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Where an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Enqueued by the host or by an action.
    External,
    /// Injected by a timer fire.
    Timer {
        handle: TimerHandle,
        /// Fires left on the timer after this one.
        remaining: u32,
    },
}

/// A queued event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub source: EventSource,
}

impl Event {
    pub fn external(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EventSource::External,
        }
    }

    pub fn from_timer(fired: FiredTimer) -> Self {
        Self {
            name: fired.event,
            source: EventSource::Timer {
                handle: fired.handle,
                remaining: fired.remaining,
            },
        }
    }
}

/// FIFO of events, restricted to a declared event set.
#[derive(Debug)]
pub struct EventQueue {
    declared: Arc<HashSet<String>>,
    pending: VecDeque<Event>,
}

impl EventQueue {
    pub fn new(declared: Arc<HashSet<String>>) -> Self {
        Self {
            declared,
            pending: VecDeque::new(),
        }
    }

    /// Returns an error unless `event` is declared.
    pub fn check(&self, event: &str) -> Result<(), UnknownEventError> {
        if self.declared.contains(event) {
            Ok(())
        } else {
            Err(UnknownEventError::new(event))
        }
    }

    /// Appends an event to the back of the queue.
    pub fn push(&mut self, event: Event) -> Result<(), UnknownEventError> {
        self.check(&event.name)?;
        self.pending.push_back(event);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Iterates pending events front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.pending.iter()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> EventQueue {
        let declared = ["a", "b"].iter().map(|s| s.to_string()).collect();
        EventQueue::new(Arc::new(declared))
    }

    #[test]
    fn test_fifo_order() {
        let mut q = queue();
        q.push(Event::external("b")).unwrap();
        q.push(Event::external("a")).unwrap();
        q.push(Event::external("b")).unwrap();

        let names: Vec<String> = std::iter::from_fn(|| q.pop()).map(|e| e.name).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_rejects_undeclared() {
        let mut q = queue();
        let err = q.push(Event::external("c")).unwrap_err();
        assert_eq!(err, UnknownEventError::new("c"));
        assert_eq!(q.len(), 0);
    }
}
