//! Timers that inject events into a machine.
//!
//! Times are plain milliseconds on the host's timeline. A timer added with
//! `repeat = N` fires `N + 1` times; each re-arm is relative to the time the
//! previous fire was processed, not to its original schedule, so periodic
//! timers drift by up to one tick period per fire.

use std::collections::BTreeMap;
use std::fmt;

/// Handle identifying a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    /// Event injected on each fire.
    pub event: String,
    /// Delay between arming and firing.
    pub delay_ms: u64,
    /// Fires left after the next one.
    pub remaining: u32,
    /// Time of the next fire.
    pub due_ms: u64,
}

/// A timer fire produced by [`TimerSet::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub event: String,
    /// Fires left after this one; 0 means the timer was retired.
    pub remaining: u32,
}

/// The live timers of one machine.
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: BTreeMap<TimerHandle, Timer>,
    next_id: u64,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `event` to fire `delay_ms` after `now_ms`, then `repeat`
    /// more times at the same delay.
    pub fn add(
        &mut self,
        event: impl Into<String>,
        now_ms: u64,
        delay_ms: u64,
        repeat: u32,
    ) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        let timer = Timer {
            event: event.into(),
            delay_ms,
            remaining: repeat,
            due_ms: now_ms.saturating_add(delay_ms),
        };
        tracing::trace!(
            %handle,
            event = %timer.event,
            due_ms = timer.due_ms,
            repeat,
            "timer armed"
        );
        self.timers.insert(handle, timer);
        handle
    }

    /// Removes a pending timer. Returns false if it already retired or never
    /// existed.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let removed = self.timers.remove(&handle).is_some();
        if removed {
            tracing::trace!(%handle, "timer cancelled");
        }
        removed
    }

    /// Fires every timer due at or before `now_ms`, each at most once.
    ///
    /// Fires are returned ordered by due time, then by registration order.
    /// Exhausted timers are removed; the rest are re-armed at
    /// `now_ms + delay_ms`.
    pub fn advance(&mut self, now_ms: u64) -> Vec<FiredTimer> {
        let mut due: Vec<(u64, TimerHandle)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.due_ms <= now_ms)
            .map(|(h, t)| (t.due_ms, *h))
            .collect();
        due.sort_unstable();

        let mut fired = Vec::with_capacity(due.len());
        for (_, handle) in due {
            let Some(timer) = self.timers.get_mut(&handle) else {
                continue;
            };

            if timer.remaining == 0 {
                if let Some(timer) = self.timers.remove(&handle) {
                    fired.push(FiredTimer {
                        handle,
                        event: timer.event,
                        remaining: 0,
                    });
                }
            } else {
                timer.remaining -= 1;
                timer.due_ms = now_ms.saturating_add(timer.delay_ms);
                fired.push(FiredTimer {
                    handle,
                    event: timer.event.clone(),
                    remaining: timer.remaining + 1,
                });
            }
        }
        fired
    }

    pub fn get(&self, handle: TimerHandle) -> Option<&Timer> {
        self.timers.get(&handle)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    /// Fires left after the next one, if the timer is still live.
    pub fn remaining(&self, handle: TimerHandle) -> Option<u32> {
        self.timers.get(&handle).map(|t| t.remaining)
    }

    /// Earliest due time among live timers.
    pub fn next_due(&self) -> Option<u64> {
        self.timers.values().map(|t| t.due_ms).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Iterates live timers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (TimerHandle, &Timer)> {
        self.timers.iter().map(|(h, t)| (*h, t))
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}
