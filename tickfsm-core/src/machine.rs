//! A running state machine instance.

use crate::action::{ActionContext, ActionRegistry};
use crate::definition::{ActionRef, MachineDefinition, TransitionDef};
use crate::driver::{EngineConfig, RateLimiter, TickReport};
use crate::error::{ActionError, DefinitionError, EngineError};
use crate::queue::{Event, EventQueue};
use crate::timer::{TimerHandle, TimerSet};
use crate::validate;
use std::sync::Arc;

/// Result of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub event: Event,
    pub from: String,
    /// Equal to `from` when the event was ignored.
    pub to: String,
    pub transitioned: bool,
    pub failures: Vec<ActionError>,
}

/// A state machine bound to a host context `H`.
///
/// The machine owns everything it needs: its definition, current state,
/// pending events, live timers, the host's actions and the host context those
/// actions operate on. It never blocks and never spawns threads; the host
/// drives it by calling [`process_tick`](Self::process_tick) from its own
/// loop.
///
/// Time is whatever millisecond timeline the host passes to `process_tick`,
/// conventionally measured from construction. Timers added between ticks are
/// scheduled relative to the last processed tick.
#[derive(Debug)]
pub struct Machine<H> {
    definition: Arc<MachineDefinition>,
    actions: ActionRegistry<H>,
    host: H,
    current: String,
    timers: TimerSet,
    queue: EventQueue,
    limiter: RateLimiter,
    config: EngineConfig,
    clock_ms: u64,
    bootstrap: Vec<ActionError>,
    torn_down: bool,
}

impl<H> Machine<H> {
    /// Parses `definition` and starts a machine from it.
    pub fn new(
        definition: &str,
        actions: ActionRegistry<H>,
        host: H,
        config: EngineConfig,
    ) -> Result<Self, DefinitionError> {
        let definition = MachineDefinition::from_json_str(definition)?;
        Self::from_definition(Arc::new(definition), actions, host, config)
    }

    /// Starts a machine from an already validated definition.
    ///
    /// The start state is entered and its `auto` transition taken before this
    /// returns, so [`current_state`](Self::current_state) is already the
    /// bootstrap destination.
    pub fn from_definition(
        definition: Arc<MachineDefinition>,
        actions: ActionRegistry<H>,
        host: H,
        config: EngineConfig,
    ) -> Result<Self, DefinitionError> {
        let missing = validate::unresolved_actions(&definition, |name| actions.contains(name));
        if !missing.is_empty() {
            if config.strict_actions {
                return Err(DefinitionError::UnresolvedActions { names: missing });
            }
            for name in &missing {
                tracing::warn!(action = %name, "definition references unregistered action");
            }
        }

        tracing::info!(
            checksum = %definition.checksum,
            states = definition.state_names().len(),
            events = definition.events.len(),
            tick_period_ms = config.tick_period_ms,
            "starting state machine"
        );

        let mut machine = Self {
            queue: EventQueue::new(Arc::new(definition.events.clone())),
            current: definition.initial.clone(),
            limiter: RateLimiter::new(config.tick_period_ms),
            definition,
            actions,
            host,
            timers: TimerSet::new(),
            config,
            clock_ms: 0,
            bootstrap: Vec::new(),
            torn_down: false,
        };
        machine.bootstrap();
        Ok(machine)
    }

    fn bootstrap(&mut self) {
        let definition = Arc::clone(&self.definition);
        let mut failures = Vec::new();

        if let Some(start) = definition.state(&definition.initial) {
            self.run_actions(&start.entry, &mut failures);
        }
        if let Some(auto) = definition.auto_transition() {
            self.take_transition(&definition, auto, &mut failures);
        }

        self.bootstrap = failures;
    }

    fn run_actions(&mut self, actions: &[ActionRef], failures: &mut Vec<ActionError>) {
        for action in actions {
            let mut ctx = ActionContext {
                host: &mut self.host,
                timers: &mut self.timers,
                queue: &mut self.queue,
                state: &self.current,
                now_ms: self.clock_ms,
            };
            if let Err(e) = self.actions.invoke(action, &mut ctx) {
                tracing::warn!(state = %self.current, action = %action, "{}", e);
                failures.push(e);
            }
        }
    }

    fn take_transition(
        &mut self,
        definition: &MachineDefinition,
        transition: &TransitionDef,
        failures: &mut Vec<ActionError>,
    ) {
        self.run_actions(&transition.actions, failures);

        tracing::debug!(from = %self.current, to = %transition.dest, "state change");
        self.current.clone_from(&transition.dest);

        if let Some(dest) = definition.state(&transition.dest) {
            self.run_actions(&dest.entry, failures);
        }
    }

    /// Dispatches the event at the front of the queue.
    ///
    /// Events the current state has no transition for are discarded. Returns
    /// `None` when the queue is empty.
    pub fn step(&mut self) -> Option<StepOutcome> {
        let event = self.queue.pop()?;
        let definition = Arc::clone(&self.definition);
        let from = self.current.clone();
        let mut failures = Vec::new();

        let transitioned = match definition.transition(&from, &event.name) {
            Some(transition) => {
                tracing::debug!(state = %from, event = %event.name, "handling event");
                self.take_transition(&definition, transition, &mut failures);
                true
            }
            None => {
                tracing::trace!(state = %from, event = %event.name, "event ignored");
                false
            }
        };

        Some(StepOutcome {
            event,
            from,
            to: self.current.clone(),
            transitioned,
            failures,
        })
    }

    /// Runs one rate-limited tick: fires due timers, then dispatches queued
    /// events up to the per-tick cap.
    pub fn process_tick(&mut self, now_ms: u64) -> TickReport {
        if self.torn_down || !self.limiter.ready(now_ms) {
            return TickReport::skipped();
        }
        self.limiter.record(now_ms);
        self.clock_ms = now_ms;

        let mut report = TickReport {
            processed: true,
            ..TickReport::default()
        };

        for fired in self.timers.advance(now_ms) {
            tracing::trace!(handle = %fired.handle, event = %fired.event, "timer fired");
            report.timers_fired += 1;
            if let Err(e) = self.queue.push(Event::from_timer(fired)) {
                tracing::warn!("dropping timer event: {}", e);
            }
        }

        let cap = self.config.max_events_per_tick.max(1);
        while report.events_processed < cap {
            let Some(outcome) = self.step() else {
                break;
            };
            report.events_processed += 1;
            if outcome.transitioned {
                report.transitions += 1;
            }
            report.failures.extend(outcome.failures);
        }

        report.backlog = self.queue.len();
        if report.backlog > 0 {
            tracing::warn!(
                backlog = report.backlog,
                cap,
                "per-tick event cap reached; deferring remaining events"
            );
        }

        report
    }

    /// Queues an event for the next processed tick.
    pub fn enqueue(&mut self, event: &str) -> Result<(), EngineError> {
        if self.torn_down {
            return Err(EngineError::TornDown);
        }
        self.queue.push(Event::external(event))?;
        Ok(())
    }

    /// Schedules `event` after `delay_ms`, repeating `repeat` more times.
    pub fn add_timer(
        &mut self,
        event: &str,
        delay_ms: u64,
        repeat: u32,
    ) -> Result<TimerHandle, EngineError> {
        if self.torn_down {
            return Err(EngineError::TornDown);
        }
        self.queue.check(event)?;
        Ok(self.timers.add(event, self.clock_ms, delay_ms, repeat))
    }

    /// Cancels a pending timer. Returns false if there was nothing to cancel.
    pub fn cancel_timer(&mut self, handle: TimerHandle) -> bool {
        self.timers.cancel(handle)
    }

    /// Drops all timers and pending events. Later ticks do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        tracing::info!(
            state = %self.current,
            timers = self.timers.len(),
            pending = self.queue.len(),
            "tearing down state machine"
        );
        self.timers.clear();
        self.queue.clear();
        self.torn_down = true;
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn definition(&self) -> &Arc<MachineDefinition> {
        &self.definition
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// The engine clock: `now_ms` of the last processed tick.
    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    /// Action failures from entering the start state and its `auto`
    /// transition.
    pub fn bootstrap_failures(&self) -> &[ActionError] {
        &self.bootstrap
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnknownEventError;

    const LAMP: &str = r#"{
        "events": ["toggle", "blink", "noise"],
        "states": {
            "start": {
                "entry": ["log(boot)"],
                "tran": {"auto": {"acts": ["log(auto)"], "dest": "off"}}
            },
            "off": {
                "entry": ["log(off-1)", "log(off-2)"],
                "tran": {
                    "toggle": {"acts": ["log(leaving-off)"], "dest": "on"},
                    "blink": {"acts": ["arm_blink(100)"], "dest": "off"}
                }
            },
            "on": {
                "entry": ["log(on)", "missing()", "log(after-missing)"],
                "tran": {"toggle": {"dest": "off"}}
            }
        }
    }"#;

    fn actions() -> ActionRegistry<Vec<String>> {
        ActionRegistry::new()
            .with("log", |ctx: &mut ActionContext<'_, Vec<String>>, arg| {
                ctx.host_mut().push(arg.unwrap_or_default().to_string());
                true
            })
            .with("arm_blink", |ctx: &mut ActionContext<'_, Vec<String>>, arg| {
                let Some(ms) = arg.and_then(|a| a.parse().ok()) else {
                    return false;
                };
                ctx.add_timer("toggle", ms, 0).is_ok()
            })
    }

    fn lamp() -> Machine<Vec<String>> {
        Machine::new(LAMP, actions(), Vec::new(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_bootstrap_runs_start_entry_and_auto() {
        let machine = lamp();
        assert_eq!(machine.current_state(), "off");
        assert_eq!(machine.host(), &vec!["boot", "auto", "off-1", "off-2"]);
        assert!(machine.bootstrap_failures().is_empty());
    }

    #[test]
    fn test_transition_then_entry_order() {
        let mut machine = lamp();
        machine.host_mut().clear();

        machine.enqueue("toggle").unwrap();
        let outcome = machine.step().unwrap();

        assert!(outcome.transitioned);
        assert_eq!(outcome.from, "off");
        assert_eq!(outcome.to, "on");
        assert_eq!(machine.current_state(), "on");
        // The unresolved action is reported but does not stop the sequence.
        assert_eq!(machine.host(), &vec!["leaving-off", "on", "after-missing"]);
        assert_eq!(
            outcome.failures,
            vec![ActionError::Unresolved {
                action: "missing".to_string()
            }]
        );
    }

    #[test]
    fn test_unhandled_event_is_discarded() {
        let mut machine = lamp();
        machine.enqueue("noise").unwrap();
        machine.enqueue("toggle").unwrap();
        assert_eq!(machine.pending_events(), 2);

        let outcome = machine.step().unwrap();
        assert!(!outcome.transitioned);
        assert_eq!(outcome.to, "off");
        assert_eq!(machine.current_state(), "off");
        assert_eq!(machine.pending_events(), 1);
    }

    #[test]
    fn test_step_on_empty_queue() {
        let mut machine = lamp();
        assert!(machine.step().is_none());
    }

    #[test]
    fn test_unknown_event_rejected() {
        let mut machine = lamp();
        let err = machine.enqueue("explode").unwrap_err();
        assert!(matches!(
            err,
            EngineError::UnknownEvent(UnknownEventError { ref event }) if event == "explode"
        ));
        assert_eq!(machine.pending_events(), 0);

        // "auto" is not an event hosts can send.
        assert!(machine.enqueue("auto").is_err());
        assert!(machine.add_timer("explode", 10, 0).is_err());
    }

    #[test]
    fn test_self_loop_runs_entry_again() {
        let mut machine = lamp();
        machine.host_mut().clear();

        machine.enqueue("blink").unwrap();
        let report = machine.process_tick(0);
        assert_eq!(report.transitions, 1);
        assert_eq!(machine.current_state(), "off");
        assert_eq!(machine.host(), &vec!["off-1", "off-2"]);
        assert_eq!(machine.timers().len(), 1);

        // The action's timer toggles the lamp 100ms later.
        machine.process_tick(60);
        assert_eq!(machine.current_state(), "off");
        let report = machine.process_tick(110);
        assert_eq!(report.timers_fired, 1);
        assert_eq!(machine.current_state(), "on");
        assert!(machine.timers().is_empty());
    }

    #[test]
    fn test_rate_limited_tick() {
        let mut machine = Machine::new(
            LAMP,
            actions(),
            Vec::new(),
            EngineConfig::default().with_tick_period_ms(50),
        )
        .unwrap();

        assert!(machine.process_tick(0).processed);

        machine.enqueue("toggle").unwrap();
        let report = machine.process_tick(49);
        assert_eq!(report, TickReport::skipped());
        assert_eq!(machine.current_state(), "off");
        assert_eq!(machine.pending_events(), 1);

        let report = machine.process_tick(50);
        assert!(report.processed);
        assert_eq!(report.events_processed, 1);
        assert_eq!(machine.current_state(), "on");
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn test_timer_not_advanced_while_rate_limited() {
        let mut machine = lamp();
        machine.process_tick(0);
        machine.add_timer("toggle", 10, 0).unwrap();

        assert_eq!(machine.process_tick(20).timers_fired, 0);
        assert_eq!(machine.timers().len(), 1);
        assert_eq!(machine.process_tick(50).timers_fired, 1);
    }

    #[test]
    fn test_per_tick_cap() {
        let mut machine = Machine::new(
            LAMP,
            actions(),
            Vec::new(),
            EngineConfig::default().with_max_events_per_tick(3),
        )
        .unwrap();
        for _ in 0..5 {
            machine.enqueue("toggle").unwrap();
        }

        let report = machine.process_tick(0);
        assert_eq!(report.events_processed, 3);
        assert_eq!(report.backlog, 2);
        assert_eq!(machine.current_state(), "on");

        let report = machine.process_tick(50);
        assert_eq!(report.events_processed, 2);
        assert_eq!(report.backlog, 0);
        assert_eq!(machine.current_state(), "on");
    }

    #[test]
    fn test_self_enqueuing_action_is_bounded() {
        let definition = r#"{
            "events": ["again"],
            "states": {
                "start": {"tran": {"auto": {"dest": "loop"}}},
                "loop": {"tran": {"again": {"acts": ["requeue()"], "dest": "loop"}}}
            }
        }"#;
        let actions = ActionRegistry::new().with("requeue", |ctx: &mut ActionContext<'_, u32>, _| {
            *ctx.host_mut() += 1;
            ctx.enqueue("again").is_ok()
        });
        let mut machine = Machine::new(
            definition,
            actions,
            0u32,
            EngineConfig::default().with_max_events_per_tick(10),
        )
        .unwrap();

        machine.enqueue("again").unwrap();
        let report = machine.process_tick(0);
        assert_eq!(report.events_processed, 10);
        assert_eq!(report.backlog, 1);
        assert_eq!(*machine.host(), 10);
    }

    #[test]
    fn test_strict_actions() {
        let result = Machine::new(
            LAMP,
            actions(),
            Vec::new(),
            EngineConfig::default().with_strict_actions(true),
        );
        assert!(matches!(
            result,
            Err(DefinitionError::UnresolvedActions { ref names }) if names == &vec!["missing".to_string()]
        ));
    }

    #[test]
    fn test_invalid_definition_is_fatal() {
        let result = Machine::new("{}", actions(), Vec::new(), EngineConfig::default());
        assert!(matches!(result, Err(DefinitionError::Parse(_))));
    }

    #[test]
    fn test_bootstrap_failures_recorded() {
        let mut actions = actions();
        actions.register("log", |_: &mut ActionContext<'_, Vec<String>>, _| false);
        let machine = Machine::new(LAMP, actions, Vec::new(), EngineConfig::default()).unwrap();

        assert_eq!(machine.current_state(), "off");
        assert_eq!(machine.bootstrap_failures().len(), 4);
    }

    #[test]
    fn test_cancel_timer() {
        let mut machine = lamp();
        let handle = machine.add_timer("toggle", 100, 0).unwrap();
        assert!(machine.cancel_timer(handle));

        machine.process_tick(200);
        assert_eq!(machine.current_state(), "off");
        assert!(!machine.cancel_timer(handle));
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut machine = lamp();
        machine.add_timer("toggle", 100, 3).unwrap();
        machine.enqueue("toggle").unwrap();

        machine.teardown();
        machine.teardown();

        assert!(machine.is_torn_down());
        assert!(machine.timers().is_empty());
        assert_eq!(machine.pending_events(), 0);
        assert!(!machine.process_tick(1000).processed);
        assert!(matches!(machine.enqueue("toggle"), Err(EngineError::TornDown)));
        assert!(matches!(
            machine.add_timer("toggle", 1, 0),
            Err(EngineError::TornDown)
        ));
    }
}
