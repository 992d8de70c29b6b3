//! Property-based tests for the engine.
//!
//! These tests use proptest to verify properties hold across
//! many randomly generated machines, timers and tick schedules.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tickfsm_core::{ActionContext, ActionRegistry, EngineConfig, Machine, TimerSet};

/// A random machine: `table[state][event]` is the destination, if any.
#[derive(Debug, Clone)]
struct Shape {
    states: usize,
    events: usize,
    table: Vec<Vec<Option<usize>>>,
}

prop_compose! {
    fn arbitrary_shape()(states in 1..6usize, events in 1..4usize)
        (table in prop::collection::vec(
            prop::collection::vec(prop::option::of(0..states), events),
            states,
        ), states in Just(states), events in Just(events)) -> Shape {
        Shape { states, events, table }
    }
}

fn definition(shape: &Shape) -> Value {
    let mut states = Map::new();
    states.insert(
        "start".to_string(),
        json!({"tran": {"auto": {"dest": "s0"}}}),
    );
    for (s, row) in shape.table.iter().enumerate() {
        let mut tran = Map::new();
        for (e, dest) in row.iter().enumerate() {
            if let Some(d) = dest {
                tran.insert(
                    format!("e{}", e),
                    json!({"acts": [format!("note(t{})", s)], "dest": format!("s{}", d)}),
                );
            }
        }
        states.insert(
            format!("s{}", s),
            json!({"entry": [format!("note(s{})", s)], "tran": tran}),
        );
    }
    json!({
        "events": (0..shape.events).map(|e| format!("e{}", e)).collect::<Vec<_>>(),
        "states": states,
    })
}

fn recorder() -> ActionRegistry<Vec<String>> {
    ActionRegistry::new().with("note", |ctx: &mut ActionContext<'_, Vec<String>>, arg| {
        ctx.host_mut().push(arg.unwrap_or_default().to_string());
        true
    })
}

fn machine(shape: &Shape) -> Machine<Vec<String>> {
    Machine::new(
        &definition(shape).to_string(),
        recorder(),
        Vec::new(),
        EngineConfig::default(),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn construction_lands_on_auto_destination(shape in arbitrary_shape()) {
        let m = machine(&shape);
        prop_assert_eq!(m.current_state(), "s0");
        prop_assert_eq!(m.host(), &vec!["s0".to_string()]);
    }

    #[test]
    fn dispatch_follows_transition_table(
        shape in arbitrary_shape(),
        seq in prop::collection::vec(0..4usize, 0..40),
    ) {
        let mut m = machine(&shape);
        let mut current = 0usize;

        for e in seq.into_iter().map(|e| e % shape.events) {
            m.host_mut().clear();
            m.enqueue(&format!("e{}", e)).unwrap();
            let before = m.pending_events();
            let outcome = m.step().unwrap();
            prop_assert_eq!(m.pending_events(), before - 1);

            match shape.table[current][e] {
                Some(dest) => {
                    prop_assert!(outcome.transitioned);
                    // Transition action, then the destination's entry exactly once.
                    prop_assert_eq!(
                        m.host(),
                        &vec![format!("t{}", current), format!("s{}", dest)]
                    );
                    current = dest;
                }
                None => {
                    prop_assert!(!outcome.transitioned);
                    prop_assert!(m.host().is_empty());
                }
            }
            let expected = format!("s{}", current);
            prop_assert_eq!(m.current_state(), expected.as_str());
        }
    }

    #[test]
    fn repeating_timer_fires_n_plus_one_times(
        repeat in 0..20u32,
        delay in 1..500u64,
        stride in 1..120u64,
    ) {
        let mut timers = TimerSet::new();
        let handle = timers.add("tick", 0, delay, repeat);

        let mut now = 0;
        let mut fire_times = Vec::new();
        while timers.contains(handle) {
            now += stride;
            for _ in timers.advance(now) {
                fire_times.push(now);
            }
        }

        prop_assert_eq!(fire_times.len(), repeat as usize + 1);
        prop_assert!(fire_times[0] >= delay);
        for pair in fire_times.windows(2) {
            prop_assert!(pair[1] - pair[0] >= delay);
        }
    }

    #[test]
    fn tick_within_period_does_nothing(
        period in 1..1000u64,
        start in 0..10_000u64,
        offset in 0..1000u64,
    ) {
        let offset = offset % period;
        let shape = Shape { states: 1, events: 1, table: vec![vec![Some(0)]] };
        let mut m = Machine::new(
            &definition(&shape).to_string(),
            recorder(),
            Vec::new(),
            EngineConfig::default().with_tick_period_ms(period),
        )
        .unwrap();

        prop_assert!(m.process_tick(start).processed);
        m.add_timer("e0", 0, 0).unwrap();
        m.enqueue("e0").unwrap();

        let report = m.process_tick(start + offset);
        prop_assert!(!report.processed);
        prop_assert_eq!(report.timers_fired, 0);
        prop_assert_eq!(m.pending_events(), 1);
        prop_assert_eq!(m.timers().len(), 1);

        let report = m.process_tick(start + period);
        prop_assert!(report.processed);
        prop_assert_eq!(report.events_processed, 2);
    }
}
