//! The pedestrian crosswalk: host context, actions and built-in definition.
//!
//! Not a safety-critical controller. It exists to exercise the engine:
//! entry and transition actions, one-shot countdowns, a repeating
//! one-second timer and a self-loop.

use crate::render::{Light, RenderSink, SignalView};
use tickfsm_core::{ActionContext, ActionRegistry, DefinitionError, EngineConfig, Machine};

/// Built-in machine definition.
pub const DEFINITION: &str = r#"{
  "events": ["button_push", "countdown_complete", "one_second"],
  "initial": "start",
  "states": {
    "start": {
      "tran": {"auto": {"dest": "Traffic Flowing"}}
    },
    "Traffic Flowing": {
      "entry": ["set_traf_light(grn)", "set_ped_light(red)"],
      "tran": {"button_push": {"dest": "Traffic Stopping"}}
    },
    "Traffic Stopping": {
      "entry": ["set_traf_light(yel)", "start_countdown(5)"],
      "tran": {"countdown_complete": {"dest": "Pedestrian Crossing"}}
    },
    "Pedestrian Crossing": {
      "entry": ["set_traf_light(red)", "set_ped_light(grn)", "start_countdown(5)"],
      "tran": {
        "countdown_complete": {
          "acts": ["set_ped_light(yel)", "start_countdown(10)", "start_ped_time(10)"],
          "dest": "Crossing Countdown"
        }
      }
    },
    "Crossing Countdown": {
      "tran": {
        "one_second": {"acts": ["update_ped_time()"], "dest": "Crossing Countdown"},
        "countdown_complete": {"acts": ["update_ped_time()"], "dest": "Traffic Flowing"}
      }
    }
  }
}"#;

pub const BUTTON_PUSH: &str = "button_push";
const COUNTDOWN_COMPLETE: &str = "countdown_complete";
const ONE_SECOND: &str = "one_second";

/// Host state the crosswalk actions operate on.
pub struct Crosswalk {
    pub traffic: Light,
    pub pedestrian: Light,
    /// Seconds shown on the pedestrian countdown. Independent of the
    /// engine's timer bookkeeping.
    pub ped_countdown: i32,
    sink: Box<dyn RenderSink>,
}

impl Crosswalk {
    pub fn new(sink: Box<dyn RenderSink>) -> Self {
        Self {
            traffic: Light::Red,
            pedestrian: Light::Red,
            ped_countdown: 0,
            sink,
        }
    }

    pub fn view(&self) -> SignalView {
        SignalView {
            traffic: self.traffic,
            pedestrian: self.pedestrian,
            ped_countdown: (self.pedestrian != Light::Red).then_some(self.ped_countdown),
        }
    }

    pub fn status(&mut self, message: &str) {
        self.sink.status(message);
    }

    fn redraw(&mut self) {
        let view = self.view();
        self.sink.signals(&view);
    }

    fn set_traffic(&mut self, light: Light) {
        self.status(&format!("Setting traffic light to {}.", light));
        self.traffic = light;
        self.redraw();
    }

    fn set_pedestrian(&mut self, light: Light) {
        self.status(&format!("Setting pedestrian light to {}.", light));
        self.pedestrian = light;
        self.redraw();
    }

    fn tick_ped_time(&mut self) {
        self.ped_countdown -= 1;
        self.status(&format!(
            "Showing pedestrian countdown of {} seconds.",
            self.ped_countdown
        ));
        self.redraw();
    }
}

type Ctx<'a> = ActionContext<'a, Crosswalk>;

fn parse_arg<T: std::str::FromStr>(action: &str, arg: Option<&str>) -> Option<T> {
    let parsed = arg.and_then(|a| a.parse().ok());
    if parsed.is_none() {
        tracing::warn!(action, arg = arg.unwrap_or(""), "bad action argument");
    }
    parsed
}

fn set_traf_light(ctx: &mut Ctx<'_>, arg: Option<&str>) -> bool {
    let Some(light) = parse_arg::<Light>("set_traf_light", arg) else {
        return false;
    };
    ctx.host_mut().set_traffic(light);
    true
}

fn set_ped_light(ctx: &mut Ctx<'_>, arg: Option<&str>) -> bool {
    let Some(light) = parse_arg::<Light>("set_ped_light", arg) else {
        return false;
    };
    ctx.host_mut().set_pedestrian(light);
    true
}

fn start_countdown(ctx: &mut Ctx<'_>, arg: Option<&str>) -> bool {
    let Some(secs) = parse_arg::<u64>("start_countdown", arg) else {
        return false;
    };
    let Some(delay_ms) = secs.checked_mul(1000) else {
        tracing::warn!(secs, "countdown too long");
        return false;
    };
    ctx.add_timer(COUNTDOWN_COMPLETE, delay_ms, 0).is_ok()
}

fn start_ped_time(ctx: &mut Ctx<'_>, arg: Option<&str>) -> bool {
    let Some(secs) = parse_arg::<u32>("start_ped_time", arg) else {
        return false;
    };
    ctx.host_mut().ped_countdown = i32::try_from(secs).unwrap_or(i32::MAX);
    if ctx.add_timer(ONE_SECOND, 1000, secs).is_err() {
        return false;
    }
    update_ped_time(ctx, None)
}

fn update_ped_time(ctx: &mut Ctx<'_>, _arg: Option<&str>) -> bool {
    ctx.host_mut().tick_ped_time();
    true
}

/// The crosswalk's action table.
pub fn actions() -> ActionRegistry<Crosswalk> {
    ActionRegistry::new()
        .with("set_traf_light", set_traf_light)
        .with("set_ped_light", set_ped_light)
        .with("start_countdown", start_countdown)
        .with("start_ped_time", start_ped_time)
        .with("update_ped_time", update_ped_time)
}

/// Starts a crosswalk machine drawing into `sink`.
pub fn build(
    definition: &str,
    sink: Box<dyn RenderSink>,
    config: EngineConfig,
) -> Result<Machine<Crosswalk>, DefinitionError> {
    Machine::new(definition, actions(), Crosswalk::new(sink), config)
}
