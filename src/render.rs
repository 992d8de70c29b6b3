//! Console display for the crosswalk.

use colored::{ColoredString, Colorize};
use std::fmt;
use std::str::FromStr;

/// A signal light color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Light {
    #[default]
    Red,
    Yellow,
    Green,
}

impl FromStr for Light {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" => Ok(Light::Red),
            "yel" | "yellow" => Ok(Light::Yellow),
            "grn" | "green" => Ok(Light::Green),
            other => Err(format!("unknown light color '{}'", other)),
        }
    }
}

impl fmt::Display for Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Light::Red => "red",
            Light::Yellow => "yel",
            Light::Green => "grn",
        };
        f.write_str(s)
    }
}

/// Snapshot of everything the display shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalView {
    pub traffic: Light,
    pub pedestrian: Light,
    /// Seconds left to cross, while a countdown is showing.
    pub ped_countdown: Option<i32>,
}

/// Where the crosswalk draws.
pub trait RenderSink {
    /// Appends a line to the status log.
    fn status(&mut self, message: &str);

    /// Redraws the signals.
    fn signals(&mut self, view: &SignalView);
}

/// Renders to stdout.
pub struct ConsoleRenderer {
    color: bool,
}

impl ConsoleRenderer {
    pub fn new(color: bool) -> Self {
        colored::control::set_override(color);
        Self { color }
    }

    fn lamp(&self, light: Light) -> ColoredString {
        let label = format!(" {} ", light.to_string().to_uppercase());
        if !self.color {
            return label.normal();
        }
        match light {
            Light::Red => label.white().on_red().bold(),
            Light::Yellow => label.black().on_yellow().bold(),
            Light::Green => label.black().on_green().bold(),
        }
    }
}

impl RenderSink for ConsoleRenderer {
    fn status(&mut self, message: &str) {
        println!("{}", message.dimmed());
    }

    fn signals(&mut self, view: &SignalView) {
        let countdown = match view.ped_countdown {
            Some(secs) => format!("{:>3}s", secs).bold(),
            None => " -- ".normal(),
        };
        println!(
            "  traffic [{}]   walk [{}]   {}",
            self.lamp(view.traffic),
            self.lamp(view.pedestrian),
            countdown
        );
    }
}
