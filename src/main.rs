//! tickfsm - Crosswalk Light Simulator
//!
//! Drives the pedestrian crosswalk state machine from a console. Type `b`
//! (then Enter) to request a crossing, `q` to quit.

mod config;
mod crosswalk;
mod render;

use clap::Parser;
use config::Config;
use render::ConsoleRenderer;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tickfsm")]
#[command(about = "Pedestrian crosswalk simulator driven by a declarative state machine")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "TICKFSM_CONFIG")]
    config: Option<PathBuf>,

    /// Machine definition JSON file (defaults to the built-in crosswalk)
    #[arg(short, long)]
    definition: Option<PathBuf>,

    /// Minimum engine tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Press the crossing button at these times (ms since start)
    #[arg(long, value_delimiter = ',')]
    push_at: Vec<u64>,

    /// Exit after this many milliseconds
    #[arg(long)]
    run_for: Option<u64>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Debug)]
enum Input {
    Button,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the display.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let mut c = Config::from_file(path).inspect_err(|e| {
                tracing::error!("Failed to load config: {}", e);
            })?;
            c.apply_env_overrides();
            tracing::info!("Loaded config from {}", path.display());
            c
        }
        None => Config::load()?,
    };

    if let Some(path) = cli.definition {
        config.simulator.definition = Some(path);
    }
    if let Some(ms) = cli.tick_ms {
        config.engine.tick_period_ms = ms;
    }
    if !cli.push_at.is_empty() {
        config.simulator.push_at_ms = cli.push_at;
    }
    if cli.run_for.is_some() {
        config.simulator.run_for_ms = cli.run_for;
    }
    if cli.no_color {
        config.simulator.color = false;
    }
    config.validate()?;

    let definition = match &config.simulator.definition {
        Some(path) => {
            tracing::info!("Loading machine definition from {}", path.display());
            std::fs::read_to_string(path)?
        }
        None => crosswalk::DEFINITION.to_string(),
    };

    tracing::info!("Starting crosswalk simulator");
    tracing::info!("  Tick period: {}ms", config.engine.tick_period_ms);
    tracing::info!("  Max events per tick: {}", config.engine.max_events_per_tick);

    let renderer = ConsoleRenderer::new(config.simulator.color);
    let mut machine =
        crosswalk::build(&definition, Box::new(renderer), config.engine.clone()).inspect_err(
            |e| {
                tracing::error!("Invalid machine definition: {}", e);
            },
        )?;

    let host = machine.host_mut();
    host.status("-----------------------------");
    host.status("| Crosswalk Light Simulator |");
    host.status("-----------------------------");
    host.status("");
    host.status("Type 'b' + Enter to request a crossing, 'q' + Enter to exit simulation.");
    host.status("");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let interactive = config.simulator.run_for_ms.is_none();
    tokio::spawn(read_keys(tx, interactive));

    let mut scripted: VecDeque<u64> = {
        let mut pushes = config.simulator.push_at_ms.clone();
        pushes.sort_unstable();
        pushes.into()
    };

    let started = Instant::now();
    let mut poll = tokio::time::interval(config.simulator.poll_interval());
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let now_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                while scripted.front().is_some_and(|&at| at <= now_ms) {
                    scripted.pop_front();
                    push_button(&mut machine);
                }

                let report = machine.process_tick(now_ms);
                if report.transitions > 0 {
                    tracing::debug!(
                        state = machine.current_state(),
                        events = report.events_processed,
                        "tick processed"
                    );
                }

                if config.simulator.run_for_ms.is_some_and(|limit| now_ms >= limit) {
                    tracing::info!("Run time elapsed");
                    break;
                }
            }
            Some(input) = rx.recv() => match input {
                Input::Button => push_button(&mut machine),
                Input::Quit => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                break;
            }
        }
    }

    machine.host_mut().status("Exiting simulation.");
    machine.teardown();
    Ok(())
}

fn push_button(machine: &mut tickfsm_core::Machine<crosswalk::Crosswalk>) {
    match machine.enqueue(crosswalk::BUTTON_PUSH) {
        Ok(()) => machine
            .host_mut()
            .status("You pressed the crossing request button."),
        Err(e) => tracing::warn!("Button press dropped: {}", e),
    }
}

/// Forwards keyboard lines to the main loop. End of input quits only when
/// the run is interactive.
async fn read_keys(tx: mpsc::UnboundedSender<Input>, interactive: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "b" | "B" => Input::Button,
                "q" | "Q" => Input::Quit,
                _ => continue,
            },
            Ok(None) => {
                if !interactive {
                    return;
                }
                Input::Quit
            }
            Err(e) => {
                tracing::warn!("Failed to read input: {}", e);
                return;
            }
        };
        let quit = matches!(input, Input::Quit);
        if tx.send(input).is_err() || quit {
            return;
        }
    }
}
