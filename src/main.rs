//! # Lodestar - Wayland compositor in the Window Maker tradition
//!
//! The binary loads the configuration, builds the [`Server`] and drives it
//! from a calloop event loop: SIGCHLD reaps children, SIGINT and SIGTERM
//! stop the loop, and a timer runs the idle lock and the hot corners.
//!
//! Outputs given with `--output` are headless; a client bridge feeds the
//! same [`Server`] entry points when one is attached.

use anyhow::{anyhow, Result};
use calloop::signals::{Signal, Signals};
use calloop::timer::{TimeoutAction, Timer};
use calloop::EventLoop;
use clap::Parser;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use lodestar::config::{load_output_state, OutputConfig};
use lodestar::geometry::Size;
use lodestar::protocol::headless::{HeadlessSeat, HeadlessSession};
use lodestar::{Config, Server};

/// Timer period while neither the idle lock nor a hot corner is pending.
const IDLE_TICK: Duration = Duration::from_secs(1);
const MIN_TICK: Duration = Duration::from_millis(10);

/// A `WIDTHxHEIGHT[@SCALE]` output.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OutputArg {
    mode: Size,
    scale: Option<f64>,
}

fn parse_output(text: &str) -> Result<OutputArg, String> {
    let (mode, scale) = match text.split_once('@') {
        Some((mode, scale)) => (mode, Some(scale)),
        None => (text, None),
    };
    let (width, height) = mode
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got \"{}\"", mode))?;
    let width: i32 = width.parse().map_err(|_| format!("bad width \"{}\"", width))?;
    let height: i32 = height.parse().map_err(|_| format!("bad height \"{}\"", height))?;
    if width <= 0 || height <= 0 {
        return Err(format!("empty mode {}x{}", width, height));
    }
    let scale = scale
        .map(|s| s.parse::<f64>().map_err(|_| format!("bad scale \"{}\"", s)))
        .transpose()?;
    Ok(OutputArg {
        mode: Size::new(width, height),
        scale,
    })
}

#[derive(Parser)]
#[command(name = "lodestar")]
#[command(about = "A Wayland compositor in the NeXTSTEP / Window Maker tradition")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/lodestar/lodestar.plist")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Add a headless output, WIDTHxHEIGHT[@SCALE] (repeatable)
    #[arg(long = "output", value_parser = parse_output)]
    outputs: Vec<OutputArg>,

    /// State file for output scale and position
    #[arg(long)]
    state: Option<PathBuf>,

    /// Shell command to run once the server is up (repeatable)
    #[arg(short, long)]
    start: Vec<String>,
}

fn output_name(index: usize) -> String {
    format!("HEADLESS-{}", index + 1)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting Lodestar");
    info!("📄 Version: {}", env!("CARGO_PKG_VERSION"));
    debug!(
        "Built {} for {} ({})",
        env!("BUILD_DATE"),
        env!("TARGET_TRIPLE"),
        option_env!("GIT_COMMIT").unwrap_or("unknown commit")
    );

    // Load configuration
    let mut config = match Config::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {:#}", e);
            info!("📝 Using built-in configuration");
            Config::builtin()?
        }
    };

    if let Some(path) = &cli.state {
        match load_output_state(path) {
            Ok(state) => config.merge_output_state(state),
            Err(e) => warn!("⚠️ Ignoring output state: {:#}", e),
        }
    }
    for (index, output) in cli.outputs.iter().enumerate() {
        if let Some(scale) = output.scale {
            config
                .outputs
                .entry(output_name(index))
                .or_insert_with(OutputConfig::default)
                .scale = scale;
        }
    }

    let mut event_loop: EventLoop<'static, Server> = EventLoop::try_new()?;
    let handle = event_loop.handle();

    let mut server = Server::new(
        config,
        Box::new(HeadlessSeat::new()),
        Box::new(HeadlessSession::new()),
    )?;
    if let Some(path) = cli.state.clone() {
        server = server.with_state_path(path);
    }
    server.attach_event_loop(handle.clone(), event_loop.get_signal());

    let signals = Signals::new(&[Signal::SIGCHLD, Signal::SIGINT, Signal::SIGTERM])?;
    handle
        .insert_source(signals, |event, _, server: &mut Server| match event.signal() {
            Signal::SIGCHLD => {
                for (id, termination) in server.reap_children() {
                    debug!("{} {}", id, termination);
                }
            }
            signal => {
                info!("🛑 Received {:?}", signal);
                server.execute(&lodestar::BoundAction::new(lodestar::Action::Quit));
            }
        })
        .map_err(|e| anyhow!("Failed to watch signals: {}", e.error))?;

    handle
        .insert_source(Timer::immediate(), |_, _, server: &mut Server| {
            let next = server.tick(Instant::now()).unwrap_or(IDLE_TICK);
            TimeoutAction::ToDuration(next.max(MIN_TICK))
        })
        .map_err(|e| anyhow!("Failed to arm the timer: {}", e.error))?;

    if cli.outputs.is_empty() {
        warn!("⚠️ No outputs; pass --output WIDTHxHEIGHT to add one");
    }
    for (index, output) in cli.outputs.iter().enumerate() {
        server.output_added(&output_name(index), output.mode);
    }
    for command in &cli.start {
        server.run_command(command);
    }

    info!("✨ Lodestar is ready!");
    event_loop.run(None, &mut server, |server| {
        if !server.is_running() {
            debug!("Loop iteration after quit");
        }
    })?;

    info!("👋 Lodestar shutting down");
    Ok(())
}
