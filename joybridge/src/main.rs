//! # Joybridge Binary
//!
//! Joystick to fieldbus process image bridge running as a controlled node.
//!
//! # Usage
//!
//! ```bash
//! # Node 1, ask for the network interface, read /dev/input/js0
//! joybridge
//!
//! # Node 12 on eth1 with a second joystick
//! joybridge -n 12 -d eth1 -j /dev/input/js1
//!
//! # Cyclic exchange from a dedicated thread, verbose JSON logs
//! joybridge -d eth1 --sync-thread -v --json 2> bridge.log
//!
//! # Less frequently changed parameters from a file
//! joybridge --config /etc/joybridge.toml
//! ```

use clap::Parser;
use joybridge::bridge;
use joybridge::exchange::{CyclicExchange, SyncThread};
use joybridge::multiplexer::{BridgeContext, CycleDriver, EventLoop, ExitReason, FdPoller};
use joybridge::netselect::{self, SYS_CLASS_NET};
use joybridge::screen::{Screen, TerminalScreen};
use joybridge::stack::StackRegistry;
use joybridge::{JoystickDevice, SharedStateMirror};
use joybridge_common::config::{BridgeConfig, ConfigLoader, LogLevel, SyncStrategy};
use joybridge_common::fieldbus::InitParams;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// Joybridge - joystick to fieldbus process image bridge
#[derive(Parser, Debug)]
#[command(name = "joybridge")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Joystick to fieldbus process image bridge")]
#[command(long_about = None)]
struct Args {
    /// Node id of this controlled node (default 1).
    #[arg(short = 'n', long = "node-id", value_name = "NODE_ID")]
    node_id: Option<u8>,

    /// Ethernet device name, e.g. eth1. If skipped the program prompts
    /// for the interface.
    #[arg(short = 'd', long = "device", value_name = "DEV_NAME")]
    device_name: Option<String>,

    /// Joystick device name (default /dev/input/js0).
    #[arg(short = 'j', long = "joystick", value_name = "JS_DEV_NAME")]
    joystick: Option<PathBuf>,

    /// Optional TOML configuration file. Command-line options win.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run the cyclic exchange from a dedicated thread.
    #[arg(long)]
    sync_thread: bool,

    /// Exchange the outbound image before the inbound one every cycle.
    #[arg(long)]
    drive_outputs: bool,

    /// Main loop tick / screen refresh interval.
    #[arg(long, value_name = "MS")]
    tick_ms: Option<u64>,

    /// Fieldbus stack to use.
    #[arg(long, default_value = "simulation")]
    stack: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match run() {
        Ok(reason) if reason.is_failure() => std::process::exit(1),
        Ok(_) => Ok(()),
        Err(e) => {
            error!("joybridge failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run() -> Result<ExitReason, Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = args.config.as_deref().map(BridgeConfig::load).transpose();
    let log_level = match &loaded {
        Ok(Some(config)) => config.shared.log_level,
        _ => LogLevel::default(),
    };
    setup_tracing(&args, log_level);

    let mut config = loaded?.unwrap_or_default();
    apply_args(&mut config, &args);
    config.validate()?;

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let registry = StackRegistry::builtin();
    let stack = registry.create(&args.stack)?;

    let device_name = if config.fieldbus.device_name.is_empty() {
        let interfaces = netselect::list_interfaces(Path::new(SYS_CLASS_NET))?;
        netselect::select_interface(&interfaces, io::stdin().lock(), io::stdout())?
    } else {
        config.fieldbus.device_name.clone()
    };

    // Installed after the prompt so Ctrl-C still aborts an unanswered one.
    let terminate = Arc::new(AtomicBool::new(false));
    {
        let terminate = Arc::clone(&terminate);
        ctrlc::set_handler(move || {
            terminate.store(true, Ordering::SeqCst);
        })?;
    }

    let params = InitParams::for_node(&config.fieldbus, &device_name);
    let ack_timeout = config.fieldbus.switch_off_timeout();
    let device = bridge::start(
        stack.as_ref(),
        &params,
        &config.bridge.joystick_device,
        ack_timeout,
    )?;

    let mirror = Arc::new(SharedStateMirror::new());
    let ctx = BridgeContext {
        stack: Arc::clone(&stack),
        mirror: Arc::clone(&mirror),
        terminate,
        switch_off_timeout: ack_timeout,
    };

    let exchange = CyclicExchange::new(Arc::clone(&stack), mirror, config.fieldbus.cycle_wait())
        .with_outputs(config.bridge.drive_outputs);
    let mut screen = TerminalScreen::stdout();
    let (poller, cycle) =
        match prepare_loop(&mut screen, &device, exchange, config.bridge.sync_strategy) {
            Ok(parts) => parts,
            Err(e) => {
                drop(device);
                screen.teardown();
                bridge::shutdown_stack(stack.as_ref(), ack_timeout);
                return Err(e);
            }
        };

    info!(
        "Node {} running ({:?} exchange, joystick {})",
        params.node_id,
        config.bridge.sync_strategy,
        config.bridge.joystick_device.display()
    );

    let mut event_loop = EventLoop::new(device, screen, poller, ctx, config.bridge.tick())
        .with_cycle_driver(cycle);
    let reason = event_loop.run();

    info!("joybridge shutdown complete ({:?})", reason);
    Ok(reason)
}

/// Initialize the screen, build the poller and start the cycle driver.
fn prepare_loop(
    screen: &mut TerminalScreen,
    device: &JoystickDevice,
    exchange: CyclicExchange,
    strategy: SyncStrategy,
) -> Result<(FdPoller, CycleDriver), Box<dyn std::error::Error>> {
    screen.init()?;
    let ui = screen
        .input_fd()
        .map(|fd| fd.try_clone_to_owned())
        .transpose()?;
    let poller = FdPoller::new(device.try_clone_fd()?, ui);

    let cycle = match strategy {
        SyncStrategy::Inline => CycleDriver::Inline(exchange),
        SyncStrategy::Thread => CycleDriver::Thread(SyncThread::spawn(exchange)?),
    };
    Ok((poller, cycle))
}

/// Command-line options override the configuration file.
fn apply_args(config: &mut BridgeConfig, args: &Args) {
    if let Some(node_id) = args.node_id {
        config.fieldbus.node_id = node_id;
    }
    if let Some(device_name) = &args.device_name {
        config.fieldbus.device_name = device_name.clone();
    }
    if let Some(joystick) = &args.joystick {
        config.bridge.joystick_device = joystick.clone();
    }
    if let Some(tick_ms) = args.tick_ms {
        config.bridge.tick_ms = tick_ms;
    }
    if args.sync_thread {
        config.bridge.sync_strategy = SyncStrategy::Thread;
    }
    if args.drive_outputs {
        config.bridge.drive_outputs = true;
    }
}

/// Setup tracing subscriber based on CLI arguments.
///
/// Logs go to stderr; stdout belongs to the screen.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.as_directive().parse().unwrap_or(Level::INFO)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}
