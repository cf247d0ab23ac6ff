//! Event multiplexer (main loop).
//!
//! One wait primitive arbitrates between the input device, the operator's
//! keyboard and a periodic tick. Every iteration performs exactly one
//! category of action, then checks the termination flag and stack liveness,
//! then (with the inline strategy) runs one cyclic exchange.
//!
//! ```text
//!            ┌───────────── wait(tick) ─────────────┐
//!            │                  │                   │
//!         timeout          device ready         key ready
//!            │                  │                   │
//!       render tick      drain → mirror      r: SwReset / Esc: quit
//!            └──────────────────┼───────────────────┘
//!                               ▼
//!            termination flag? stack alive? → Exiting
//!                               ▼
//!                      inline on_cycle()
//! ```
//!
//! Fairness: when the device and the keyboard are both ready, the device
//! is served and the key waits for the next iteration. A key passed over
//! once is served next time even if the device is still ready, so a
//! moving stick cannot starve Esc or `r`. The wait is level-triggered,
//! so the key is reported again.

use crate::bridge::shutdown_stack;
use crate::device::InputDevice;
use crate::exchange::{CycleStats, CyclicExchange, SyncThread};
use crate::mirror::SharedStateMirror;
use crate::screen::Screen;
use joybridge_common::consts::{KEY_QUIT, KEY_RESET};
use joybridge_common::fieldbus::{FieldbusStack, NmtCommand};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::{AsFd, OwnedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Why the loop left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Operator pressed the quit key.
    QuitKey,
    /// SIGINT or SIGTERM.
    TerminationSignal,
    /// The stack reported itself gone.
    StackGone,
    /// NMT `SwReset` was rejected.
    ResetFailed,
    /// The input device failed or disconnected.
    DeviceFailed,
    /// The wait primitive failed.
    WaitFailed,
}

impl ExitReason {
    /// Whether the process should exit with a failure code.
    pub fn is_failure(self) -> bool {
        !matches!(self, Self::QuitKey | Self::TerminationSignal)
    }
}

/// Loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Serving events.
    Running,
    /// Leaving; no further actions are dispatched.
    Exiting(ExitReason),
}

/// Result of one wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// The input device has data (or hung up).
    pub device: bool,
    /// A key is pending.
    pub ui: bool,
}

impl Readiness {
    /// Nothing ready: the tick elapsed.
    pub const TIMEOUT: Self = Self {
        device: false,
        ui: false,
    };
}

/// Action selected for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Periodic render.
    Tick,
    /// Drain the device into the mirror.
    Device,
    /// Handle one key.
    Key,
}

impl Dispatch {
    /// Pick the single action for `readiness`.
    ///
    /// The device wins over keys unless a ready key was passed over on the
    /// previous iteration (`key_deferred`).
    pub fn select(readiness: Readiness, key_deferred: bool) -> Self {
        if readiness.ui && key_deferred {
            Self::Key
        } else if readiness.device {
            Self::Device
        } else if readiness.ui {
            Self::Key
        } else {
            Self::Tick
        }
    }
}

/// Meaning of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Reset the node.
    Reset,
    /// Leave the program.
    Quit,
    /// Not bound.
    Ignore,
}

impl KeyAction {
    /// Map a key byte.
    pub fn from_key(key: u8) -> Self {
        match key {
            KEY_RESET => Self::Reset,
            KEY_QUIT => Self::Quit,
            _ => Self::Ignore,
        }
    }
}

/// Readiness wait of the main loop.
pub trait Waiter {
    /// Block until the device or the keyboard is ready, or `timeout`
    /// elapses. An interrupted wait reports [`Readiness::TIMEOUT`].
    fn wait(&mut self, timeout: Duration) -> nix::Result<Readiness>;
}

/// `poll(2)` over the device and, optionally, the keyboard.
pub struct FdPoller {
    device: OwnedFd,
    ui: Option<OwnedFd>,
}

impl FdPoller {
    /// Poll `device` and `ui`.
    pub fn new(device: OwnedFd, ui: Option<OwnedFd>) -> Self {
        Self { device, ui }
    }
}

fn is_ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|r| {
        r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}

impl Waiter for FdPoller {
    fn wait(&mut self, timeout: Duration) -> nix::Result<Readiness> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

        let mut fds = vec![PollFd::new(self.device.as_fd(), PollFlags::POLLIN)];
        if let Some(ui) = &self.ui {
            fds.push(PollFd::new(ui.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) | Err(Errno::EINTR) => return Ok(Readiness::TIMEOUT),
            Ok(_) => {}
            Err(e) => return Err(e),
        }

        let device = is_ready(&fds[0]);
        let ui_ready = fds.get(1).is_some_and(|fd| {
            fd.revents()
                .is_some_and(|r| r.contains(PollFlags::POLLIN))
        });
        let ui_gone = fds.get(1).is_some_and(|fd| {
            fd.revents().is_some_and(|r| {
                !r.contains(PollFlags::POLLIN)
                    && r.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL)
            })
        });
        drop(fds);

        if ui_gone {
            warn!("Keyboard input closed, keys are no longer read");
            self.ui = None;
        }
        Ok(Readiness {
            device,
            ui: ui_ready,
        })
    }
}

/// How the cyclic exchange is driven.
pub enum CycleDriver {
    /// Called at the end of every iteration.
    Inline(CyclicExchange),
    /// Called from its own thread.
    Thread(SyncThread),
    /// Not driven by the loop (tests, or the stack drives it itself).
    Disabled,
}

impl CycleDriver {
    /// Stop a sync thread. Returns its final counters.
    fn stop(&mut self) -> Option<CycleStats> {
        match self {
            Self::Inline(exchange) => Some(exchange.stats()),
            Self::Thread(thread) => thread.stop(),
            Self::Disabled => None,
        }
    }
}

/// Everything the loop shares with other threads.
#[derive(Clone)]
pub struct BridgeContext {
    /// Fieldbus stack.
    pub stack: Arc<dyn FieldbusStack>,
    /// Process image record.
    pub mirror: Arc<SharedStateMirror>,
    /// Set by the signal handler.
    pub terminate: Arc<AtomicBool>,
    /// Bounded wait for the switched-off acknowledgement.
    pub switch_off_timeout: Duration,
}

/// Per-category iteration counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    /// Iterations run.
    pub iterations: u64,
    /// Render ticks.
    pub ticks: u64,
    /// Device dispatches.
    pub device_reads: u64,
    /// Events applied to the mirror.
    pub events: u64,
    /// Keys handled.
    pub keys: u64,
}

/// The main loop.
pub struct EventLoop<D, S, W>
where
    D: InputDevice,
    S: Screen,
    W: Waiter,
{
    device: D,
    screen: S,
    waiter: W,
    ctx: BridgeContext,
    cycle: CycleDriver,
    tick: Duration,
    state: LoopState,
    stats: LoopStats,
    key_deferred: bool,
    shut_down: bool,
}

impl<D, S, W> EventLoop<D, S, W>
where
    D: InputDevice,
    S: Screen,
    W: Waiter,
{
    /// Create a loop. The screen is expected to be initialized already.
    pub fn new(device: D, screen: S, waiter: W, ctx: BridgeContext, tick: Duration) -> Self {
        Self {
            device,
            screen,
            waiter,
            ctx,
            cycle: CycleDriver::Disabled,
            tick,
            state: LoopState::Running,
            stats: LoopStats::default(),
            key_deferred: false,
            shut_down: false,
        }
    }

    /// Set how the cyclic exchange is driven.
    pub fn with_cycle_driver(mut self, cycle: CycleDriver) -> Self {
        self.cycle = cycle;
        self
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Counters so far.
    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Input device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Screen.
    pub fn screen(&self) -> &S {
        &self.screen
    }

    /// Run one iteration. Does nothing once `Exiting`.
    pub fn step(&mut self) -> LoopState {
        if self.state != LoopState::Running {
            return self.state;
        }
        self.stats.iterations += 1;

        let mut exit = match self.waiter.wait(self.tick) {
            Ok(readiness) => {
                let action = Dispatch::select(readiness, self.key_deferred);
                self.key_deferred = readiness.ui && action != Dispatch::Key;
                self.dispatch(action)
            }
            Err(e) => {
                error!("Waiting for input failed: {}", e);
                Some(ExitReason::WaitFailed)
            }
        };

        if self.ctx.terminate.load(Ordering::SeqCst) {
            info!("Received termination signal, exiting...");
            exit = exit.or(Some(ExitReason::TerminationSignal));
        }
        if !self.ctx.stack.is_alive() {
            error!("Fieldbus stack has gone! Exiting...");
            exit = exit.or(Some(ExitReason::StackGone));
        }

        if let CycleDriver::Inline(exchange) = &mut self.cycle {
            // Failures are counted and logged by the adapter.
            let _ = exchange.on_cycle();
        }

        if let Some(reason) = exit {
            self.state = LoopState::Exiting(reason);
        }
        self.state
    }

    fn dispatch(&mut self, action: Dispatch) -> Option<ExitReason> {
        match action {
            Dispatch::Tick => {
                self.stats.ticks += 1;
                let image = self.ctx.mirror.snapshot();
                if let Err(e) = self.screen.render(&image) {
                    debug!("Render failed: {}", e);
                }
                None
            }
            Dispatch::Device => {
                self.stats.device_reads += 1;
                match self.device.drain_into(&self.ctx.mirror) {
                    Ok(applied) => {
                        self.stats.events += applied as u64;
                        None
                    }
                    Err(e) => {
                        error!("{}", e);
                        Some(ExitReason::DeviceFailed)
                    }
                }
            }
            Dispatch::Key => {
                self.stats.keys += 1;
                let key = match self.screen.read_key() {
                    Ok(Some(key)) => key,
                    Ok(None) => return None,
                    Err(e) => {
                        warn!("Reading key failed: {}", e);
                        return None;
                    }
                };
                match KeyAction::from_key(key) {
                    KeyAction::Reset => match self.ctx.stack.exec_nmt_command(NmtCommand::SwReset) {
                        Ok(()) => {
                            info!("Node reset requested");
                            None
                        }
                        Err(e) => {
                            error!("NMT SwReset failed: {}", e);
                            Some(ExitReason::ResetFailed)
                        }
                    },
                    KeyAction::Quit => Some(ExitReason::QuitKey),
                    KeyAction::Ignore => None,
                }
            }
        }
    }

    /// Iterate until `Exiting`, then shut down. Returns the exit reason.
    pub fn run(&mut self) -> ExitReason {
        info!("Main loop running (tick {:?})", self.tick);
        let reason = loop {
            if let LoopState::Exiting(reason) = self.step() {
                break reason;
            }
        };
        info!(
            "Main loop left after {} iterations ({:?}): {} events, {} ticks, {} keys",
            self.stats.iterations, reason, self.stats.events, self.stats.ticks, self.stats.keys
        );
        self.shutdown();
        reason
    }

    /// Tear down the device, then the screen, then the stack. Runs once.
    ///
    /// The sync thread is stopped before the stack is switched off.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.device.close();
        self.screen.teardown();
        if let Some(stats) = self.cycle.stop() {
            info!(
                "Cyclic exchange: {} exchanged, {} missed, {} failed",
                stats.exchanged, stats.missed, stats.failed
            );
        }
        shutdown_stack(self.ctx.stack.as_ref(), self.ctx.switch_off_timeout);
    }
}
