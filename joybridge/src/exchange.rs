//! Cyclic exchange adapter.
//!
//! Once per fieldbus cycle the mirror is snapshotted and handed to the
//! stack's inbound process image. The wait for the cycle-ready signal happens
//! without the mirror lock, so the input side is never blocked by the stack.

use crate::mirror::SharedStateMirror;
use joybridge_common::fieldbus::{FieldbusError, FieldbusStack};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one [`CyclicExchange::on_cycle`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The snapshot was handed to the stack.
    Exchanged,
    /// No cycle-ready signal within the timeout; nothing was exchanged.
    Missed,
}

/// Cycle counters, diagnostics only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Cycles whose snapshot reached the stack.
    pub exchanged: u64,
    /// Cycle-ready waits that failed or timed out.
    pub missed: u64,
    /// Exchanges the stack rejected.
    pub failed: u64,
}

/// Copies the mirror into the stack once per cycle.
pub struct CyclicExchange {
    stack: Arc<dyn FieldbusStack>,
    mirror: Arc<SharedStateMirror>,
    wait_timeout: Duration,
    drive_outputs: bool,
    stats: CycleStats,
}

impl CyclicExchange {
    /// Create an adapter waiting at most `wait_timeout` for each cycle.
    pub fn new(
        stack: Arc<dyn FieldbusStack>,
        mirror: Arc<SharedStateMirror>,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            stack,
            mirror,
            wait_timeout,
            drive_outputs: false,
            stats: CycleStats::default(),
        }
    }

    /// Also refresh the outbound image, before the inbound one, every cycle.
    pub fn with_outputs(mut self, drive_outputs: bool) -> Self {
        self.drive_outputs = drive_outputs;
        self
    }

    /// Run one cycle.
    ///
    /// A failed or expired cycle-ready wait is not an error: the call
    /// returns [`CycleOutcome::Missed`] without touching the mirror or the
    /// process image. Exchange failures are returned to the caller.
    pub fn on_cycle(&mut self) -> Result<CycleOutcome, FieldbusError> {
        if let Err(e) = self.stack.wait_cycle_ready(self.wait_timeout) {
            self.stats.missed += 1;
            if self.stats.missed <= 10 || self.stats.missed % 1000 == 0 {
                debug!("Cycle #{} missed: {}", self.stats.missed, e);
            }
            return Ok(CycleOutcome::Missed);
        }

        let image = self.mirror.snapshot();
        match self.exchange(&image.to_bytes()) {
            Ok(()) => {
                self.stats.exchanged += 1;
                Ok(CycleOutcome::Exchanged)
            }
            Err(e) => {
                self.stats.failed += 1;
                if self.stats.failed <= 10 || self.stats.failed % 1000 == 0 {
                    warn!("Process image exchange #{} failed: {}", self.stats.failed, e);
                }
                Err(e)
            }
        }
    }

    fn exchange(&self, image: &[u8]) -> Result<(), FieldbusError> {
        if self.drive_outputs {
            self.stack.exchange_outbound()?;
        }
        self.stack.exchange_inbound(image)
    }

    /// Counters so far.
    pub fn stats(&self) -> CycleStats {
        self.stats
    }
}

/// Dedicated thread calling [`CyclicExchange::on_cycle`] back to back.
///
/// The cycle-ready wait paces the thread. A cycle that did not exchange
/// (missed or rejected) still takes at least one wait timeout, so a stack
/// that fails its waits at once does not spin the thread. Stopping clears
/// the running flag and joins; the thread notices within one wait timeout.
pub struct SyncThread {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<CycleStats>>,
}

impl SyncThread {
    /// Spawn the thread, which takes ownership of `exchange`.
    pub fn spawn(mut exchange: CyclicExchange) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("joybridge-sync".to_string())
            .spawn(move || {
                debug!("Sync thread started");
                let pace = exchange.wait_timeout;
                while flag.load(Ordering::Acquire) {
                    let started = Instant::now();
                    // Failures are counted and logged by the adapter.
                    if !matches!(exchange.on_cycle(), Ok(CycleOutcome::Exchanged)) {
                        if let Some(rest) = pace.checked_sub(started.elapsed()) {
                            thread::sleep(rest);
                        }
                    }
                }
                exchange.stats()
            })?;

        info!("Sync thread running");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the thread has not been stopped yet.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop and join the thread. Returns its final counters the first time.
    pub fn stop(&mut self) -> Option<CycleStats> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(stats) => {
                info!(
                    "Sync thread stopped ({} exchanged, {} missed, {} failed)",
                    stats.exchanged, stats.missed, stats.failed
                );
                Some(stats)
            }
            Err(_) => {
                warn!("Sync thread panicked");
                None
            }
        }
    }
}

impl Drop for SyncThread {
    fn drop(&mut self) {
        self.stop();
    }
}
