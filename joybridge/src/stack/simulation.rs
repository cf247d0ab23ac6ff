//! Simulated fieldbus stack.
//!
//! Runs the node state machine and the cycle clock in-process so the bridge
//! can be exercised without a network. A generator thread ticks at the
//! configured cycle length; every tick in `Operational` counts one cycle and
//! releases [`FieldbusStack::wait_cycle_ready`].
//!
//! State machine:
//!
//! ```text
//!          SwReset               first tick
//!   Off ───────────► PreOperational ─────────► Operational
//!    ▲                                              │
//!    └──────────────────── SwitchOff ───────────────┘
//! ```

use joybridge_common::fieldbus::{
    FieldbusError, FieldbusStack, InitParams, NmtCommand, ObjectLink, StackStatus,
};
use joybridge_common::image::{IMAGE_SIZE, JoystickImage, OBJ_ANALOG_INPUTS, OBJ_DIGITAL_INPUTS};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stack configuration word reported by the simulation.
pub const SIM_STACK_CONFIGURATION: u32 = 0x0000_0001;

/// Objects the simulated dictionary provides: (index, subindex, size).
const OBJECTS: [(u16, u8, usize); 4] = [
    (OBJ_DIGITAL_INPUTS, 0x01, 1),
    (OBJ_DIGITAL_INPUTS, 0x02, 1),
    (OBJ_ANALOG_INPUTS, 0x01, 2),
    (OBJ_ANALOG_INPUTS, 0x02, 2),
];

/// Node state of the simulated stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtState {
    /// State machine halted; no cycles.
    Off,
    /// Reset done, waiting for the first cycle.
    PreOperational,
    /// Cyclic exchange running.
    Operational,
}

#[derive(Debug)]
struct State {
    nmt: NmtState,
    params: Option<InitParams>,
    image_in: Option<Vec<u8>>,
    image_out: Option<Vec<u8>>,
    links: Vec<ObjectLink>,
    cycle: u64,
    inbound_exchanges: u64,
    outbound_exchanges: u64,
    alive: bool,
    generator_running: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled on every counted cycle and on kill/destroy.
    cycle_ready: Condvar,
    /// Signalled on every NMT state change and on kill/destroy.
    nmt_changed: Condvar,
    /// Wakes the generator early on destroy.
    wake: Condvar,
}

/// In-process [`FieldbusStack`].
pub struct SimulatedStack {
    shared: Arc<Shared>,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedStack {
    /// Create an uninitialized stack.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    nmt: NmtState::Off,
                    params: None,
                    image_in: None,
                    image_out: None,
                    links: Vec::new(),
                    cycle: 0,
                    inbound_exchanges: 0,
                    outbound_exchanges: 0,
                    alive: false,
                    generator_running: false,
                }),
                cycle_ready: Condvar::new(),
                nmt_changed: Condvar::new(),
                wake: Condvar::new(),
            }),
            generator: Mutex::new(None),
        }
    }

    /// Current node state.
    pub fn nmt_state(&self) -> NmtState {
        self.shared.state.lock().nmt
    }

    /// Cycles counted since initialization.
    pub fn cycle_count(&self) -> u64 {
        self.shared.state.lock().cycle
    }

    /// Number of (inbound, outbound) exchanges accepted.
    pub fn exchange_counts(&self) -> (u64, u64) {
        let state = self.shared.state.lock();
        (state.inbound_exchanges, state.outbound_exchanges)
    }

    /// Parameters passed to `initialize`.
    pub fn params(&self) -> Option<InitParams> {
        self.shared.state.lock().params.clone()
    }

    /// Objects linked so far, in link order.
    pub fn linked_objects(&self) -> Vec<ObjectLink> {
        self.shared.state.lock().links.clone()
    }

    /// Current content of the input process image, if it has the joystick
    /// layout.
    pub fn inbound_image(&self) -> Option<JoystickImage> {
        let state = self.shared.state.lock();
        let bytes: &[u8; IMAGE_SIZE] = state.image_in.as_deref()?.try_into().ok()?;
        Some(JoystickImage::from_bytes(bytes))
    }

    /// Simulate the stack disappearing underneath the application.
    pub fn kill(&self) {
        warn!("Simulated stack killed");
        let mut state = self.shared.state.lock();
        state.alive = false;
        self.shared.cycle_ready.notify_all();
        self.shared.nmt_changed.notify_all();
    }

    fn set_nmt(&self, state: &mut State, nmt: NmtState) {
        if state.nmt != nmt {
            debug!("NMT {:?} -> {:?}", state.nmt, nmt);
            state.nmt = nmt;
            self.shared.nmt_changed.notify_all();
        }
    }
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimulatedStack {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Check that an instance exists and is running.
fn require_alive(state: &State, operation: &'static str) -> Result<(), FieldbusError> {
    if state.params.is_none() {
        return Err(FieldbusError::stack(operation, StackStatus::IllegalInstance));
    }
    if !state.alive {
        return Err(FieldbusError::stack(operation, StackStatus::Shutdown));
    }
    Ok(())
}

/// Validate `link` against the simulated dictionary and the image size.
fn check_link(link: &ObjectLink, image_len: usize) -> Result<(), StackStatus> {
    if !OBJECTS.iter().any(|(index, _, _)| *index == link.index) {
        return Err(StackStatus::ObdIndexNotExist);
    }
    let (_, _, size) = OBJECTS
        .iter()
        .find(|(index, subindex, _)| *index == link.index && *subindex == link.subindex)
        .ok_or(StackStatus::ObdSubindexNotExist)?;
    if *size != link.size {
        return Err(StackStatus::ObdValueLengthError);
    }
    if link.offset + link.size > image_len {
        return Err(StackStatus::ProcessImageSize);
    }
    Ok(())
}

fn run_generator(shared: Arc<Shared>, period: Duration) {
    let mut state = shared.state.lock();
    let mut next = Instant::now() + period;
    while state.generator_running {
        if !shared.wake.wait_until(&mut state, next).timed_out() {
            continue;
        }
        next += period;
        if !state.alive {
            continue;
        }
        match state.nmt {
            NmtState::Off => {}
            NmtState::PreOperational => {
                debug!("NMT PreOperational -> Operational");
                state.nmt = NmtState::Operational;
                shared.nmt_changed.notify_all();
            }
            NmtState::Operational => {
                state.cycle += 1;
                shared.cycle_ready.notify_all();
            }
        }
    }
    debug!("Cycle generator stopped");
}

impl FieldbusStack for SimulatedStack {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn version(&self) -> String {
        format!("{} (simulation)", env!("CARGO_PKG_VERSION"))
    }

    fn configuration(&self) -> u32 {
        SIM_STACK_CONFIGURATION
    }

    fn initialize(&self, params: &InitParams) -> Result<(), FieldbusError> {
        if params.cycle_len_us == 0 {
            return Err(FieldbusError::stack("initialize", StackStatus::InvalidParameter));
        }
        {
            let mut state = self.shared.state.lock();
            if state.params.is_some() {
                return Err(FieldbusError::stack("initialize", StackStatus::IllegalInstance));
            }
            state.params = Some(params.clone());
            state.alive = true;
            state.generator_running = true;
        }

        let shared = Arc::clone(&self.shared);
        let period = params.cycle_len();
        let spawned = thread::Builder::new()
            .name("sim-cycle".to_string())
            .spawn(move || run_generator(shared, period));
        match spawned {
            Ok(handle) => *self.generator.lock() = Some(handle),
            Err(e) => {
                warn!("Failed to start cycle generator: {}", e);
                let mut state = self.shared.state.lock();
                state.params = None;
                state.alive = false;
                state.generator_running = false;
                return Err(FieldbusError::stack("initialize", StackStatus::NoResource));
            }
        }

        info!(
            "Simulated node {} on '{}' ({}, cycle {} us)",
            params.node_id, params.device_name, params.ip_address, params.cycle_len_us
        );
        Ok(())
    }

    fn allocate_image(&self, size_in: usize, size_out: usize) -> Result<(), FieldbusError> {
        let mut state = self.shared.state.lock();
        require_alive(&state, "allocate_image")?;
        if size_in == 0 {
            return Err(FieldbusError::stack("allocate_image", StackStatus::InvalidParameter));
        }
        if state.image_in.is_some() {
            return Err(FieldbusError::stack("allocate_image", StackStatus::InvalidOperation));
        }
        state.image_in = Some(vec![0; size_in]);
        state.image_out = Some(vec![0; size_out]);
        Ok(())
    }

    fn free_image(&self) -> Result<(), FieldbusError> {
        let mut state = self.shared.state.lock();
        if state.image_in.take().is_none() {
            return Err(FieldbusError::stack("free_image", StackStatus::ProcessImageMissing));
        }
        state.image_out = None;
        state.links.clear();
        Ok(())
    }

    fn link_variable(&self, link: &ObjectLink) -> Result<u32, FieldbusError> {
        let mut state = self.shared.state.lock();
        require_alive(&state, "link_variable")?;
        let image_len = state
            .image_in
            .as_ref()
            .map(Vec::len)
            .ok_or_else(|| FieldbusError::stack("link_variable", StackStatus::ProcessImageMissing))?;
        check_link(link, image_len).map_err(|status| FieldbusError::stack("link_variable", status))?;

        state
            .links
            .retain(|l| (l.index, l.subindex) != (link.index, link.subindex));
        state.links.push(*link);
        Ok(1)
    }

    fn wait_cycle_ready(&self, timeout: Duration) -> Result<(), FieldbusError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        require_alive(&state, "wait_cycle_ready")?;

        let seen = state.cycle;
        while state.cycle == seen {
            let timed_out = self
                .shared
                .cycle_ready
                .wait_until(&mut state, deadline)
                .timed_out();
            if !state.alive {
                return Err(FieldbusError::stack("wait_cycle_ready", StackStatus::Shutdown));
            }
            if timed_out && state.cycle == seen {
                return Err(FieldbusError::Timeout("cycle ready"));
            }
        }
        Ok(())
    }

    fn exchange_inbound(&self, image: &[u8]) -> Result<(), FieldbusError> {
        let mut state = self.shared.state.lock();
        require_alive(&state, "exchange_inbound")?;
        let target = state.image_in.as_mut().ok_or_else(|| {
            FieldbusError::stack("exchange_inbound", StackStatus::ProcessImageMissing)
        })?;
        if target.len() != image.len() {
            return Err(FieldbusError::stack("exchange_inbound", StackStatus::ProcessImageSize));
        }
        target.copy_from_slice(image);
        state.inbound_exchanges += 1;
        Ok(())
    }

    fn exchange_outbound(&self) -> Result<(), FieldbusError> {
        let mut state = self.shared.state.lock();
        require_alive(&state, "exchange_outbound")?;
        if state.image_out.is_none() {
            return Err(FieldbusError::stack(
                "exchange_outbound",
                StackStatus::ProcessImageMissing,
            ));
        }
        state.outbound_exchanges += 1;
        Ok(())
    }

    fn exec_nmt_command(&self, command: NmtCommand) -> Result<(), FieldbusError> {
        let mut state = self.shared.state.lock();
        require_alive(&state, "exec_nmt_command")?;
        match command {
            NmtCommand::SwReset => self.set_nmt(&mut state, NmtState::PreOperational),
            NmtCommand::SwitchOff => self.set_nmt(&mut state, NmtState::Off),
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.shared.state.lock().alive
    }

    fn wait_switched_off(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.nmt != NmtState::Off {
            if self
                .shared
                .nmt_changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                break;
            }
        }
        state.nmt == NmtState::Off
    }

    fn destroy(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.generator_running && !state.alive {
                return;
            }
            state.alive = false;
            state.generator_running = false;
            self.shared.wake.notify_all();
            self.shared.cycle_ready.notify_all();
            self.shared.nmt_changed.notify_all();
        }
        if let Some(handle) = self.generator.lock().take() {
            if handle.join().is_err() {
                warn!("Cycle generator panicked");
            }
        }
        info!("Simulated stack destroyed");
    }
}
