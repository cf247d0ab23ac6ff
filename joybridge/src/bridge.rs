//! Fieldbus stack lifecycle around the main loop.
//!
//! Fixed call order:
//!
//! 1. [`init_stack`] - initialize and log the stack identity
//! 2. [`setup_process_image`] - allocate and link the joystick image
//! 3. [`start_node`] - NMT `SwReset`
//! 4. main loop (cyclic exchange)
//! 5. [`shutdown_stack`] - `SwitchOff`, acknowledgement, free, destroy
//!
//! [`start`] runs steps 1-3 plus opening the input device and unwinds the
//! stack if anything after step 1 fails.

use crate::device::JoystickDevice;
use crate::error::BridgeError;
use joybridge_common::prelude::{FieldbusStack, IMAGE_LINKS, IMAGE_SIZE, InitParams, NmtCommand};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Initialize the stack and log its version and configuration.
pub fn init_stack(stack: &dyn FieldbusStack, params: &InitParams) -> Result<(), BridgeError> {
    info!("----------------------------------------------------");
    info!("joybridge CN v{}", env!("CARGO_PKG_VERSION"));
    info!("Using fieldbus stack: {} {}", stack.name(), stack.version());
    info!("Stack configuration: 0x{:08X}", stack.configuration());
    info!("----------------------------------------------------");
    info!(
        "Initializing node {} on '{}' (ip {}, host {})",
        params.node_id, params.device_name, params.ip_address, params.hostname
    );

    stack.initialize(params)?;
    Ok(())
}

/// Allocate the process image and link every joystick field.
///
/// Each link must report exactly one linked entry.
pub fn setup_process_image(stack: &dyn FieldbusStack) -> Result<(), BridgeError> {
    info!("Allocating process image ({} bytes in, 0 out)", IMAGE_SIZE);
    stack.allocate_image(IMAGE_SIZE, 0)?;

    for link in &IMAGE_LINKS {
        let count = stack.link_variable(link).map_err(|source| BridgeError::Link {
            name: link.name,
            index: link.index,
            subindex: link.subindex,
            source,
        })?;
        if count != 1 {
            return Err(BridgeError::LinkCount {
                name: link.name,
                index: link.index,
                subindex: link.subindex,
                count,
            });
        }
        debug!(
            "Linked {} to 0x{:04X}/0x{:02X} (offset {}, {} bytes)",
            link.name, link.index, link.subindex, link.offset, link.size
        );
    }
    info!("Linking process image vars... ok");
    Ok(())
}

/// Start the node state machine.
pub fn start_node(stack: &dyn FieldbusStack) -> Result<(), BridgeError> {
    stack
        .exec_nmt_command(NmtCommand::SwReset)
        .map_err(|source| BridgeError::Nmt {
            command: NmtCommand::SwReset,
            source,
        })?;
    info!("Node started");
    Ok(())
}

/// Bring the stack up and open the input device.
///
/// On failure after the stack was initialized it is shut down again before
/// the error is returned.
pub fn start(
    stack: &dyn FieldbusStack,
    params: &InitParams,
    joystick: &Path,
    ack_timeout: Duration,
) -> Result<JoystickDevice, BridgeError> {
    init_stack(stack, params)?;

    let result = setup_process_image(stack)
        .and_then(|()| start_node(stack))
        .and_then(|()| JoystickDevice::open(joystick).map_err(BridgeError::from));
    if result.is_err() {
        shutdown_stack(stack, ack_timeout);
    }
    result
}

/// Halt the node and release the stack.
///
/// Never fails: every step is attempted and problems are logged.
pub fn shutdown_stack(stack: &dyn FieldbusStack, ack_timeout: Duration) {
    if stack.is_alive() {
        match stack.exec_nmt_command(NmtCommand::SwitchOff) {
            Ok(()) => {
                if stack.wait_switched_off(ack_timeout) {
                    info!("Stack is in state off ... Shutdown");
                } else {
                    warn!("No switched-off acknowledgement within {:?}", ack_timeout);
                }
            }
            Err(e) => warn!("NMT SwitchOff failed: {}", e),
        }
    } else {
        warn!("Stack is gone, skipping SwitchOff");
    }

    if let Err(e) = stack.free_image() {
        debug!("free_image: {}", e);
    }
    stack.destroy();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{NmtState, SimulatedStack};
    use joybridge_common::config::FieldbusSection;
    use joybridge_common::fieldbus::{FieldbusError, ObjectLink, StackStatus};
    use parking_lot::Mutex;

    fn params() -> InitParams {
        let mut section = FieldbusSection::default();
        section.cycle_len_us = 1000;
        InitParams::for_node(&section, "sim0")
    }

    #[test]
    fn simulated_stack_comes_up_linked() {
        let stack = SimulatedStack::new();
        init_stack(&stack, &params()).unwrap();
        setup_process_image(&stack).unwrap();
        start_node(&stack).unwrap();

        assert_eq!(stack.linked_objects().len(), IMAGE_LINKS.len());
        assert_eq!(stack.nmt_state(), NmtState::PreOperational);

        shutdown_stack(&stack, Duration::from_secs(1));
        assert_eq!(stack.nmt_state(), NmtState::Off);
        assert!(!stack.is_alive());
    }

    #[test]
    fn failed_device_open_unwinds_stack() {
        let stack = SimulatedStack::new();
        let err = start(
            &stack,
            &params(),
            Path::new("/nonexistent/js9"),
            Duration::from_secs(1),
        )
        .unwrap_err();

        assert!(matches!(err, BridgeError::Device(_)));
        assert!(!stack.is_alive());
        assert_eq!(stack.nmt_state(), NmtState::Off);
        assert!(stack.linked_objects().is_empty());
    }

    /// Stack that links a configurable number of entries per object.
    struct CountingStack {
        count: u32,
        calls: Mutex<Vec<String>>,
    }

    impl FieldbusStack for CountingStack {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn version(&self) -> String {
            "0".to_string()
        }
        fn configuration(&self) -> u32 {
            0
        }
        fn initialize(&self, _params: &InitParams) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn allocate_image(&self, _size_in: usize, _size_out: usize) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn free_image(&self) -> Result<(), FieldbusError> {
            self.calls.lock().push("free".to_string());
            Ok(())
        }
        fn link_variable(&self, link: &ObjectLink) -> Result<u32, FieldbusError> {
            self.calls.lock().push(format!("link {}", link.name));
            Ok(self.count)
        }
        fn wait_cycle_ready(&self, _timeout: Duration) -> Result<(), FieldbusError> {
            Err(FieldbusError::Timeout("cycle ready"))
        }
        fn exchange_inbound(&self, _image: &[u8]) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn exchange_outbound(&self) -> Result<(), FieldbusError> {
            Ok(())
        }
        fn exec_nmt_command(&self, command: NmtCommand) -> Result<(), FieldbusError> {
            self.calls.lock().push(format!("nmt {command}"));
            Err(FieldbusError::stack("exec_nmt_command", StackStatus::InvalidOperation))
        }
        fn is_alive(&self) -> bool {
            true
        }
        fn wait_switched_off(&self, _timeout: Duration) -> bool {
            false
        }
        fn destroy(&self) {
            self.calls.lock().push("destroy".to_string());
        }
    }

    #[test]
    fn wrong_link_count_is_rejected() {
        let stack = CountingStack {
            count: 2,
            calls: Mutex::new(Vec::new()),
        };
        let err = setup_process_image(&stack).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::LinkCount { name: "buttons_low", count: 2, .. }
        ));
        assert_eq!(*stack.calls.lock(), vec!["link buttons_low".to_string()]);
    }

    #[test]
    fn failed_reset_aborts_startup() {
        let stack = CountingStack {
            count: 1,
            calls: Mutex::new(Vec::new()),
        };
        let err = start(&stack, &params(), Path::new("/dev/null"), Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Nmt {
                command: NmtCommand::SwReset,
                ..
            }
        ));

        let calls = stack.calls.lock().clone();
        assert_eq!(
            &calls[calls.len() - 4..],
            &["nmt SwReset", "nmt SwitchOff", "free", "destroy"]
        );
    }
}
