//! Fieldbus stack boundary.
//!
//! This module defines:
//! - `FieldbusStack` trait - Interface of the external fieldbus stack
//! - `FieldbusError` enum - Error types for stack operations
//! - `StackStatus` - Status codes reported by the stack
//! - `NmtCommand` - Node lifecycle commands
//! - `InitParams` - Node identity and timing handed to `initialize()`
//! - `ObjectLink` - Binding of a process image field to an object

use crate::config::FieldbusSection;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Status codes reported by the fieldbus stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StackStatus {
    /// Operation not allowed in the current stack instance state.
    IllegalInstance = 0x0001,
    /// Out of memory or other resources.
    NoResource = 0x0002,
    /// Parameter out of range.
    InvalidParameter = 0x0003,
    /// Operation not allowed in the current NMT state.
    InvalidOperation = 0x0004,
    /// Object dictionary index does not exist.
    ObdIndexNotExist = 0x0030,
    /// Object dictionary subindex does not exist.
    ObdSubindexNotExist = 0x0031,
    /// Value length does not match the object.
    ObdValueLengthError = 0x0037,
    /// Process image is not allocated.
    ProcessImageMissing = 0x0050,
    /// Process image is too small for the request.
    ProcessImageSize = 0x0051,
    /// Stack has shut down.
    Shutdown = 0x00F0,
    /// Unspecified error.
    General = 0xFFFF,
}

impl StackStatus {
    /// Numeric status code.
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Human-readable status text.
    pub const fn text(self) -> &'static str {
        match self {
            Self::IllegalInstance => "illegal instance",
            Self::NoResource => "no resource",
            Self::InvalidParameter => "invalid parameter",
            Self::InvalidOperation => "invalid operation",
            Self::ObdIndexNotExist => "object index does not exist",
            Self::ObdSubindexNotExist => "object subindex does not exist",
            Self::ObdValueLengthError => "object value length error",
            Self::ProcessImageMissing => "process image not allocated",
            Self::ProcessImageSize => "process image size mismatch",
            Self::Shutdown => "stack shut down",
            Self::General => "general error",
        }
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" (0x{:04x})", self.text(), self.code())
    }
}

/// Error types for fieldbus stack operations.
#[derive(Debug, Clone, Error)]
pub enum FieldbusError {
    /// The stack rejected an operation.
    #[error("{operation}() failed with {status}")]
    Stack {
        /// Name of the failing stack primitive.
        operation: &'static str,
        /// Status reported by the stack.
        status: StackStatus,
    },

    /// A bounded wait expired.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl FieldbusError {
    /// Shorthand for a [`FieldbusError::Stack`].
    pub const fn stack(operation: &'static str, status: StackStatus) -> Self {
        Self::Stack { operation, status }
    }

    /// Status code carried by the error, if the stack reported one.
    pub fn status(&self) -> Option<StackStatus> {
        match self {
            Self::Stack { status, .. } => Some(*status),
            Self::Timeout(_) => None,
        }
    }
}

/// Node lifecycle (NMT) commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtCommand {
    /// Software reset: (re)start the node state machine.
    SwReset,
    /// Halt the node state machine so frame processing stops.
    SwitchOff,
}

impl fmt::Display for NmtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwReset => f.write_str("SwReset"),
            Self::SwitchOff => f.write_str("SwitchOff"),
        }
    }
}

/// Binding of one process image field to an object dictionary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectLink {
    /// Field name (diagnostics only).
    pub name: &'static str,
    /// Object dictionary index.
    pub index: u16,
    /// Object dictionary subindex.
    pub subindex: u8,
    /// Byte offset inside the input process image.
    pub offset: usize,
    /// Field size in bytes.
    pub size: usize,
}

/// Node identity and timing handed to [`FieldbusStack::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    /// Node identifier.
    pub node_id: u8,
    /// Network interface name.
    pub device_name: String,
    /// MAC address; all zero = use the hardware address.
    pub mac_address: [u8; 6],
    /// Node IP address.
    pub ip_address: Ipv4Addr,
    /// Subnet mask.
    pub subnet_mask: Ipv4Addr,
    /// Default gateway.
    pub default_gateway: Ipv4Addr,
    /// Hostname announced by the node.
    pub hostname: String,
    /// Cycle length [µs].
    pub cycle_len_us: u32,
    /// Isochronous request payload limit [bytes].
    pub preq_payload_limit: u16,
    /// Isochronous response payload limit [bytes].
    pub pres_payload_limit: u16,
    /// Response latency [ns].
    pub pres_max_latency_ns: u32,
    /// Asynchronous send latency [ns].
    pub asnd_max_latency_ns: u32,
    /// Asynchronous MTU [bytes].
    pub async_mtu: u16,
    /// Sync prescaler.
    pub prescaler: u16,
    /// Loss-of-frame tolerance [ns].
    pub loss_of_frame_tolerance_ns: u32,
    /// Asynchronous slot timeout [ns].
    pub async_slot_timeout_ns: u32,
    /// Delay between SoC and PReq [ns].
    pub wait_soc_preq_ns: u32,
    /// Feature flags.
    pub feature_flags: u32,
    /// Device type (identity object).
    pub device_type: u32,
    /// Vendor id (identity object).
    pub vendor_id: u32,
    /// Product code (identity object).
    pub product_code: u32,
    /// Revision number (identity object).
    pub revision_number: u32,
    /// Serial number (identity object).
    pub serial_number: u32,
}

impl InitParams {
    /// Build the parameters for a controlled node.
    ///
    /// Identity fields are left at all-ones ("not specified"); the MAC
    /// address is all zero so the driver uses the real hardware address.
    pub fn for_node(section: &FieldbusSection, device_name: &str) -> Self {
        let vendor_id = u32::MAX;
        Self {
            node_id: section.node_id,
            device_name: device_name.to_string(),
            mac_address: [0; 6],
            ip_address: section.node_address(),
            subnet_mask: section.subnet_mask,
            default_gateway: section.gateway,
            hostname: format!("{:02x}-{:08x}", section.node_id, vendor_id),
            cycle_len_us: section.cycle_len_us,
            preq_payload_limit: 36,
            pres_payload_limit: 36,
            pres_max_latency_ns: 50_000,
            asnd_max_latency_ns: 150_000,
            async_mtu: 1500,
            prescaler: 2,
            loss_of_frame_tolerance_ns: 500_000,
            async_slot_timeout_ns: 3_000_000,
            wait_soc_preq_ns: 1000,
            feature_flags: u32::MAX,
            device_type: u32::MAX,
            vendor_id,
            product_code: u32::MAX,
            revision_number: u32::MAX,
            serial_number: u32::MAX,
        }
    }

    /// Cycle length as a `Duration`.
    pub fn cycle_len(&self) -> Duration {
        Duration::from_micros(u64::from(self.cycle_len_us))
    }
}

/// Interface of the external fieldbus stack.
///
/// All methods take `&self`: the stack is shared between the main loop
/// (commands, liveness) and the cyclic exchange, which may run on its own
/// thread. Implementations synchronize internally.
///
/// # Call order
///
/// 1. `initialize()`
/// 2. `allocate_image()`, then `link_variable()` per field
/// 3. `exec_nmt_command(SwReset)`
/// 4. per cycle: `wait_cycle_ready()`, `exchange_outbound()`, `exchange_inbound()`
/// 5. `exec_nmt_command(SwitchOff)`, `wait_switched_off()`, `free_image()`, `destroy()`
pub trait FieldbusStack: Send + Sync {
    /// Returns the stack's identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Version string of the stack.
    fn version(&self) -> String;

    /// Stack build configuration word.
    fn configuration(&self) -> u32;

    /// Initialize and create the stack instance.
    fn initialize(&self, params: &InitParams) -> Result<(), FieldbusError>;

    /// Allocate the input and output process images.
    fn allocate_image(&self, size_in: usize, size_out: usize) -> Result<(), FieldbusError>;

    /// Release the process images.
    fn free_image(&self) -> Result<(), FieldbusError>;

    /// Link one input image field to an object. Returns the number of
    /// linked entries.
    fn link_variable(&self, link: &ObjectLink) -> Result<u32, FieldbusError>;

    /// Block until the next cycle starts or `timeout` expires.
    fn wait_cycle_ready(&self, timeout: Duration) -> Result<(), FieldbusError>;

    /// Copy `image` into the stack's input process image.
    fn exchange_inbound(&self, image: &[u8]) -> Result<(), FieldbusError>;

    /// Refresh the stack's output process image.
    fn exchange_outbound(&self) -> Result<(), FieldbusError>;

    /// Execute a node lifecycle command.
    fn exec_nmt_command(&self, command: NmtCommand) -> Result<(), FieldbusError>;

    /// Whether the stack is still running.
    fn is_alive(&self) -> bool;

    /// Block until the node reports the switched-off state or `timeout`
    /// expires. Returns `true` if the state was reached.
    fn wait_switched_off(&self, timeout: Duration) -> bool;

    /// Destroy the stack instance.
    fn destroy(&self);
}
