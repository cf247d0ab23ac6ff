//! Error types of the bridge.

use joybridge_common::config::ConfigError;
use joybridge_common::fieldbus::{FieldbusError, NmtCommand};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the joystick device reader.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device node could not be opened.
    #[error("failed to open input device {}: {source}", .path.display())]
    Open {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A read failed with something other than "would block" or EINTR.
    #[error("read from input device {} failed: {source}", .path.display())]
    Read {
        /// Device path.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The event stream ended (device unplugged or writer gone).
    #[error("input device {} disconnected", .path.display())]
    Disconnected {
        /// Device path.
        path: PathBuf,
    },

    /// The device was already closed.
    #[error("input device {} is closed", .path.display())]
    Closed {
        /// Device path.
        path: PathBuf,
    },
}

/// Top-level bridge errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Joystick device failure.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Fieldbus stack failure.
    #[error("Fieldbus error: {0}")]
    Fieldbus(#[from] FieldbusError),

    /// Linking a process image field failed.
    #[error("linking {name} (0x{index:04x}/0x{subindex:02x}) failed: {source}")]
    Link {
        /// Field name.
        name: &'static str,
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
        /// Stack error.
        #[source]
        source: FieldbusError,
    },

    /// The stack linked an unexpected number of entries.
    #[error("linking {name} (0x{index:04x}/0x{subindex:02x}) linked {count} entries, expected 1")]
    LinkCount {
        /// Field name.
        name: &'static str,
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
        /// Number of entries reported by the stack.
        count: u32,
    },

    /// An NMT command was rejected.
    #[error("NMT command {command} failed: {source}")]
    Nmt {
        /// Rejected command.
        command: NmtCommand,
        /// Stack error.
        #[source]
        source: FieldbusError,
    },

    /// Terminal or stdin I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No network interface available or selected.
    #[error("no network interface selected")]
    NoInterface,

    /// Requested fieldbus stack is not registered.
    #[error("unknown fieldbus stack '{0}'")]
    UnknownStack(String),
}
