//! Prelude module for common re-exports.
//!
//! ```rust
//! use joybridge_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{BridgeConfig, ConfigError, ConfigLoader, LogLevel, SyncStrategy};

// ─── Process Image ──────────────────────────────────────────────────
pub use crate::image::{IMAGE_LINKS, IMAGE_SIZE, JoystickImage};

// ─── Fieldbus Boundary ──────────────────────────────────────────────
pub use crate::fieldbus::{
    FieldbusError, FieldbusStack, InitParams, NmtCommand, ObjectLink, StackStatus,
};
