//! # Joybridge Library
//!
//! Feeds a joystick into the input process image of a fieldbus node.
//!
//! # Module Structure
//!
//! - [`event`] - Raw joystick records and input events
//! - [`mirror`] - Lock-guarded process image record
//! - [`device`] - Non-blocking joystick device reader
//! - [`exchange`] - Cyclic exchange adapter and sync thread
//! - [`multiplexer`] - Main loop over device, keyboard and tick
//! - [`bridge`] - Fieldbus stack startup and shutdown
//! - [`screen`] - Terminal user interface
//! - [`stack`] - Fieldbus stack implementations and registry
//! - [`netselect`] - Interactive network interface selection
//! - [`error`] - Error types
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  apply   ┌──────────────────┐  snapshot  ┌──────────────────┐
//! │  device    │─────────►│ SharedStateMirror│───────────►│ CyclicExchange   │
//! │ (js0, nb)  │          │ (parking_lot)    │            │ (inline/thread)  │
//! └─────▲──────┘          └──────────────────┘            └────────┬─────────┘
//!       │ readable                                                 │ inbound
//! ┌─────┴─────────────────────────┐                       ┌────────▼─────────┐
//! │ EventLoop (poll: device, key, │──── SwReset / alive ─►│  FieldbusStack   │
//! │ tick)                         │                       │  (trait object)  │
//! └───────────────────────────────┘                       └──────────────────┘
//! ```

#![warn(missing_docs)]

pub mod bridge;
pub mod device;
pub mod error;
pub mod event;
pub mod exchange;
pub mod mirror;
pub mod multiplexer;
pub mod netselect;
pub mod screen;
pub mod stack;

// Re-export key types for convenience
pub use crate::device::{InputDevice, JoystickDevice};
pub use crate::error::{BridgeError, DeviceError};
pub use crate::event::{EventKind, InputEvent};
pub use crate::exchange::{CycleOutcome, CyclicExchange, SyncThread};
pub use crate::mirror::SharedStateMirror;
pub use crate::multiplexer::{BridgeContext, CycleDriver, EventLoop, ExitReason, LoopState};
pub use crate::screen::{Screen, TerminalScreen};
pub use crate::stack::{SimulatedStack, StackRegistry};
