//! Fieldbus stack implementations.
//!
//! - [`simulation`] - In-process stack with a cycle generator thread
//! - [`registry`] - Name → factory lookup used by the binary
//!
//! # Adding New Stacks
//!
//! 1. Create a new submodule under `stack/`
//! 2. Implement `FieldbusStack` from `joybridge_common::fieldbus`
//! 3. Register its factory in [`StackRegistry::builtin`]

pub mod registry;
pub mod simulation;

pub use registry::{StackFactory, StackRegistry};
pub use simulation::{NmtState, SimulatedStack};
