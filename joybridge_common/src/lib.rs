//! Joybridge Common Library
//!
//! Shared types for the joystick-to-fieldbus bridge.
//!
//! # Module Structure
//!
//! - [`consts`] - Defaults and fixed protocol constants
//! - [`config`] - Configuration loading traits and types
//! - [`image`] - The joystick process image and its object dictionary links
//! - [`fieldbus`] - Boundary trait of the external fieldbus stack
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use joybridge_common::image::JoystickImage;
//! use joybridge_common::config::{BridgeConfig, ConfigLoader};
//! ```

pub mod config;
pub mod consts;
pub mod fieldbus;
pub mod image;
pub mod prelude;
