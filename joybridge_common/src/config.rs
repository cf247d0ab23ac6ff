//! Configuration loading traits and types.
//!
//! The bridge is fully usable from the command line alone; a TOML file can
//! supply the less frequently changed fieldbus and loop parameters.
//!
//! # Usage
//!
//! ```rust,no_run
//! use joybridge_common::config::{BridgeConfig, ConfigError, ConfigLoader};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = BridgeConfig::load(Path::new("joybridge.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_CYCLE_LEN_US, DEFAULT_CYCLE_WAIT_MS, DEFAULT_GATEWAY, DEFAULT_IP_BASE,
    DEFAULT_JOYSTICK_DEVICE, DEFAULT_NODE_ID, DEFAULT_SUBNET_MASK, DEFAULT_SWITCH_OFF_TIMEOUT_MS,
    DEFAULT_TICK_MS, MAX_CN_NODE_ID, SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "joybridge-cn-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the cyclic exchange is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStrategy {
    /// Called at the end of every main loop iteration.
    #[default]
    Inline,
    /// Called from a dedicated periodic thread.
    Thread,
}

fn default_node_id() -> u8 {
    DEFAULT_NODE_ID
}

fn default_cycle_len_us() -> u32 {
    DEFAULT_CYCLE_LEN_US
}

fn default_cycle_wait_ms() -> u64 {
    DEFAULT_CYCLE_WAIT_MS
}

fn default_switch_off_timeout_ms() -> u64 {
    DEFAULT_SWITCH_OFF_TIMEOUT_MS
}

fn default_ip_base() -> Ipv4Addr {
    DEFAULT_IP_BASE
}

fn default_subnet_mask() -> Ipv4Addr {
    DEFAULT_SUBNET_MASK
}

fn default_gateway() -> Ipv4Addr {
    DEFAULT_GATEWAY
}

/// `[fieldbus]` section: node identity and stack timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldbusSection {
    /// Node identifier on the fieldbus.
    #[serde(default = "default_node_id")]
    pub node_id: u8,

    /// Network interface name. Empty = ask interactively.
    #[serde(default)]
    pub device_name: String,

    /// Cycle length in microseconds.
    #[serde(default = "default_cycle_len_us")]
    pub cycle_len_us: u32,

    /// Bounded wait for the cycle-ready signal [ms].
    #[serde(default = "default_cycle_wait_ms")]
    pub cycle_wait_ms: u64,

    /// Bounded wait for the switched-off acknowledgement at shutdown [ms].
    #[serde(default = "default_switch_off_timeout_ms")]
    pub switch_off_timeout_ms: u64,

    /// Network base address; the node id replaces the last octet.
    #[serde(default = "default_ip_base")]
    pub ip_base: Ipv4Addr,

    /// Subnet mask.
    #[serde(default = "default_subnet_mask")]
    pub subnet_mask: Ipv4Addr,

    /// Default gateway.
    #[serde(default = "default_gateway")]
    pub gateway: Ipv4Addr,
}

impl Default for FieldbusSection {
    fn default() -> Self {
        Self {
            node_id: DEFAULT_NODE_ID,
            device_name: String::new(),
            cycle_len_us: DEFAULT_CYCLE_LEN_US,
            cycle_wait_ms: DEFAULT_CYCLE_WAIT_MS,
            switch_off_timeout_ms: DEFAULT_SWITCH_OFF_TIMEOUT_MS,
            ip_base: DEFAULT_IP_BASE,
            subnet_mask: DEFAULT_SUBNET_MASK,
            gateway: DEFAULT_GATEWAY,
        }
    }
}

impl FieldbusSection {
    /// Cycle-ready wait as a `Duration`.
    pub fn cycle_wait(&self) -> Duration {
        Duration::from_millis(self.cycle_wait_ms)
    }

    /// Switched-off acknowledgement wait as a `Duration`.
    pub fn switch_off_timeout(&self) -> Duration {
        Duration::from_millis(self.switch_off_timeout_ms)
    }

    /// Node address: `ip_base` with the node id in the host part.
    pub fn node_address(&self) -> Ipv4Addr {
        let mask = u32::from(self.subnet_mask);
        Ipv4Addr::from((u32::from(self.ip_base) & mask) | u32::from(self.node_id))
    }
}

fn default_joystick_device() -> PathBuf {
    PathBuf::from(DEFAULT_JOYSTICK_DEVICE)
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

/// `[bridge]` section: input device and main loop behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSection {
    /// Joystick device node.
    #[serde(default = "default_joystick_device")]
    pub joystick_device: PathBuf,

    /// Main loop wait timeout / screen refresh interval [ms].
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Cyclic exchange driver.
    #[serde(default)]
    pub sync_strategy: SyncStrategy,

    /// Exchange the outbound image before the inbound one every cycle.
    #[serde(default)]
    pub drive_outputs: bool,
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            joystick_device: default_joystick_device(),
            tick_ms: DEFAULT_TICK_MS,
            sync_strategy: SyncStrategy::default(),
            drive_outputs: false,
        }
    }
}

impl LoopSection {
    /// Tick as a `Duration`.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Complete bridge configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
///
/// [fieldbus]
/// node_id = 12
/// device_name = "eth1"
/// cycle_len_us = 10000
///
/// [bridge]
/// joystick_device = "/dev/input/js1"
/// sync_strategy = "thread"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Logging and identity.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Fieldbus node parameters.
    #[serde(default)]
    pub fieldbus: FieldbusSection,

    /// Input device and loop parameters.
    #[serde(default)]
    pub bridge: LoopSection,
}

impl BridgeConfig {
    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `service_name` is not empty
    /// 2. `node_id` in `1..=MAX_CN_NODE_ID`
    /// 3. `cycle_len_us`, `cycle_wait_ms` and `tick_ms` > 0
    /// 4. `joystick_device` is not empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let node_id = self.fieldbus.node_id;
        if node_id == 0 || node_id > MAX_CN_NODE_ID {
            return Err(ConfigError::ValidationError(format!(
                "node_id {node_id} out of range (1..={MAX_CN_NODE_ID})"
            )));
        }
        if self.fieldbus.cycle_len_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_len_us must be greater than 0".to_string(),
            ));
        }
        if self.fieldbus.cycle_wait_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_wait_ms must be greater than 0".to_string(),
            ));
        }
        if self.bridge.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "tick_ms must be greater than 0".to_string(),
            ));
        }
        if self.bridge.joystick_device.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "joystick_device cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// Any `serde::de::DeserializeOwned` type gets this for free.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_log_level_deserialization() {
        #[derive(Debug, Deserialize)]
        struct TestWrapper {
            level: LogLevel,
        }

        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"trace\"").unwrap().level,
            LogLevel::Trace
        );
        assert_eq!(
            toml::from_str::<TestWrapper>("level = \"error\"").unwrap().level,
            LogLevel::Error
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fieldbus.node_id, DEFAULT_NODE_ID);
        assert_eq!(config.bridge.sync_strategy, SyncStrategy::Inline);
        assert_eq!(
            config.bridge.joystick_device,
            PathBuf::from(DEFAULT_JOYSTICK_DEVICE)
        );
    }

    #[test]
    fn test_node_id_zero_rejected() {
        let mut config = BridgeConfig::default();
        config.fieldbus.node_id = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_node_id_above_cn_range_rejected() {
        let mut config = BridgeConfig::default();
        config.fieldbus.node_id = MAX_CN_NODE_ID + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut config = BridgeConfig::default();
        config.bridge.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_address_uses_node_id() {
        let mut section = FieldbusSection::default();
        section.node_id = 12;
        assert_eq!(section.node_address(), Ipv4Addr::new(192, 168, 100, 12));
    }

    #[test]
    fn test_empty_service_name_rejected() {
        let shared = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(matches!(
            shared.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
