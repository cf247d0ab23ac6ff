//! System-wide constants for the joybridge workspace.
//!
//! Single source of truth for defaults, device paths and network layout.

use std::net::Ipv4Addr;

/// Canonical service name (used for logging and the stack hostname).
pub const SERVICE_NAME: &str = "joybridge";

/// Default joystick device node.
pub const DEFAULT_JOYSTICK_DEVICE: &str = "/dev/input/js0";

/// Default fieldbus node identifier.
pub const DEFAULT_NODE_ID: u8 = 1;

/// Highest node id a controlled node may use.
pub const MAX_CN_NODE_ID: u8 = 239;

/// Default fieldbus cycle length in microseconds (50 ms).
pub const DEFAULT_CYCLE_LEN_US: u32 = 50_000;

/// Main loop wait timeout / screen refresh interval in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 100;

/// Bounded wait for the cycle-ready signal in milliseconds.
pub const DEFAULT_CYCLE_WAIT_MS: u64 = 100;

/// Bounded wait for the switched-off acknowledgement in milliseconds.
pub const DEFAULT_SWITCH_OFF_TIMEOUT_MS: u64 = 1000;

/// Network base address; the node id is placed in the last octet.
pub const DEFAULT_IP_BASE: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 0);

/// Default subnet mask.
pub const DEFAULT_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Default gateway.
pub const DEFAULT_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 100, 254);

/// Key that requests a software reset of the node.
pub const KEY_RESET: u8 = b'r';

/// Key that leaves the program (Esc).
pub const KEY_QUIT: u8 = 0x1B;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(DEFAULT_NODE_ID >= 1 && DEFAULT_NODE_ID <= MAX_CN_NODE_ID);
        assert!(DEFAULT_CYCLE_LEN_US > 0);
        assert!(DEFAULT_TICK_MS > 0);
        assert!(DEFAULT_CYCLE_WAIT_MS > 0);
        assert_ne!(KEY_RESET, KEY_QUIT);
    }

    #[test]
    fn gateway_is_inside_subnet() {
        let base = u32::from(DEFAULT_IP_BASE);
        let mask = u32::from(DEFAULT_SUBNET_MASK);
        assert_eq!(u32::from(DEFAULT_GATEWAY) & mask, base & mask);
    }
}
