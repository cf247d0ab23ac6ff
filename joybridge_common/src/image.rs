//! Joystick process image.
//!
//! The input process image follows the CiA 401 two-axis joystick device
//! profile:
//!
//! | Offset | Field          | Type | Object        |
//! |--------|----------------|------|---------------|
//! | 0      | `buttons_low`  | u8   | 0x6000 / 0x01 |
//! | 1      | `buttons_high` | u8   | 0x6000 / 0x02 |
//! | 2      | `axis_x`       | i16  | 0x6401 / 0x01 |
//! | 4      | `axis_y`       | i16  | 0x6401 / 0x02 |
//!
//! Buttons are bit-packed: bit `n` of `buttons_low` is button `n`, bit `n`
//! of `buttons_high` is button `8 + n`. The wire form is little-endian.

use crate::fieldbus::ObjectLink;
use core::mem::{offset_of, size_of};
use static_assertions::const_assert_eq;

/// Number of button channels carried by the image.
pub const BUTTON_CHANNELS: usize = 16;

/// Number of axis channels carried by the image.
pub const AXIS_CHANNELS: usize = 2;

/// Object index of the digital input bytes.
pub const OBJ_DIGITAL_INPUTS: u16 = 0x6000;

/// Object index of the analog input words.
pub const OBJ_ANALOG_INPUTS: u16 = 0x6401;

/// Input process image record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct JoystickImage {
    /// Buttons 0..=7.
    pub buttons_low: u8,
    /// Buttons 8..=15.
    pub buttons_high: u8,
    /// Axis 0.
    pub axis_x: i16,
    /// Axis 1.
    pub axis_y: i16,
}

const_assert_eq!(size_of::<JoystickImage>(), 6);
const_assert_eq!(offset_of!(JoystickImage, buttons_high), 1);
const_assert_eq!(offset_of!(JoystickImage, axis_x), 2);
const_assert_eq!(offset_of!(JoystickImage, axis_y), 4);

/// Input process image size in bytes.
pub const IMAGE_SIZE: usize = size_of::<JoystickImage>();

/// Object dictionary links of every image field, in link order.
pub const IMAGE_LINKS: [ObjectLink; 4] = [
    ObjectLink {
        name: "buttons_low",
        index: OBJ_DIGITAL_INPUTS,
        subindex: 0x01,
        offset: offset_of!(JoystickImage, buttons_low),
        size: size_of::<u8>(),
    },
    ObjectLink {
        name: "buttons_high",
        index: OBJ_DIGITAL_INPUTS,
        subindex: 0x02,
        offset: offset_of!(JoystickImage, buttons_high),
        size: size_of::<u8>(),
    },
    ObjectLink {
        name: "axis_x",
        index: OBJ_ANALOG_INPUTS,
        subindex: 0x01,
        offset: offset_of!(JoystickImage, axis_x),
        size: size_of::<i16>(),
    },
    ObjectLink {
        name: "axis_y",
        index: OBJ_ANALOG_INPUTS,
        subindex: 0x02,
        offset: offset_of!(JoystickImage, axis_y),
        size: size_of::<i16>(),
    },
];

/// Read a single bit of a button byte.
#[inline]
pub fn get_bit(byte: u8, bit: usize) -> bool {
    debug_assert!(bit < 8, "bit index {bit} out of range");
    (byte >> bit) & 1 == 1
}

/// Set or clear a single bit of a button byte, preserving the others.
#[inline]
pub fn set_bit(byte: &mut u8, bit: usize, value: bool) {
    debug_assert!(bit < 8, "bit index {bit} out of range");
    if value {
        *byte |= 1u8 << bit;
    } else {
        *byte &= !(1u8 << bit);
    }
}

impl JoystickImage {
    /// State of button `channel`, `None` if the image has no such button.
    pub fn button(&self, channel: usize) -> Option<bool> {
        match channel {
            0..=7 => Some(get_bit(self.buttons_low, channel)),
            8..=15 => Some(get_bit(self.buttons_high, channel - 8)),
            _ => None,
        }
    }

    /// Set button `channel`. Returns `false` (and changes nothing) if the
    /// image has no such button.
    pub fn set_button(&mut self, channel: usize, pressed: bool) -> bool {
        match channel {
            0..=7 => set_bit(&mut self.buttons_low, channel, pressed),
            8..=15 => set_bit(&mut self.buttons_high, channel - 8, pressed),
            _ => return false,
        }
        true
    }

    /// Value of axis `channel`, `None` if the image has no such axis.
    pub fn axis(&self, channel: usize) -> Option<i16> {
        match channel {
            0 => Some(self.axis_x),
            1 => Some(self.axis_y),
            _ => None,
        }
    }

    /// Set axis `channel`. Returns `false` (and changes nothing) if the
    /// image has no such axis.
    pub fn set_axis(&mut self, channel: usize, value: i16) -> bool {
        match channel {
            0 => self.axis_x = value,
            1 => self.axis_y = value,
            _ => return false,
        }
        true
    }

    /// Number of pressed buttons.
    pub fn pressed_count(&self) -> u32 {
        self.buttons_low.count_ones() + self.buttons_high.count_ones()
    }

    /// Wire form of the image (little-endian fields at their link offsets).
    pub fn to_bytes(&self) -> [u8; IMAGE_SIZE] {
        let mut out = [0u8; IMAGE_SIZE];
        out[0] = self.buttons_low;
        out[1] = self.buttons_high;
        out[2..4].copy_from_slice(&self.axis_x.to_le_bytes());
        out[4..6].copy_from_slice(&self.axis_y.to_le_bytes());
        out
    }

    /// Decode the wire form produced by [`JoystickImage::to_bytes`].
    pub fn from_bytes(bytes: &[u8; IMAGE_SIZE]) -> Self {
        Self {
            buttons_low: bytes[0],
            buttons_high: bytes[1],
            axis_x: i16::from_le_bytes([bytes[2], bytes[3]]),
            axis_y: i16::from_le_bytes([bytes[4], bytes[5]]),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_image_is_zeroed() {
        let image = JoystickImage::default();
        assert_eq!(image.to_bytes(), [0u8; IMAGE_SIZE]);
        assert_eq!(image.pressed_count(), 0);
    }

    #[test]
    fn links_cover_the_whole_image() {
        let mut covered = [false; IMAGE_SIZE];
        for link in &IMAGE_LINKS {
            for byte in link.offset..link.offset + link.size {
                assert!(!covered[byte], "{} overlaps another field", link.name);
                covered[byte] = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn links_follow_joystick_profile() {
        assert_eq!((IMAGE_LINKS[0].index, IMAGE_LINKS[0].subindex), (0x6000, 0x01));
        assert_eq!((IMAGE_LINKS[1].index, IMAGE_LINKS[1].subindex), (0x6000, 0x02));
        assert_eq!((IMAGE_LINKS[2].index, IMAGE_LINKS[2].subindex), (0x6401, 0x01));
        assert_eq!((IMAGE_LINKS[3].index, IMAGE_LINKS[3].subindex), (0x6401, 0x02));
    }

    #[test]
    fn set_button_preserves_other_bits() {
        let mut image = JoystickImage::default();
        assert!(image.set_button(0, true));
        assert!(image.set_button(3, true));
        assert!(image.set_button(9, true));
        assert_eq!(image.buttons_low, 0b0000_1001);
        assert_eq!(image.buttons_high, 0b0000_0010);

        assert!(image.set_button(0, false));
        assert_eq!(image.buttons_low, 0b0000_1000);
        assert_eq!(image.button(3), Some(true));
        assert_eq!(image.button(9), Some(true));
        assert_eq!(image.pressed_count(), 2);
    }

    #[test]
    fn out_of_range_channels_are_rejected() {
        let mut image = JoystickImage::default();
        assert!(!image.set_button(16, true));
        assert!(!image.set_axis(2, 100));
        assert_eq!(image, JoystickImage::default());
        assert_eq!(image.button(16), None);
        assert_eq!(image.axis(2), None);
    }

    #[test]
    fn wire_form_is_little_endian() {
        let image = JoystickImage {
            buttons_low: 0x81,
            buttons_high: 0x02,
            axis_x: -150,
            axis_y: 0x1234,
        };
        let bytes = image.to_bytes();
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 0x02);
        assert_eq!(&bytes[2..4], &(-150i16).to_le_bytes());
        assert_eq!(&bytes[4..6], &[0x34, 0x12]);
        assert_eq!(JoystickImage::from_bytes(&bytes), image);
    }

    #[test]
    fn bit_helpers() {
        let mut byte = 0u8;
        set_bit(&mut byte, 7, true);
        assert!(get_bit(byte, 7));
        assert!(!get_bit(byte, 6));
        set_bit(&mut byte, 7, false);
        assert_eq!(byte, 0);
    }
}
