//! Shared state mirror.
//!
//! The only place the process image record lives. The input side mutates
//! it one event at a time with [`SharedStateMirror::apply`]; the cyclic side
//! copies it out with [`SharedStateMirror::snapshot`]. Both hold the lock for
//! the field update or the copy only, never across I/O or a wait, so a
//! snapshot can never observe half of an event.

use crate::event::{EventKind, InputEvent};
use joybridge_common::image::JoystickImage;
use parking_lot::Mutex;

/// Lock-guarded process image record.
#[derive(Debug, Default)]
pub struct SharedStateMirror {
    image: Mutex<JoystickImage>,
}

impl SharedStateMirror {
    /// Create a zeroed mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event.
    ///
    /// Buttons 0..=15 set or clear exactly one bit; axes 0 and 1 replace the
    /// axis value, saturated to `i16`. Other channels leave the record
    /// untouched. Returns whether the record was updated.
    pub fn apply(&self, event: &InputEvent) -> bool {
        let channel = usize::from(event.channel);
        let mut image = self.image.lock();
        match event.kind {
            EventKind::Button => image.set_button(channel, event.value != 0),
            EventKind::Axis => image.set_axis(channel, saturate(event.value)),
        }
    }

    /// Full copy of the record.
    pub fn snapshot(&self) -> JoystickImage {
        *self.image.lock()
    }
}

#[inline]
fn saturate(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mirror_is_zeroed() {
        assert_eq!(SharedStateMirror::new().snapshot(), JoystickImage::default());
    }

    #[test]
    fn button_press_and_release() {
        let mirror = SharedStateMirror::new();
        assert!(mirror.apply(&InputEvent::button(0, true)));
        assert_eq!(mirror.snapshot().buttons_low, 0x01);
        assert!(mirror.apply(&InputEvent::button(0, false)));
        assert_eq!(mirror.snapshot().buttons_low, 0x00);
    }

    #[test]
    fn high_buttons_land_in_second_byte() {
        let mirror = SharedStateMirror::new();
        mirror.apply(&InputEvent::button(8, true));
        mirror.apply(&InputEvent::button(15, true));
        let image = mirror.snapshot();
        assert_eq!(image.buttons_low, 0);
        assert_eq!(image.buttons_high, 0b1000_0001);
    }

    #[test]
    fn any_nonzero_value_presses() {
        let mirror = SharedStateMirror::new();
        mirror.apply(&InputEvent {
            kind: EventKind::Button,
            channel: 2,
            value: -7,
        });
        assert_eq!(mirror.snapshot().button(2), Some(true));
    }

    #[test]
    fn axis_values_replace_and_saturate() {
        let mirror = SharedStateMirror::new();
        mirror.apply(&InputEvent::axis(0, -150));
        let image = mirror.snapshot();
        assert_eq!(image.axis_x, -150);
        assert_eq!(image.axis_y, 0);

        mirror.apply(&InputEvent::axis(1, 100_000));
        mirror.apply(&InputEvent::axis(0, -100_000));
        let image = mirror.snapshot();
        assert_eq!(image.axis_x, i16::MIN);
        assert_eq!(image.axis_y, i16::MAX);
    }

    #[test]
    fn out_of_range_channels_are_ignored() {
        let mirror = SharedStateMirror::new();
        mirror.apply(&InputEvent::button(1, true));
        let before = mirror.snapshot();

        assert!(!mirror.apply(&InputEvent::button(16, true)));
        assert!(!mirror.apply(&InputEvent::button(255, true)));
        assert!(!mirror.apply(&InputEvent::axis(2, 500)));
        assert_eq!(mirror.snapshot(), before);
    }
}
