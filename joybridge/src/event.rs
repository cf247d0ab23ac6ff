//! Joystick events.
//!
//! The device delivers fixed 8-byte records in native byte order:
//!
//! | Offset | Size | Field    |
//! |--------|------|----------|
//! | 0      | 4    | `time`   |
//! | 4      | 2    | `value`  |
//! | 6      | 1    | `type`   |
//! | 7      | 1    | `number` |
//!
//! Records are decoded into [`InputEvent`] triples; everything after that
//! only deals with (kind, channel, value).

use bitflags::bitflags;

/// Size of one raw joystick record in bytes.
pub const JS_EVENT_SIZE: usize = 8;

bitflags! {
    /// Type byte of a raw joystick record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct JsEventType: u8 {
        /// Button pressed or released.
        const BUTTON = 0x01;
        /// Joystick axis moved.
        const AXIS = 0x02;
        /// Synthetic event carrying the initial device state.
        const INIT = 0x80;
    }
}

/// Raw joystick record as read from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawJsEvent {
    /// Event timestamp [ms].
    pub time: u32,
    /// Button state or axis position.
    pub value: i16,
    /// Event type flags.
    pub kind: JsEventType,
    /// Button or axis number.
    pub number: u8,
}

impl RawJsEvent {
    /// Decode one record.
    pub fn decode(bytes: &[u8; JS_EVENT_SIZE]) -> Self {
        Self {
            time: u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            value: i16::from_ne_bytes([bytes[4], bytes[5]]),
            kind: JsEventType::from_bits_retain(bytes[6]),
            number: bytes[7],
        }
    }

    /// Encode the record the way the kernel delivers it.
    pub fn encode(&self) -> [u8; JS_EVENT_SIZE] {
        let mut out = [0u8; JS_EVENT_SIZE];
        out[0..4].copy_from_slice(&self.time.to_ne_bytes());
        out[4..6].copy_from_slice(&self.value.to_ne_bytes());
        out[6] = self.kind.bits();
        out[7] = self.number;
        out
    }

    /// Whether the record carries initial device state.
    pub fn is_init(&self) -> bool {
        self.kind.contains(JsEventType::INIT)
    }

    /// Convert to an input event.
    ///
    /// The init flag is ignored. Returns `None` when the remaining type is
    /// neither exactly a button nor exactly an axis.
    pub fn to_input_event(&self) -> Option<InputEvent> {
        let kind = self.kind.difference(JsEventType::INIT);
        let kind = if kind == JsEventType::BUTTON {
            EventKind::Button
        } else if kind == JsEventType::AXIS {
            EventKind::Axis
        } else {
            return None;
        };
        Some(InputEvent {
            kind,
            channel: self.number,
            value: i32::from(self.value),
        })
    }
}

/// Kind of input change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Button; non-zero value = pressed.
    Button,
    /// Axis position.
    Axis,
}

/// Discrete input change: (kind, channel, value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEvent {
    /// Button or axis.
    pub kind: EventKind,
    /// Device-local channel index.
    pub channel: u8,
    /// Button state or axis position.
    pub value: i32,
}

impl InputEvent {
    /// Button event.
    pub fn button(channel: u8, pressed: bool) -> Self {
        Self {
            kind: EventKind::Button,
            channel,
            value: i32::from(pressed),
        }
    }

    /// Axis event.
    pub fn axis(channel: u8, value: i32) -> Self {
        Self {
            kind: EventKind::Axis,
            channel,
            value,
        }
    }
}
