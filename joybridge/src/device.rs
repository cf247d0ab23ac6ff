//! Joystick device reader.
//!
//! Opens the event device non-blocking and drains it until the kernel
//! reports "would block". Records split across reads are kept in a small
//! buffer and completed by the next read, so no bytes are ever dropped.

use crate::error::DeviceError;
use crate::event::{InputEvent, JS_EVENT_SIZE, RawJsEvent};
use crate::mirror::SharedStateMirror;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace};

/// Source of input events driven by the main loop.
pub trait InputDevice {
    /// Read everything available and apply it to `mirror`.
    ///
    /// Returns the number of events applied. An error is fatal for the
    /// device; events decoded before the failure have been applied.
    fn drain_into(&mut self, mirror: &SharedStateMirror) -> Result<usize, DeviceError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Non-blocking reader of a Linux joystick event stream.
#[derive(Debug)]
pub struct JoystickDevice {
    path: PathBuf,
    file: Option<File>,
    pending: [u8; JS_EVENT_SIZE],
    pending_len: usize,
}

impl JoystickDevice {
    /// Open `path` read-only and non-blocking.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(path)
            .map_err(|source| DeviceError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Opened input device {}", path.display());
        Ok(Self::with_file(path, file))
    }

    /// Wrap an already open stream (a pipe, a socket) as a device.
    ///
    /// The descriptor is switched to non-blocking mode.
    pub fn from_fd(path: &Path, fd: OwnedFd) -> Result<Self, DeviceError> {
        set_nonblocking(&fd).map_err(|errno| DeviceError::Open {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        })?;
        Ok(Self::with_file(path, File::from(fd)))
    }

    fn with_file(path: &Path, file: File) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Some(file),
            pending: [0; JS_EVENT_SIZE],
            pending_len: 0,
        }
    }

    /// Device path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the device is still open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Descriptor to wait on, `None` once closed.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.file.as_ref().map(|file| file.as_fd())
    }

    /// Duplicate the descriptor for a poller.
    pub fn try_clone_fd(&self) -> Result<OwnedFd, DeviceError> {
        let fd = self.fd().ok_or_else(|| DeviceError::Closed {
            path: self.path.clone(),
        })?;
        fd.try_clone_to_owned().map_err(|source| DeviceError::Read {
            path: self.path.clone(),
            source,
        })
    }

    /// Lazily read events until the device would block.
    ///
    /// The iterator is finite: it ends at "would block" or right after
    /// yielding the first error.
    pub fn drain_events(&mut self) -> DrainEvents<'_> {
        DrainEvents {
            device: self,
            done: false,
        }
    }

    /// Read one complete record. `Ok(None)` means "would block".
    fn read_record(&mut self) -> Result<Option<RawJsEvent>, DeviceError> {
        let Some(file) = self.file.as_mut() else {
            return Err(DeviceError::Closed {
                path: self.path.clone(),
            });
        };

        while self.pending_len < JS_EVENT_SIZE {
            match file.read(&mut self.pending[self.pending_len..]) {
                Ok(0) => {
                    return Err(DeviceError::Disconnected {
                        path: self.path.clone(),
                    });
                }
                Ok(n) => self.pending_len += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if self.pending_len > 0 {
                        trace!("Partial record buffered ({} bytes)", self.pending_len);
                    }
                    return Ok(None);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(DeviceError::Read {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }

        self.pending_len = 0;
        Ok(Some(RawJsEvent::decode(&self.pending)))
    }
}

impl InputDevice for JoystickDevice {
    fn drain_into(&mut self, mirror: &SharedStateMirror) -> Result<usize, DeviceError> {
        let mut applied = 0;
        for event in self.drain_events() {
            mirror.apply(&event?);
            applied += 1;
        }
        Ok(applied)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            info!("Closed input device {}", self.path.display());
        }
    }
}

/// Iterator returned by [`JoystickDevice::drain_events`].
pub struct DrainEvents<'a> {
    device: &'a mut JoystickDevice,
    done: bool,
}

impl Iterator for DrainEvents<'_> {
    type Item = Result<InputEvent, DeviceError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.device.read_record() {
                Ok(Some(raw)) => match raw.to_input_event() {
                    Some(event) => return Some(Ok(event)),
                    None => debug!("Skipping record with type 0x{:02x}", raw.kind.bits()),
                },
                Ok(None) => self.done = true,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

/// Put a descriptor into non-blocking mode, keeping its other flags.
fn set_nonblocking(fd: &OwnedFd) -> nix::Result<()> {
    let flags = OFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::JsEventType;
    use std::io::Write;

    fn pipe_device() -> (JoystickDevice, File) {
        let (rx, tx) = nix::unistd::pipe().unwrap();
        let device = JoystickDevice::from_fd(Path::new("pipe"), rx).unwrap();
        (device, File::from(tx))
    }

    fn record(kind: JsEventType, number: u8, value: i16) -> [u8; JS_EVENT_SIZE] {
        RawJsEvent {
            time: 0,
            value,
            kind,
            number,
        }
        .encode()
    }

    #[test]
    fn from_fd_switches_to_nonblocking() {
        let (rx, _tx) = nix::unistd::pipe().unwrap();
        let before = OFlag::from_bits_retain(fcntl(&rx, FcntlArg::F_GETFL).unwrap());
        assert!(!before.contains(OFlag::O_NONBLOCK));

        let device = JoystickDevice::from_fd(Path::new("pipe"), rx).unwrap();
        let fd = device.fd().unwrap();
        let after = OFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFL).unwrap());
        assert!(after.contains(OFlag::O_NONBLOCK));
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let (mut device, _tx) = pipe_device();
        assert_eq!(device.drain_events().count(), 0);
    }

    #[test]
    fn split_record_is_completed_later() {
        let (mut device, mut tx) = pipe_device();
        let bytes = record(JsEventType::AXIS, 0, -150);

        tx.write_all(&bytes[..3]).unwrap();
        assert_eq!(device.drain_events().count(), 0);

        tx.write_all(&bytes[3..]).unwrap();
        let events: Vec<_> = device.drain_events().collect::<Result<_, _>>().unwrap();
        assert_eq!(events, vec![InputEvent::axis(0, -150)]);
    }

    #[test]
    fn closed_writer_is_a_disconnect() {
        let (mut device, tx) = pipe_device();
        drop(tx);
        let mut events = device.drain_events();
        assert!(matches!(
            events.next(),
            Some(Err(DeviceError::Disconnected { .. }))
        ));
        assert!(events.next().is_none());
    }

    #[test]
    fn close_is_idempotent() {
        let (mut device, _tx) = pipe_device();
        device.close();
        device.close();
        assert!(!device.is_open());
        assert!(device.fd().is_none());
        assert!(matches!(
            device.drain_into(&SharedStateMirror::new()),
            Err(DeviceError::Closed { .. })
        ));
    }
}
