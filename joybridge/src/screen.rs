//! Terminal user interface.
//!
//! A fixed layout of one row per button and axis; the titles are drawn once
//! and only the value column is rewritten on every tick. Keys are read one
//! byte at a time from stdin, which is switched out of canonical mode while
//! the screen is active.

use joybridge_common::consts::{KEY_QUIT, KEY_RESET};
use joybridge_common::image::{AXIS_CHANNELS, BUTTON_CHANNELS, JoystickImage};
use std::io::{self, Stdout, Write};
use std::os::fd::BorrowedFd;
use tracing::{debug, warn};

/// Column (1-based) where values are drawn.
pub const VALUE_COLUMN: usize = 14;

/// Row (1-based) of the first button.
const FIRST_ROW: usize = 2;

/// Operator interface of the main loop.
pub trait Screen {
    /// Prepare the terminal and draw the static parts.
    fn init(&mut self) -> io::Result<()>;

    /// Descriptor that becomes readable when a key is pending.
    fn input_fd(&self) -> Option<BorrowedFd<'_>>;

    /// Read one pending key. `Ok(None)` if nothing could be read.
    fn read_key(&mut self) -> io::Result<Option<u8>>;

    /// Redraw the values of `image`.
    fn render(&mut self, image: &JoystickImage) -> io::Result<()>;

    /// Restore the terminal. Safe to call more than once.
    fn teardown(&mut self);
}

/// Row (1-based) of button `channel`.
pub fn button_row(channel: usize) -> usize {
    FIRST_ROW + channel
}

/// Row (1-based) of axis `channel`.
pub fn axis_row(channel: usize) -> usize {
    FIRST_ROW + BUTTON_CHANNELS + channel
}

/// Rendered button state, padded to a constant width.
pub fn format_button(pressed: bool) -> &'static str {
    if pressed { "ON " } else { "OFF" }
}

/// Rendered axis value, left-aligned and padded so shorter values erase
/// longer ones.
pub fn format_axis(value: i16) -> String {
    format!("{value:<6}")
}

/// ANSI terminal screen.
pub struct TerminalScreen<W: Write = Stdout> {
    out: W,
    raw_mode: bool,
    saved: Option<libc::termios>,
    active: bool,
}

impl TerminalScreen<Stdout> {
    /// Screen on stdout, reading keys from stdin.
    pub fn stdout() -> Self {
        Self {
            out: io::stdout(),
            raw_mode: true,
            saved: None,
            active: false,
        }
    }
}

impl<W: Write> TerminalScreen<W> {
    /// Screen drawing into `out` without touching the terminal mode.
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            raw_mode: false,
            saved: None,
            active: false,
        }
    }

    /// Underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }

    fn draw_titles(&mut self) -> io::Result<()> {
        write!(self.out, "\x1b[2J\x1b[?25l")?;
        move_to(&mut self.out, 1, 1)?;
        write!(self.out, "joybridge ({}/{} quit/reset)", key_name(KEY_QUIT), key_name(KEY_RESET))?;
        for channel in 0..BUTTON_CHANNELS {
            move_to(&mut self.out, button_row(channel), 1)?;
            write!(self.out, "Button {channel:2} : ")?;
        }
        for channel in 0..AXIS_CHANNELS {
            move_to(&mut self.out, axis_row(channel), 1)?;
            write!(self.out, "Axis {channel:2}   : ")?;
        }
        let help = axis_row(AXIS_CHANNELS) + 1;
        move_to(&mut self.out, help, 1)?;
        write!(self.out, "Press Esc to leave the program")?;
        move_to(&mut self.out, help + 1, 1)?;
        write!(self.out, "Press r to reset the node")?;
        self.out.flush()
    }

    fn enter_raw_mode(&mut self) -> io::Result<()> {
        let fd = libc::STDIN_FILENO;
        // SAFETY: isatty only inspects the descriptor.
        if unsafe { libc::isatty(fd) } == 0 {
            debug!("stdin is not a terminal, keeping its mode");
            return Ok(());
        }

        // SAFETY: termios is plain old data; tcgetattr fills it completely.
        let mut termios: libc::termios = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is stdin and `termios` is a valid out pointer.
        if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        self.saved = Some(termios);

        // Keys one at a time, no echo. ISIG stays on so Ctrl-C still
        // reaches the termination handler.
        termios.c_lflag &= !(libc::ICANON | libc::ECHO);
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;

        // SAFETY: as above.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn restore_mode(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        let fd = libc::STDIN_FILENO;
        // SAFETY: `saved` came from tcgetattr on the same descriptor.
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &saved) } != 0 {
            warn!("Failed to restore terminal mode: {}", io::Error::last_os_error());
        }
    }
}

impl<W: Write> Screen for TerminalScreen<W> {
    fn init(&mut self) -> io::Result<()> {
        if self.raw_mode {
            self.enter_raw_mode()?;
        }
        self.active = true;
        self.draw_titles()
    }

    fn input_fd(&self) -> Option<BorrowedFd<'_>> {
        if self.raw_mode {
            // SAFETY: stdin stays open for the lifetime of the process.
            Some(unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) })
        } else {
            None
        }
    }

    fn read_key(&mut self) -> io::Result<Option<u8>> {
        let mut key = 0u8;
        // SAFETY: reads at most one byte into `key`.
        let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut key as *mut u8).cast(), 1) };
        match n {
            1 => Ok(Some(key)),
            0 => Ok(None),
            _ => {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                    _ => Err(err),
                }
            }
        }
    }

    fn render(&mut self, image: &JoystickImage) -> io::Result<()> {
        for channel in 0..BUTTON_CHANNELS {
            let pressed = image.button(channel).unwrap_or(false);
            move_to(&mut self.out, button_row(channel), VALUE_COLUMN)?;
            self.out.write_all(format_button(pressed).as_bytes())?;
        }
        for channel in 0..AXIS_CHANNELS {
            let value = image.axis(channel).unwrap_or(0);
            move_to(&mut self.out, axis_row(channel), VALUE_COLUMN)?;
            self.out.write_all(format_axis(value).as_bytes())?;
        }
        self.out.flush()
    }

    fn teardown(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        let below = axis_row(AXIS_CHANNELS) + 3;
        let result = move_to(&mut self.out, below, 1)
            .and_then(|()| write!(self.out, "\x1b[?25h"))
            .and_then(|()| self.out.flush());
        if let Err(e) = result {
            warn!("Failed to reset screen: {}", e);
        }
        self.restore_mode();
    }
}

fn move_to<W: Write>(out: &mut W, row: usize, column: usize) -> io::Result<()> {
    write!(out, "\x1b[{row};{column}H")
}

fn key_name(key: u8) -> String {
    match key {
        0x1b => "Esc".to_string(),
        k => char::from(k).to_string(),
    }
}
