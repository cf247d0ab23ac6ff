//! End-to-end sessions against the simulated stack: a FIFO stands in for
//! the joystick node, the loop polls it for real.

use joybridge::bridge;
use joybridge::event::{JsEventType, RawJsEvent};
use joybridge::exchange::{CyclicExchange, SyncThread};
use joybridge::mirror::SharedStateMirror;
use joybridge::multiplexer::{BridgeContext, CycleDriver, EventLoop, ExitReason, FdPoller, LoopState};
use joybridge::screen::{Screen, TerminalScreen};
use joybridge::stack::{NmtState, SimulatedStack};
use joybridge_common::config::FieldbusSection;
use joybridge_common::fieldbus::{FieldbusStack, InitParams};
use joybridge_common::image::{IMAGE_LINKS, JoystickImage};
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const ACK_TIMEOUT: Duration = Duration::from_secs(1);

fn params() -> InitParams {
    let section = FieldbusSection {
        node_id: 7,
        cycle_len_us: 1000,
        ..FieldbusSection::default()
    };
    InitParams::for_node(&section, "sim0")
}

fn fifo(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("js0");
    nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
    path
}

fn write_record(tx: &mut File, kind: JsEventType, number: u8, value: i16) {
    let record = RawJsEvent {
        time: 0,
        value,
        kind,
        number,
    };
    tx.write_all(&record.encode()).unwrap();
}

/// A running session: stack up, device open, loop built.
struct Session {
    _dir: TempDir,
    stack: Arc<SimulatedStack>,
    ctx: BridgeContext,
    tx: File,
    event_loop: EventLoop<joybridge::JoystickDevice, TerminalScreen<Vec<u8>>, FdPoller>,
}

impl Session {
    fn start(thread: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let path = fifo(&dir);
        let stack = Arc::new(SimulatedStack::new());

        let device = bridge::start(stack.as_ref(), &params(), &path, ACK_TIMEOUT).unwrap();
        let tx = OpenOptions::new().write(true).open(&path).unwrap();

        let ctx = BridgeContext {
            stack: stack.clone(),
            mirror: Arc::new(SharedStateMirror::new()),
            terminate: Arc::new(AtomicBool::new(false)),
            switch_off_timeout: ACK_TIMEOUT,
        };
        let exchange = CyclicExchange::new(
            stack.clone(),
            Arc::clone(&ctx.mirror),
            Duration::from_millis(20),
        );
        let cycle = if thread {
            CycleDriver::Thread(SyncThread::spawn(exchange).unwrap())
        } else {
            CycleDriver::Inline(exchange)
        };

        let mut screen = TerminalScreen::with_writer(Vec::new());
        screen.init().unwrap();
        let poller = FdPoller::new(device.try_clone_fd().unwrap(), None);
        let event_loop = EventLoop::new(device, screen, poller, ctx.clone(), Duration::from_millis(5))
            .with_cycle_driver(cycle);

        Self {
            _dir: dir,
            stack,
            ctx,
            tx,
            event_loop,
        }
    }

    /// Step until the stack's inbound image equals `expected`.
    fn step_until_inbound(&mut self, expected: JoystickImage) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.stack.inbound_image() != Some(expected) {
            assert!(Instant::now() < deadline, "inbound image never reached {expected:?}");
            assert_eq!(self.event_loop.step(), LoopState::Running);
        }
    }
}

fn expected_image() -> JoystickImage {
    let mut image = JoystickImage::default();
    image.set_button(0, true);
    image.set_button(9, true);
    image.set_axis(0, -150);
    image.set_axis(1, 300);
    image
}

fn feed_joystick(tx: &mut File) {
    write_record(tx, JsEventType::BUTTON | JsEventType::INIT, 0, 1);
    write_record(tx, JsEventType::BUTTON, 9, 1);
    write_record(tx, JsEventType::AXIS, 0, -150);
    write_record(tx, JsEventType::AXIS, 1, 300);
}

fn assert_clean_shutdown(stack: &SimulatedStack) {
    assert_eq!(stack.nmt_state(), NmtState::Off);
    assert!(!stack.is_alive());
    assert!(stack.inbound_image().is_none());
}

// ─── Sessions ──────────────────────────────────────────────────────

#[test]
fn inline_session_reaches_the_process_image() {
    let mut session = Session::start(false);
    assert_eq!(session.stack.linked_objects().len(), IMAGE_LINKS.len());
    assert_eq!(session.stack.params().unwrap().node_id, 7);

    feed_joystick(&mut session.tx);
    session.step_until_inbound(expected_image());
    assert_eq!(session.ctx.mirror.snapshot(), expected_image());

    session.ctx.terminate.store(true, Ordering::SeqCst);
    assert_eq!(session.event_loop.run(), ExitReason::TerminationSignal);
    assert!(!session.event_loop.device().is_open());
    assert_clean_shutdown(&session.stack);
}

#[test]
fn threaded_session_reaches_the_process_image() {
    let mut session = Session::start(true);

    feed_joystick(&mut session.tx);
    session.step_until_inbound(expected_image());

    write_record(&mut session.tx, JsEventType::BUTTON, 0, 0);
    let mut released = expected_image();
    released.set_button(0, false);
    session.step_until_inbound(released);

    session.ctx.terminate.store(true, Ordering::SeqCst);
    assert_eq!(session.event_loop.run(), ExitReason::TerminationSignal);
    assert_clean_shutdown(&session.stack);
}

#[test]
fn killed_stack_ends_the_session() {
    let mut session = Session::start(false);
    session.stack.kill();

    assert_eq!(session.event_loop.run(), ExitReason::StackGone);
    assert!(ExitReason::StackGone.is_failure());
    assert!(!session.stack.is_alive());
}

#[test]
fn unplugged_joystick_ends_the_session() {
    let mut session = Session::start(false);
    write_record(&mut session.tx, JsEventType::AXIS, 0, 10);
    let Session {
        tx,
        mut event_loop,
        stack,
        ..
    } = session;
    drop(tx);

    assert_eq!(event_loop.run(), ExitReason::DeviceFailed);
    assert_clean_shutdown(&stack);
}

#[test]
fn render_shows_the_mirror() {
    let mut session = Session::start(false);
    feed_joystick(&mut session.tx);
    session.step_until_inbound(expected_image());

    // Next idle iteration renders.
    for _ in 0..3 {
        session.event_loop.step();
    }
    let text = String::from_utf8(session.event_loop.screen().writer().clone()).unwrap();
    assert!(text.contains("ON "));
    assert!(text.contains("-150"));
    assert!(text.contains("300"));
}

// ─── Startup failures ──────────────────────────────────────────────

#[test]
fn missing_joystick_unwinds_the_stack() {
    let stack = SimulatedStack::new();
    let result = bridge::start(&stack, &params(), Path::new("/nonexistent/js0"), ACK_TIMEOUT);

    assert!(matches!(result, Err(joybridge::BridgeError::Device(_))));
    assert_eq!(stack.nmt_state(), NmtState::Off);
    assert!(!stack.is_alive());
}

#[test]
fn stack_initializes_only_once() {
    let dir = TempDir::new().unwrap();
    let path = fifo(&dir);
    let stack = SimulatedStack::new();
    let _device = bridge::start(&stack, &params(), &path, ACK_TIMEOUT).unwrap();

    assert!(bridge::init_stack(&stack, &params()).is_err());
    bridge::shutdown_stack(&stack, ACK_TIMEOUT);
    assert_clean_shutdown(&stack);
}
