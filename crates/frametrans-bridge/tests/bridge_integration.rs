//! Integration tests for the transport bridge.
//!
//! These tests drive `TransportBridge` through the public API with the
//! built-in dummy transport and instrumented back-ends.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use frametrans_bridge::infrastructure::interception::HostInterception;
use frametrans_bridge::infrastructure::plugin_loader::{BuiltinRegistry, TransportResolver};
use frametrans_bridge::{BridgeContext, BridgeError, TransportBridge};
use frametrans_core::{
    DisplayHandle, InterceptionContext, PixelFormat, RawFrame, SessionHandle, TransportParams,
    TransportPlugin, WindowHandle,
};
use frametrans_dummy::DummyTransport;
use mockall::mock;
use mockall::predicate::eq;

fn dummy_context() -> BridgeContext {
    BridgeContext::new(
        Arc::new(TransportResolver::with_plugin_dirs(Vec::new())),
        Arc::new(HostInterception::new()),
    )
}

fn open(name: &str, ctx: &BridgeContext) -> TransportBridge {
    TransportBridge::open(DisplayHandle::null(), WindowHandle(0), name, ctx)
        .expect("bridge must open")
}

// ── Dummy transport scenario ──────────────────────────────────────────────────

#[test]
fn test_dummy_scenario_runs_end_to_end() {
    // Arrange
    let ctx = dummy_context();

    // Act / Assert: every step of the lifecycle succeeds
    let bridge = open("dummy", &ctx);
    bridge.connect("localhost", 0).expect("connect");
    let frame = bridge
        .get_frame(64, 64, PixelFormat::Rgb, false)
        .expect("get_frame");
    assert_eq!(frame.width(), 64);
    assert_eq!(frame.height(), 64);
    assert_eq!(frame.pitch(), 64 * 3);
    bridge.send_frame(frame, true).expect("send_frame");
    bridge.destroy().expect("destroy");

    assert!(bridge.is_destroyed());
}

#[test]
fn test_zero_geometry_is_forwarded_unmodified() {
    let bridge = open("dummy", &dummy_context());

    let mut frame = bridge
        .get_frame(0, 0, PixelFormat::Bgra, false)
        .expect("get_frame");

    assert_eq!((frame.width(), frame.height()), (0, 0));
    assert!(frame.pixels_mut().is_empty());
    bridge.send_frame(frame, false).expect("send_frame");
}

#[test]
fn test_failed_connect_leaves_bridge_usable() {
    // Arrange
    let bridge = open("dummy", &dummy_context());

    // Act
    let err = bridge.connect("unreachable.invalid", -1).expect_err("must fail");

    // Assert
    match err {
        BridgeError::Transport { message, .. } => assert_eq!(message, "invalid port -1"),
        other => panic!("expected Transport, got {other}"),
    }
    assert!(bridge.ready().expect("ready") > 0);
    let frame = bridge
        .get_frame(8, 8, PixelFormat::Rgba, false)
        .expect("get_frame");
    bridge.send_frame(frame, false).expect("send_frame");
}

#[test]
fn test_calls_after_destroy_report_session_closed() {
    let bridge = open("dummy", &dummy_context());
    bridge.destroy().expect("destroy");

    assert!(matches!(
        bridge.ready(),
        Err(BridgeError::SessionClosed { .. })
    ));
    bridge.destroy().expect("second destroy is a no-op");
}

#[test]
fn test_frame_stays_readable_when_destroy_is_attempted() {
    // Arrange
    let bridge = open("dummy", &dummy_context());
    let mut frame = bridge
        .get_frame(64, 64, PixelFormat::Rgb, false)
        .expect("get_frame");

    // Act
    let refused = bridge.destroy();

    // Assert: the dummy pool still backs the frame
    assert!(matches!(
        refused,
        Err(BridgeError::FramesOutstanding { count: 1, .. })
    ));
    assert!(!bridge.is_destroyed());
    assert_eq!(frame.width(), 64);
    assert_eq!(frame.pixels_mut().len(), 64 * 64 * 3);
    bridge.send_frame(frame, false).expect("send_frame");
    bridge.destroy().expect("destroy once the frame is back");
}

#[test]
fn test_destroy_from_another_thread_waits_for_held_frame() {
    // Arrange
    let bridge = Arc::new(open("dummy", &dummy_context()));
    let mut frame = bridge
        .get_frame(16, 16, PixelFormat::Bgra, false)
        .expect("get_frame");

    // Act
    let remote = Arc::clone(&bridge);
    let refused = thread::spawn(move || remote.destroy())
        .join()
        .expect("destroy thread");

    // Assert
    assert!(matches!(refused, Err(BridgeError::FramesOutstanding { .. })));
    frame.pixels_mut().fill(0xFF);
    drop(frame);
    assert_eq!(bridge.frames_outstanding(), 0);
    bridge.destroy().expect("destroy");
}

#[test]
fn test_unknown_transport_fails_to_open() {
    let result = TransportBridge::open(
        DisplayHandle::null(),
        WindowHandle(0),
        "no-such-transport-xyz",
        &dummy_context(),
    );

    assert!(matches!(result, Err(BridgeError::PluginLoad { .. })));
}

// ── Concurrency ───────────────────────────────────────────────────────────────

/// Back-end that detects overlapping calls.
struct OverlapDetector {
    inner: DummyTransport,
    in_flight: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl OverlapDetector {
    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_micros(50));
    }

    fn leave(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut DummyTransport) -> T) -> T {
        self.enter();
        let out = f(&mut self.inner);
        self.leave();
        out
    }
}

impl TransportPlugin for OverlapDetector {
    fn init(
        &mut self,
        display: DisplayHandle,
        window: WindowHandle,
        params: &TransportParams,
    ) -> Option<SessionHandle> {
        self.guarded(|t| t.init(display, window, params))
    }
    fn connect(&mut self, session: SessionHandle, receiver: &str, port: i32) -> i32 {
        self.guarded(|t| t.connect(session, receiver, port))
    }
    fn get_frame(
        &mut self,
        session: SessionHandle,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
    ) -> Option<NonNull<RawFrame>> {
        self.guarded(|t| t.get_frame(session, width, height, format, stereo))
    }
    fn ready(&mut self, session: SessionHandle) -> i32 {
        self.guarded(|t| t.ready(session))
    }
    fn synchronize(&mut self, session: SessionHandle) -> i32 {
        self.guarded(|t| t.synchronize(session))
    }
    fn send_frame(&mut self, session: SessionHandle, frame: NonNull<RawFrame>, sync: bool) -> i32 {
        self.guarded(|t| t.send_frame(session, frame, sync))
    }
    fn destroy(&mut self, session: SessionHandle) -> i32 {
        self.guarded(|t| t.destroy(session))
    }
    fn last_error(&self) -> String {
        self.inner.last_error()
    }
}

#[test]
fn test_concurrent_callers_never_overlap_inside_backend() {
    // Arrange
    const THREADS: usize = 8;
    const ROUNDS: usize = 25;

    let in_flight = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = BuiltinRegistry::new();
    {
        let (in_flight, overlaps, calls) =
            (Arc::clone(&in_flight), Arc::clone(&overlaps), Arc::clone(&calls));
        registry.register("detector", move || {
            Box::new(OverlapDetector {
                inner: DummyTransport::new(),
                in_flight: Arc::clone(&in_flight),
                overlaps: Arc::clone(&overlaps),
                calls: Arc::clone(&calls),
            })
        });
    }
    let ctx = BridgeContext::new(Arc::new(registry), Arc::new(HostInterception::new()));
    let bridge = Arc::new(open("detector", &ctx));

    // Act
    let workers: Vec<_> = (0..THREADS)
        .map(|i| {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    bridge.ready().expect("ready");
                    if i % 2 == 0 {
                        bridge.synchronize().expect("synchronize");
                    } else {
                        bridge.connect("localhost", 4242).expect("connect");
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }

    // Assert
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    // init + two calls per round per thread
    assert_eq!(calls.load(Ordering::SeqCst), 1 + THREADS * ROUNDS * 2);
}

// ── Interception balance ──────────────────────────────────────────────────────

mock! {
    Interception {}

    impl InterceptionContext for Interception {
        fn level(&self) -> i32;
        fn set_level(&self, level: i32);
        fn set_exclude_current(&self, exclude: bool);
    }
}

#[test]
fn test_interception_is_restored_after_every_call_including_failures() {
    // Arrange: init, 3× ready, failing connect, get_frame, send_frame,
    // synchronize, destroy
    const GUARDED_CALLS: usize = 9;

    let level = Arc::new(AtomicI32::new(0));
    let mut mock = MockInterception::new();
    {
        let level = Arc::clone(&level);
        mock.expect_level()
            .returning(move || level.load(Ordering::SeqCst));
    }
    {
        let level = Arc::clone(&level);
        mock.expect_set_level()
            .times(GUARDED_CALLS * 2)
            .returning(move |value| level.store(value, Ordering::SeqCst));
    }
    mock.expect_set_exclude_current()
        .with(eq(true))
        .times(GUARDED_CALLS)
        .return_const(());
    mock.expect_set_exclude_current()
        .with(eq(false))
        .times(GUARDED_CALLS)
        .return_const(());

    let ctx = BridgeContext::new(
        Arc::new(TransportResolver::with_plugin_dirs(Vec::new())),
        Arc::new(mock),
    );

    // Act
    let bridge = open("dummy", &ctx);
    for _ in 0..3 {
        bridge.ready().expect("ready");
    }
    assert!(bridge.connect("localhost", -5).is_err());
    let frame = bridge
        .get_frame(16, 16, PixelFormat::Rgb, false)
        .expect("get_frame");
    bridge.send_frame(frame, false).expect("send_frame");
    bridge.synchronize().expect("synchronize");
    bridge.destroy().expect("destroy");
    drop(bridge);

    // Assert
    assert_eq!(level.load(Ordering::SeqCst), 0);
}

#[test]
fn test_rejected_arguments_never_touch_interception() {
    let mut mock = MockInterception::new();
    mock.expect_level().return_const(0);
    // Only open's init and the final destroy are guarded.
    mock.expect_set_level().times(4).return_const(());
    mock.expect_set_exclude_current().times(4).return_const(());

    let ctx = BridgeContext::new(
        Arc::new(TransportResolver::with_plugin_dirs(Vec::new())),
        Arc::new(mock),
    );
    let bridge = open("dummy", &ctx);

    let err = bridge.connect("local\0host", 0).expect_err("NUL must be rejected");

    assert!(matches!(err, BridgeError::InvalidArgument(_)));
}
