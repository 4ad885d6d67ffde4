//! [`DummyTransport`]: the in-process implementation of the no-op back-end.

use std::num::NonZeroUsize;
use std::ptr::{self, NonNull};

use frametrans_core::{
    DisplayHandle, PixelFormat, RawFrame, SessionHandle, TransportParams, TransportPlugin,
    WindowHandle,
};
use tracing::{debug, info};

/// Number of frame buffers each session cycles through.
pub const POOL_SIZE: usize = 3;

/// Largest buffer, per eye, a single frame may ask for.
pub const MAX_FRAME_BYTES: usize = 1 << 30;

/// Bytes per row and per eye for the requested geometry, or `None` when the
/// frame would exceed [`MAX_FRAME_BYTES`] or its pitch would not fit the
/// descriptor.  Non-positive dimensions count as zero.
fn frame_layout(width: i32, height: i32, format: PixelFormat) -> Option<(i32, usize)> {
    let width = usize::try_from(width).unwrap_or(0);
    let height = usize::try_from(height).unwrap_or(0);
    let pitch = width.checked_mul(format.pixel_size())?;
    let len = pitch.checked_mul(height)?;
    let pitch = i32::try_from(pitch).ok()?;
    (len <= MAX_FRAME_BYTES).then_some((pitch, len))
}

/// One pooled buffer.  Boxed so the `RawFrame` address handed to callers
/// stays put while the pool vector is untouched.
struct FrameSlot {
    raw: RawFrame,
    bits: Vec<u8>,
    rbits: Vec<u8>,
    in_use: bool,
}

impl FrameSlot {
    fn new() -> Self {
        Self {
            raw: RawFrame::empty(0, 0, PixelFormat::Rgb),
            bits: Vec::new(),
            rbits: Vec::new(),
            in_use: false,
        }
    }

    /// Resizes the buffers for a layout from [`frame_layout`] and refreshes
    /// the descriptor's pointers.
    fn prepare(
        &mut self,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
        (pitch, len): (i32, usize),
    ) {
        self.bits.resize(len, 0);
        if stereo {
            self.rbits.resize(len, 0);
        } else {
            self.rbits.clear();
        }

        self.raw.width = width;
        self.raw.height = height;
        self.raw.format = format.as_raw();
        self.raw.pitch = pitch;
        self.raw.bits = if len == 0 {
            ptr::null_mut()
        } else {
            self.bits.as_mut_ptr()
        };
        self.raw.rbits = if stereo && len > 0 {
            self.rbits.as_mut_ptr()
        } else {
            ptr::null_mut()
        };
        self.in_use = true;
    }
}

/// A transport that accepts everything and delivers nothing.
pub struct DummyTransport {
    session: Option<SessionHandle>,
    next_token: usize,
    params: TransportParams,
    receiver: Option<(String, i32)>,
    slots: Vec<Box<FrameSlot>>,
    frames_sent: u64,
    last_error: String,
}

// SAFETY: the raw pointers inside the pooled `RawFrame`s point into buffers
// owned by the same `DummyTransport`; they move with it and are never shared
// with another instance.
unsafe impl Send for DummyTransport {}

impl Default for DummyTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyTransport {
    /// Creates an uninitialised transport.
    pub fn new() -> Self {
        Self {
            session: None,
            next_token: 1,
            params: TransportParams::default(),
            receiver: None,
            slots: Vec::new(),
            frames_sent: 0,
            last_error: String::new(),
        }
    }

    /// Frames accepted by `send_frame` since `init`.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Receiver given to the last successful `connect`.
    pub fn receiver(&self) -> Option<(&str, i32)> {
        self.receiver.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    /// `true` between a successful `init` and `destroy`.
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.last_error = message.into();
        debug!(error = %self.last_error, "dummy transport call failed");
    }

    fn check_session(&mut self, session: SessionHandle) -> bool {
        if self.session == Some(session) {
            return true;
        }
        self.fail("invalid session handle");
        false
    }

    fn idle_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.in_use).count()
            + POOL_SIZE.saturating_sub(self.slots.len())
    }
}

impl TransportPlugin for DummyTransport {
    fn init(
        &mut self,
        _display: DisplayHandle,
        window: WindowHandle,
        params: &TransportParams,
    ) -> Option<SessionHandle> {
        let token = NonZeroUsize::new(self.next_token)?;
        self.next_token += 1;

        let session = SessionHandle::from_token(token);
        self.session = Some(session);
        self.params = *params;
        self.receiver = None;
        self.slots.clear();
        self.frames_sent = 0;
        info!(window = window.0, "dummy transport initialised");
        Some(session)
    }

    fn connect(&mut self, session: SessionHandle, receiver: &str, port: i32) -> i32 {
        if !self.check_session(session) {
            return -1;
        }
        if port < 0 {
            self.fail(format!("invalid port {port}"));
            return -1;
        }
        let port = if port == 0 { self.params.port } else { port };
        debug!(receiver, port, "dummy transport connected");
        self.receiver = Some((receiver.to_string(), port));
        0
    }

    fn get_frame(
        &mut self,
        session: SessionHandle,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
    ) -> Option<NonNull<RawFrame>> {
        if !self.check_session(session) {
            return None;
        }
        let Some(layout) = frame_layout(width, height, format) else {
            self.fail(format!("frame too large: {width}x{height} {format:?}"));
            return None;
        };

        let index = match self.slots.iter().position(|slot| !slot.in_use) {
            Some(index) => index,
            None if self.slots.len() < POOL_SIZE => {
                self.slots.push(Box::new(FrameSlot::new()));
                self.slots.len() - 1
            }
            None => {
                self.fail(format!("all {POOL_SIZE} frame buffers are in flight"));
                return None;
            }
        };

        let slot = &mut self.slots[index];
        slot.prepare(width, height, format, stereo, layout);
        Some(NonNull::from(&mut slot.raw))
    }

    fn ready(&mut self, session: SessionHandle) -> i32 {
        if !self.check_session(session) {
            return -1;
        }
        self.idle_slots() as i32
    }

    fn synchronize(&mut self, session: SessionHandle) -> i32 {
        // Every send completes immediately, so there is never a queue to drain.
        if !self.check_session(session) {
            return -1;
        }
        0
    }

    fn send_frame(&mut self, session: SessionHandle, frame: NonNull<RawFrame>, _sync: bool) -> i32 {
        if !self.check_session(session) {
            return -1;
        }
        let owned = self
            .slots
            .iter_mut()
            .find(|slot| slot.in_use && ptr::eq(&slot.raw, frame.as_ptr()));
        match owned {
            Some(slot) => {
                slot.in_use = false;
                self.frames_sent += 1;
                0
            }
            None => {
                self.fail("frame was not obtained from this session");
                -1
            }
        }
    }

    fn destroy(&mut self, session: SessionHandle) -> i32 {
        if !self.check_session(session) {
            return -1;
        }
        info!(frames_sent = self.frames_sent, "dummy transport destroyed");
        self.session = None;
        self.receiver = None;
        self.slots.clear();
        0
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
