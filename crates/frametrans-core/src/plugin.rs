//! The transport back-end contract.
//!
//! Every transport, whether compiled into the host or loaded from a shared
//! library at run time, is driven through the same eight operations.  This
//! module expresses them as the [`TransportPlugin`] trait.
//!
//! # Failure sentinels
//!
//! The contract deliberately mirrors the module ABI: operations report
//! failure with a sentinel (`None`, or a negative status) and the reason is
//! fetched afterwards with [`TransportPlugin::last_error`].  Turning those
//! sentinels into typed errors is the bridge's job, not the back-end's.
//!
//! # Handles
//!
//! [`DisplayHandle`] and [`WindowHandle`] identify the host's output surface.
//! They are opaque here and passed to `init` unmodified.  [`SessionHandle`]
//! is whatever `init` returned; the bridge stores it and hands it back on
//! every later call, never dereferencing it.

use std::ffi::c_void;
use std::os::raw::{c_int, c_ulong};
use std::ptr::{self, NonNull};

use crate::frame::{PixelFormat, RawFrame};

/// Opaque handle to the host's display connection (e.g. an X11 `Display*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayHandle(*mut c_void);

// SAFETY: the handle is only ever passed through to back-ends; the bridge
// never dereferences it.
unsafe impl Send for DisplayHandle {}
unsafe impl Sync for DisplayHandle {}

impl DisplayHandle {
    /// Wraps a raw platform display pointer.
    pub fn from_raw(ptr: *mut c_void) -> Self {
        Self(ptr)
    }

    /// A handle for hosts without a display connection.
    pub fn null() -> Self {
        Self(ptr::null_mut())
    }

    /// The raw pointer, as given to [`DisplayHandle::from_raw`].
    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }
}

/// Opaque platform window identifier (e.g. an X11 `Window` XID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub c_ulong);

/// Opaque back-end session produced by `init`.
///
/// Always non-null: a null `init` result is a failure, never a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle(NonNull<c_void>);

// SAFETY: the handle is an opaque token owned by exactly one binding, which
// serializes every call that uses it behind its own lock.
unsafe impl Send for SessionHandle {}
unsafe impl Sync for SessionHandle {}

impl SessionHandle {
    /// Wraps a raw `init` result; `None` when the pointer is null.
    pub fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Builds a handle from a non-zero token.
    ///
    /// In-process back-ends that keep their state in `self` use this to hand
    /// out a session identifier that is never dereferenced.
    pub fn from_token(token: std::num::NonZeroUsize) -> Self {
        // A non-zero integer is never a null pointer.
        Self(NonNull::new(token.get() as *mut c_void).unwrap_or(NonNull::dangling()))
    }

    /// The raw pointer, as returned by `init`.
    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Configuration block handed to a back-end's `init`.
///
/// `#[repr(C)]` because dynamically loaded modules receive a pointer to it.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportParams {
    /// Back-end defined compression scheme identifier (0 = back-end default).
    pub compress: c_int,
    /// Lossy encoder quality, 1–100.
    pub quality: c_int,
    /// Chroma subsampling factor: 0 (grayscale), 1, 2, or 4.
    pub subsamp: c_int,
    /// Encoder worker threads.
    pub threads: c_int,
    /// Non-zero to let the back-end drop frames it cannot keep up with.
    pub spoil: c_int,
    /// Default receiver port when `connect` is given 0.
    pub port: c_int,
    /// Non-zero to let the back-end log diagnostics.
    pub verbose: c_int,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            compress: 0,
            quality: 95,
            subsamp: 1,
            threads: 1,
            spoil: 1,
            port: 4242,
            verbose: 0,
        }
    }
}

/// The eight-operation transport contract.
///
/// Implementors need not be reentrant: the bridge guarantees that at most one
/// call is in flight per plugin instance.
pub trait TransportPlugin: Send {
    /// Creates a session bound to the host's display and window.
    ///
    /// Returns `None` on failure; the reason is available from
    /// [`last_error`](Self::last_error).
    fn init(
        &mut self,
        display: DisplayHandle,
        window: WindowHandle,
        params: &TransportParams,
    ) -> Option<SessionHandle>;

    /// Connects the session to a receiver.  Negative on failure.
    fn connect(&mut self, session: SessionHandle, receiver: &str, port: i32) -> i32;

    /// Hands out a writable frame buffer of the given geometry.
    ///
    /// Geometry is not validated by the caller; zero or negative sizes are
    /// for the back-end to interpret.  Returns `None` on failure.
    fn get_frame(
        &mut self,
        session: SessionHandle,
        width: i32,
        height: i32,
        format: PixelFormat,
        stereo: bool,
    ) -> Option<NonNull<RawFrame>>;

    /// Number of frames the back-end can accept right now.  Negative on
    /// failure.
    fn ready(&mut self, session: SessionHandle) -> i32;

    /// Blocks until all queued frames are delivered.  Negative on failure.
    fn synchronize(&mut self, session: SessionHandle) -> i32;

    /// Queues a frame obtained from [`get_frame`](Self::get_frame) for
    /// delivery, blocking until it is sent when `sync` is set.  Negative on
    /// failure.
    fn send_frame(&mut self, session: SessionHandle, frame: NonNull<RawFrame>, sync: bool) -> i32;

    /// Tears the session down.  Negative on failure.
    fn destroy(&mut self, session: SessionHandle) -> i32;

    /// Describes the most recent failure.
    fn last_error(&self) -> String;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;

    #[test]
    fn test_session_handle_from_null_is_none() {
        assert!(SessionHandle::from_raw(ptr::null_mut()).is_none());
    }

    #[test]
    fn test_session_handle_round_trips_raw_pointer() {
        // Arrange
        let mut slot = 0u8;
        let raw = &mut slot as *mut u8 as *mut c_void;

        // Act
        let handle = SessionHandle::from_raw(raw).expect("non-null");

        // Assert
        assert_eq!(handle.as_ptr(), raw);
    }

    #[test]
    fn test_session_handle_from_token_preserves_value() {
        let token = NonZeroUsize::new(7).unwrap();
        assert_eq!(SessionHandle::from_token(token).as_ptr() as usize, 7);
    }

    #[test]
    fn test_null_display_handle_is_null() {
        assert!(DisplayHandle::null().as_ptr().is_null());
    }

    #[test]
    fn test_default_params_enable_spoiling_at_quality_95() {
        let params = TransportParams::default();
        assert_eq!(params.quality, 95);
        assert_eq!(params.spoil, 1);
    }
}
