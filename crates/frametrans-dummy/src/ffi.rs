//! C exports making this crate a loadable transport module.
//!
//! Built as a `cdylib`, the crate produces `libframetrans_dummy.so`
//! (`frametrans_dummy.dll`, `libframetrans_dummy.dylib`), which exports the
//! eight `frametrans_*` symbols every module must provide.
//!
//! The C handle is a boxed [`ModuleSession`] that pairs a [`DummyTransport`]
//! with the session it issued.  The last error is kept per thread, matching
//! the `get_error()` signature, which takes no handle.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::{c_char, c_int, c_ulong};
use std::ptr::{self, NonNull};

use frametrans_core::{
    DisplayHandle, PixelFormat, RawFrame, SessionHandle, TransportParams, TransportPlugin,
    WindowHandle,
};

use crate::DummyTransport;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn set_last_error(message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = message);
}

/// What a C handle points at.
struct ModuleSession {
    transport: DummyTransport,
    session: SessionHandle,
}

impl ModuleSession {
    /// Turns a failure sentinel into a recorded error.
    fn status(&self, status: c_int) -> c_int {
        if status < 0 {
            set_last_error(&self.transport.last_error());
        }
        status
    }
}

/// # Safety
///
/// `handle` must be null or a pointer returned by [`frametrans_init`] that has
/// not been passed to [`frametrans_destroy`].
unsafe fn session_mut<'a>(handle: *mut c_void) -> Option<&'a mut ModuleSession> {
    let session = handle.cast::<ModuleSession>().as_mut();
    if session.is_none() {
        set_last_error("invalid session handle");
    }
    session
}

/// Creates a session.
///
/// # Safety
///
/// `params` must be null or point at a valid [`TransportParams`].
#[no_mangle]
pub unsafe extern "C" fn frametrans_init(
    display: *mut c_void,
    window: c_ulong,
    params: *const TransportParams,
) -> *mut c_void {
    let params = params.as_ref().copied().unwrap_or_default();
    let mut transport = DummyTransport::new();
    match transport.init(DisplayHandle::from_raw(display), WindowHandle(window), &params) {
        Some(session) => Box::into_raw(Box::new(ModuleSession { transport, session })).cast(),
        None => {
            set_last_error(&transport.last_error());
            ptr::null_mut()
        }
    }
}

/// Connects the session to `receiver:port`.
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`]; `receiver` must be null or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn frametrans_connect(
    handle: *mut c_void,
    receiver: *const c_char,
    port: c_int,
) -> c_int {
    let Some(module) = session_mut(handle) else {
        return -1;
    };
    let receiver = if receiver.is_null() {
        String::new()
    } else {
        CStr::from_ptr(receiver).to_string_lossy().into_owned()
    };
    let status = module.transport.connect(module.session, &receiver, port);
    module.status(status)
}

/// Hands out a pooled frame buffer.
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`].
#[no_mangle]
pub unsafe extern "C" fn frametrans_get_frame(
    handle: *mut c_void,
    width: c_int,
    height: c_int,
    format: c_int,
    stereo: c_int,
) -> *mut RawFrame {
    let Some(module) = session_mut(handle) else {
        return ptr::null_mut();
    };
    let Some(format) = PixelFormat::from_raw(format) else {
        set_last_error(&format!("unknown pixel format code {format}"));
        return ptr::null_mut();
    };
    match module
        .transport
        .get_frame(module.session, width, height, format, stereo != 0)
    {
        Some(frame) => frame.as_ptr(),
        None => {
            set_last_error(&module.transport.last_error());
            ptr::null_mut()
        }
    }
}

/// Reports how many buffers are idle.
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`].
#[no_mangle]
pub unsafe extern "C" fn frametrans_ready(handle: *mut c_void) -> c_int {
    let Some(module) = session_mut(handle) else {
        return -1;
    };
    let status = module.transport.ready(module.session);
    module.status(status)
}

/// Waits for queued frames (there never are any).
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`].
#[no_mangle]
pub unsafe extern "C" fn frametrans_synchronize(handle: *mut c_void) -> c_int {
    let Some(module) = session_mut(handle) else {
        return -1;
    };
    let status = module.transport.synchronize(module.session);
    module.status(status)
}

/// Returns a frame to the pool and counts it as sent.
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`]; `frame` must be null or a
/// pointer returned by [`frametrans_get_frame`].
#[no_mangle]
pub unsafe extern "C" fn frametrans_send_frame(
    handle: *mut c_void,
    frame: *mut RawFrame,
    sync: c_int,
) -> c_int {
    let Some(module) = session_mut(handle) else {
        return -1;
    };
    let Some(frame) = NonNull::new(frame) else {
        set_last_error("null frame");
        return -1;
    };
    let status = module.transport.send_frame(module.session, frame, sync != 0);
    module.status(status)
}

/// Tears the session down and frees the handle.
///
/// # Safety
///
/// `handle` must come from [`frametrans_init`] and must not be used again.
#[no_mangle]
pub unsafe extern "C" fn frametrans_destroy(handle: *mut c_void) -> c_int {
    if handle.is_null() {
        set_last_error("invalid session handle");
        return -1;
    }
    let mut module = Box::from_raw(handle.cast::<ModuleSession>());
    let status = module.transport.destroy(module.session);
    module.status(status)
}

/// Message describing the calling thread's most recent failure.
///
/// The pointer stays valid until the next failing call on the same thread.
#[no_mangle]
pub extern "C" fn frametrans_get_error() -> *const c_char {
    LAST_ERROR.with(|slot| slot.borrow().as_ptr())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
