//! C ABI of a dynamically loaded transport module.
//!
//! A module is a shared library named after its transport (see
//! [`module_stem`]) that exports the eight functions below under fixed
//! symbol names.  The bridge resolves all of them, in [`EntryPoint::ALL`]
//! order, before calling any.
//!
//! | Entry point    | Symbol                      | Failure sentinel |
//! |----------------|-----------------------------|------------------|
//! | `init`         | `frametrans_init`           | null             |
//! | `connect`      | `frametrans_connect`        | `< 0`            |
//! | `get_frame`    | `frametrans_get_frame`      | null             |
//! | `ready`        | `frametrans_ready`          | `< 0`            |
//! | `synchronize`  | `frametrans_synchronize`    | `< 0`            |
//! | `send_frame`   | `frametrans_send_frame`     | `< 0`            |
//! | `destroy`      | `frametrans_destroy`        | `< 0`            |
//! | `get_error`    | `frametrans_get_error`      | n/a              |

use std::ffi::c_void;
use std::fmt;
use std::os::raw::{c_char, c_int, c_ulong};

use crate::frame::RawFrame;
use crate::plugin::TransportParams;

/// Prefix shared by every module file stem and exported symbol.
pub const MODULE_PREFIX: &str = "frametrans_";

/// `init(display, window, params) -> handle | null`
pub type InitFn = unsafe extern "C" fn(
    display: *mut c_void,
    window: c_ulong,
    params: *const TransportParams,
) -> *mut c_void;

/// `connect(handle, receiver, port) -> status`
pub type ConnectFn =
    unsafe extern "C" fn(handle: *mut c_void, receiver: *const c_char, port: c_int) -> c_int;

/// `get_frame(handle, width, height, format, stereo) -> frame | null`
pub type GetFrameFn = unsafe extern "C" fn(
    handle: *mut c_void,
    width: c_int,
    height: c_int,
    format: c_int,
    stereo: c_int,
) -> *mut RawFrame;

/// `ready(handle) -> count`
pub type ReadyFn = unsafe extern "C" fn(handle: *mut c_void) -> c_int;

/// `synchronize(handle) -> status`
pub type SynchronizeFn = unsafe extern "C" fn(handle: *mut c_void) -> c_int;

/// `send_frame(handle, frame, sync) -> status`
pub type SendFrameFn =
    unsafe extern "C" fn(handle: *mut c_void, frame: *mut RawFrame, sync: c_int) -> c_int;

/// `destroy(handle) -> status`
pub type DestroyFn = unsafe extern "C" fn(handle: *mut c_void) -> c_int;

/// `get_error() -> message`
pub type GetErrorFn = unsafe extern "C" fn() -> *const c_char;

/// One of the eight required module exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Init,
    Connect,
    GetFrame,
    Ready,
    Synchronize,
    SendFrame,
    Destroy,
    GetError,
}

impl EntryPoint {
    /// Resolution order.  The first entry point missing from a module is the
    /// one reported.
    pub const ALL: [EntryPoint; 8] = [
        EntryPoint::Init,
        EntryPoint::Connect,
        EntryPoint::GetFrame,
        EntryPoint::Ready,
        EntryPoint::Synchronize,
        EntryPoint::SendFrame,
        EntryPoint::Destroy,
        EntryPoint::GetError,
    ];

    /// Exported symbol name.
    pub fn symbol(self) -> &'static str {
        match self {
            EntryPoint::Init => "frametrans_init",
            EntryPoint::Connect => "frametrans_connect",
            EntryPoint::GetFrame => "frametrans_get_frame",
            EntryPoint::Ready => "frametrans_ready",
            EntryPoint::Synchronize => "frametrans_synchronize",
            EntryPoint::SendFrame => "frametrans_send_frame",
            EntryPoint::Destroy => "frametrans_destroy",
            EntryPoint::GetError => "frametrans_get_error",
        }
    }

    /// Exported symbol name with the trailing NUL dynamic loaders expect.
    pub fn symbol_with_nul(self) -> &'static [u8] {
        match self {
            EntryPoint::Init => b"frametrans_init\0",
            EntryPoint::Connect => b"frametrans_connect\0",
            EntryPoint::GetFrame => b"frametrans_get_frame\0",
            EntryPoint::Ready => b"frametrans_ready\0",
            EntryPoint::Synchronize => b"frametrans_synchronize\0",
            EntryPoint::SendFrame => b"frametrans_send_frame\0",
            EntryPoint::Destroy => b"frametrans_destroy\0",
            EntryPoint::GetError => b"frametrans_get_error\0",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// File stem of the module implementing `transport` (`frametrans_<name>`).
///
/// The platform prefix and suffix (`lib…so`, `…dll`, `lib…dylib`) are added
/// by the loader.
pub fn module_stem(transport: &str) -> String {
    format!("{MODULE_PREFIX}{transport}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_lists_eight_distinct_entry_points_starting_with_init() {
        let unique: HashSet<_> = EntryPoint::ALL.iter().collect();
        assert_eq!(unique.len(), 8);
        assert_eq!(EntryPoint::ALL[0], EntryPoint::Init);
        assert_eq!(EntryPoint::ALL[7], EntryPoint::GetError);
    }

    #[test]
    fn test_symbol_with_nul_matches_symbol() {
        for entry in EntryPoint::ALL {
            let with_nul = entry.symbol_with_nul();
            assert_eq!(with_nul.last(), Some(&0u8), "{entry}");
            assert_eq!(&with_nul[..with_nul.len() - 1], entry.symbol().as_bytes());
        }
    }

    #[test]
    fn test_every_symbol_carries_the_module_prefix() {
        for entry in EntryPoint::ALL {
            assert!(entry.symbol().starts_with(MODULE_PREFIX), "{entry}");
        }
    }

    #[test]
    fn test_module_stem_prefixes_transport_name() {
        assert_eq!(module_stem("dummy"), "frametrans_dummy");
    }
}
