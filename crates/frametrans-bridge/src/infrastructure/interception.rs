//! The host's call-interception state.
//!
//! A host that intercepts calls (to capture what an application renders)
//! must not intercept the calls a transport back-end makes on its behalf.
//! Two per-thread values decide that:
//!
//! - **level** – how many guarded sections the thread is inside.  Any value
//!   above zero turns interception off.
//! - **exclude** – set while the current thread is inside a back-end call.
//!
//! Both are thread-local, so a guarded call on one thread never changes
//! whether another thread is intercepted.

use std::cell::Cell;

use frametrans_core::InterceptionContext;

thread_local! {
    static LEVEL: Cell<i32> = const { Cell::new(0) };
    static EXCLUDE: Cell<bool> = const { Cell::new(false) };
}

/// Thread-local [`InterceptionContext`] of the host process.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostInterception;

impl HostInterception {
    pub fn new() -> Self {
        Self
    }
}

impl InterceptionContext for HostInterception {
    fn level(&self) -> i32 {
        LEVEL.with(Cell::get)
    }

    fn set_level(&self, level: i32) {
        LEVEL.with(|cell| cell.set(level));
    }

    fn set_exclude_current(&self, exclude: bool) {
        EXCLUDE.with(|cell| cell.set(exclude));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
