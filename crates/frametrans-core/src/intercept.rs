//! Boundary to the host's call-interception layer.
//!
//! # Why suspend interception? (for beginners)
//!
//! The host process intercepts many of its own library calls (for example to
//! redirect rendering off-screen).  A transport back-end runs *inside* that
//! process and may call the very same functions.  If those calls were
//! intercepted the host would recurse into itself.  So every call the bridge
//! makes into a back-end is bracketed:
//!
//! ```text
//! level += 1; exclude_current = true     <- InterceptionGuard::suspend
//! back-end call
//! level -= 1; exclude_current = false    <- InterceptionGuard::drop
//! ```
//!
//! The guard restores the context in `Drop`, so the pairing holds on every
//! exit path: success, failure sentinel, early return, and panic unwinding.

use tracing::trace;

/// The host's interception state, as seen by the bridge.
///
/// The bridge never owns this state; it only raises and lowers it
/// symmetrically through [`InterceptionGuard`].
///
/// The default [`enter`](Self::enter) and [`leave`](Self::leave) read the
/// level and write it back as two steps.  That is only sound when the state
/// is per execution context (thread-local, as the host's own is): the bridge
/// lock serializes calls on one binding, not across bindings.  An
/// implementation whose state is shared between threads must override both
/// with an atomic update.
pub trait InterceptionContext: Send + Sync {
    /// Current interception level.  Interception is active only at level 0.
    fn level(&self) -> i32;

    /// Overwrites the interception level.
    fn set_level(&self, level: i32);

    /// Marks (or unmarks) the current execution context as excluded from
    /// interception.
    fn set_exclude_current(&self, exclude: bool);

    /// Raises the level by one and excludes the current context.  Returns
    /// the new level.
    fn enter(&self) -> i32 {
        let level = self.level() + 1;
        self.set_level(level);
        self.set_exclude_current(true);
        level
    }

    /// Undoes one [`enter`](Self::enter).  Returns the new level.
    fn leave(&self) -> i32 {
        let level = self.level() - 1;
        self.set_level(level);
        self.set_exclude_current(false);
        level
    }
}

/// Suspends interception for its lifetime.
#[must_use = "interception is restored as soon as the guard is dropped"]
pub struct InterceptionGuard<'a> {
    ctx: &'a dyn InterceptionContext,
}

impl<'a> InterceptionGuard<'a> {
    /// Raises the level and excludes the current context.
    pub fn suspend(ctx: &'a dyn InterceptionContext) -> Self {
        let level = ctx.enter();
        trace!(level, "interception suspended");
        Self { ctx }
    }
}

impl Drop for InterceptionGuard<'_> {
    fn drop(&mut self) {
        let level = self.ctx.leave();
        trace!(level, "interception restored");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
