//! frametrans-bridge library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the bridge do? (for beginners)
//!
//! A host renders frames and needs to ship them somewhere.  Which transport
//! carries them is picked *by name* when the host starts:
//!
//! 1. The host opens a [`TransportBridge`] for a transport name.
//! 2. The bridge resolves the name to a back-end: a built-in one compiled
//!    into the binary, or a shared library named `libframetrans_<name>.so`
//!    whose eight entry points are checked before anything is called.
//! 3. The back-end's `init` runs, producing a session.
//! 4. The host optionally connects to a receiver, then loops: ask for a
//!    frame buffer, fill it, send it.
//! 5. Dropping the bridge destroys the session and unloads the module.
//!
//! Every call into the back-end holds the bridge's lock and suspends the
//! host's call interception for its duration.
//!
//! [`TransportBridge`]: application::bridge::TransportBridge

/// Application layer: the bridge itself and the frame pump use case.
pub mod application;

/// Infrastructure layer: module resolvers, host interception, profiler,
/// configuration.
pub mod infrastructure;

pub use application::bridge::{
    BridgeContext, BridgeError, Frame, ModuleResolver, TelemetrySink, TransportBridge,
};
