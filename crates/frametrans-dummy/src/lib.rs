//! # frametrans-dummy
//!
//! A transport that delivers frames nowhere.
//!
//! It exists so the bridge, the CLI and the tests have a back-end that is
//! always available and never touches the network.  It still behaves like a
//! real transport where it matters to callers:
//!
//! - `init` produces a session; `connect` accepts any receiver with a
//!   non-negative port.
//! - `get_frame` hands out buffers from a small fixed pool and reuses them.
//! - `send_frame` rejects descriptors it did not hand out.
//! - `ready` reports how many pool buffers are idle.
//!
//! The same transport is available two ways: as [`DummyTransport`] for the
//! bridge's built-in registry, and through the C exports in [`ffi`] when the
//! crate is built as `libframetrans_dummy.so`.

pub mod ffi;
mod transport;

pub use transport::{DummyTransport, POOL_SIZE};

/// Registry name of this transport.
pub const TRANSPORT_NAME: &str = "dummy";
