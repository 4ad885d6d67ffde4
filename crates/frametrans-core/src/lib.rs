//! # frametrans-core
//!
//! Shared contract between the FrameTrans bridge and its transport back-ends.
//!
//! This crate has zero dependencies on dynamic loaders, OS APIs, or sockets.
//! Everything a back-end author needs to implement a transport lives here,
//! and everything the bridge needs to talk to one.
//!
//! # Architecture overview (for beginners)
//!
//! A host process renders frames and wants to ship them to a remote viewer.
//! *How* they travel (TCP, shared memory, a video encoder...) is decided at
//! start-up by naming a transport.  The bridge looks the name up, binds the
//! back-end's eight entry points, and forwards calls to it.
//!
//! - **`frame`** – Pixel formats and the [`RawFrame`] descriptor a back-end
//!   hands out from `get_frame` and takes back in `send_frame`.
//!
//! - **`plugin`** – The [`TransportPlugin`] trait (the eight-operation
//!   contract in safe Rust), the opaque display/window/session handles, and
//!   the [`TransportParams`] configuration block passed to `init`.
//!
//! - **`abi`** – The same contract as C function pointer types plus the fixed
//!   symbol names a dynamically loaded module must export.
//!
//! - **`intercept`** – The host's interception context boundary and the RAII
//!   [`InterceptionGuard`] that suspends interception around a back-end call.

pub mod abi;
pub mod frame;
pub mod intercept;
pub mod plugin;

// Re-export the most-used types at the crate root so callers can write
// `frametrans_core::PixelFormat` instead of `frametrans_core::frame::PixelFormat`.
pub use abi::EntryPoint;
pub use frame::{ParseFormatError, PixelFormat, RawFrame};
pub use intercept::{InterceptionContext, InterceptionGuard};
pub use plugin::{DisplayHandle, SessionHandle, TransportParams, TransportPlugin, WindowHandle};
