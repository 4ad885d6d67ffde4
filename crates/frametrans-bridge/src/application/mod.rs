//! Application layer of the bridge.
//!
//! - **`bridge`** – [`TransportBridge`](bridge::TransportBridge): resolves a
//!   transport by name, owns its session, and forwards the frame-exchange
//!   calls under the bridge lock and the interception guard.  Also defines
//!   the ports the infrastructure layer implements: `ModuleResolver` and
//!   `TelemetrySink`.
//!
//! - **`frame_pump`** – Drives one bridge frame by frame: checks readiness,
//!   spoils or waits, fills a buffer, and sends it.

pub mod bridge;
pub mod frame_pump;
