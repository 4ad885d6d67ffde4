//! Infrastructure layer for the bridge.
//!
//! Contains the adapters behind the application layer's ports: module
//! resolution (built-in registry and shared-library loader), the host's
//! interception context, the throughput profiler, and TOML configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `frametrans_core`, but MUST NOT be imported by the `application` layer.

pub mod config;
pub mod interception;
pub mod plugin_loader;
pub mod profiler;
