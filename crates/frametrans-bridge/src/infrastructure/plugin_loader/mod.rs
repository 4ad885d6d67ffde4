//! Resolving a transport name to a back-end.
//!
//! Two sources are consulted, in order:
//!
//! 1. [`BuiltinRegistry`] – back-ends compiled into the binary.
//! 2. [`DylibResolver`] – a shared library named after the transport
//!    (see [`module_file_name`]), searched for in the configured plugin
//!    directories and then through the system loader's default search path.
//!
//! [`TransportResolver`] chains the two and is what the binary uses.

pub mod dylib;
pub mod registry;

use std::ffi::OsString;
use std::path::PathBuf;

use frametrans_core::abi::module_stem;
use frametrans_core::TransportPlugin;
use tracing::debug;

use crate::application::bridge::{BridgeError, ModuleResolver};

pub use dylib::{DylibPlugin, DylibResolver, EntryTable, ModuleLoader, SymbolSource, SystemLoader};
pub use registry::BuiltinRegistry;

/// Platform file name of the module implementing `transport`:
/// `libframetrans_<name>.so`, `libframetrans_<name>.dylib`, or
/// `frametrans_<name>.dll`.
pub fn module_file_name(transport: &str) -> OsString {
    libloading::library_filename(module_stem(transport))
}

/// Built-in back-ends first, shared-library modules second.
pub struct TransportResolver {
    registry: BuiltinRegistry,
    dylib: DylibResolver,
}

impl TransportResolver {
    pub fn new(registry: BuiltinRegistry, dylib: DylibResolver) -> Self {
        Self { registry, dylib }
    }

    /// The default chain: every built-in back-end, then modules from
    /// `plugin_dirs` or the system search path.
    pub fn with_plugin_dirs(plugin_dirs: Vec<PathBuf>) -> Self {
        Self::new(BuiltinRegistry::with_builtin(), DylibResolver::new(plugin_dirs))
    }

    /// Names answered without loading a module, sorted.
    pub fn builtin_names(&self) -> Vec<&str> {
        self.registry.names()
    }
}

impl ModuleResolver for TransportResolver {
    fn resolve(&self, transport: &str) -> Result<Box<dyn TransportPlugin>, BridgeError> {
        if let Some(plugin) = self.registry.create(transport) {
            debug!(transport, "using built-in transport");
            return Ok(plugin);
        }
        self.dylib.resolve(transport)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
