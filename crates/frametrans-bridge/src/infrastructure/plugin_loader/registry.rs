//! Back-ends compiled into the binary, looked up by name.

use std::collections::HashMap;

use frametrans_core::TransportPlugin;
use frametrans_dummy::DummyTransport;

use crate::application::bridge::{BridgeError, ModuleResolver};

/// Produces a fresh, uninitialised back-end.
pub type PluginFactory = Box<dyn Fn() -> Box<dyn TransportPlugin> + Send + Sync>;

/// Name → factory table.
#[derive(Default)]
pub struct BuiltinRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl BuiltinRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every back-end shipped with this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(frametrans_dummy::TRANSPORT_NAME, || {
            Box::new(DummyTransport::new())
        });
        registry
    }

    /// Adds or replaces the factory for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn TransportPlugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds a back-end for `name`, if one is registered.
    pub fn create(&self, name: &str) -> Option<Box<dyn TransportPlugin>> {
        self.factories.get(name).map(|factory| factory())
    }
}

impl ModuleResolver for BuiltinRegistry {
    fn resolve(&self, transport: &str) -> Result<Box<dyn TransportPlugin>, BridgeError> {
        self.create(transport).ok_or_else(|| BridgeError::PluginLoad {
            transport: transport.to_string(),
            message: format!("no built-in transport named '{transport}'"),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_with_builtin_registers_dummy() {
        let registry = BuiltinRegistry::with_builtin();
        assert!(registry.create("dummy").is_some());
        assert_eq!(registry.names(), vec!["dummy"]);
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = BuiltinRegistry::new();
        assert!(registry.names().is_empty());
        assert!(registry.create("dummy").is_none());
    }

    #[test]
    fn test_create_invokes_factory_each_time() {
        // Arrange
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let mut registry = BuiltinRegistry::new();
        registry.register("counted", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(DummyTransport::new())
        });

        // Act
        let first = registry.create("counted");
        let second = registry.create("counted");

        // Assert
        assert!(first.is_some() && second.is_some());
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resolve_unknown_name_returns_plugin_load_error() {
        let registry = BuiltinRegistry::with_builtin();

        let err = match registry.resolve("vnc") {
            Err(err) => err,
            Ok(_) => panic!("resolving an unregistered name must fail"),
        };

        assert_eq!(
            err.to_string(),
            "cannot load transport 'vnc': no built-in transport named 'vnc'"
        );
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = BuiltinRegistry::new();
        registry.register("zeta", || Box::new(DummyTransport::new()));
        registry.register("alpha", || Box::new(DummyTransport::new()));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}
