//! Process-wide registry mapping extension-element names to handlers

use indexmap::IndexMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::handler::{builtins, ExtensionHandler};
use crate::{BridgeError, BridgeResult};

/// Registry of extension-element handlers.
///
/// Names are unique, case-sensitive and non-blank; the map preserves first
/// insertion order for names that stay registered. Registering a name twice
/// silently replaces the earlier handler (last registration wins), which is
/// the load-order contract plugin manifests rely on: manifests loaded later
/// override earlier or built-in handlers of the same name.
///
/// Mutation and lookup are serialized at the granularity of single calls, so
/// a manifest reload may safely race an in-flight bridge generation.
pub struct HandlerRegistry {
    handlers: RwLock<IndexMap<String, Arc<dyn ExtensionHandler>>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(IndexMap::new()),
        }
    }

    /// Create a registry pre-populated with the built-in handlers
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_defaults();
        registry
    }

    fn register_defaults(&self) {
        // Infallible: names are known non-blank literals.
        let _ = self.register("greet", Arc::new(builtins::greet));
        let _ = self.register("exec", Arc::new(builtins::exec));
    }

    /// Register a handler under an element name, replacing any previous one
    pub fn register(&self, name: &str, handler: Arc<dyn ExtensionHandler>) -> BridgeResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "extension element name must not be blank".to_string(),
            ));
        }
        debug!("Registering extension element handler: {}", name);
        self.write_handlers().insert(name.to_string(), handler);
        Ok(())
    }

    /// Look up the handler registered under an element name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ExtensionHandler>> {
        self.read_handlers().get(name).cloned()
    }

    /// Whether a handler is registered under the given name
    pub fn contains(&self, name: &str) -> bool {
        self.read_handlers().contains_key(name)
    }

    /// Ordered read-only view of the current registrations
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn ExtensionHandler>)> {
        self.read_handlers()
            .iter()
            .map(|(name, handler)| (name.clone(), Arc::clone(handler)))
            .collect()
    }

    /// Names of all registered elements, in first-insertion order
    pub fn names(&self) -> Vec<String> {
        self.read_handlers().keys().cloned().collect()
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.read_handlers().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read_handlers().is_empty()
    }

    fn read_handlers(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn ExtensionHandler>>> {
        // A poisoned lock only means a panic elsewhere; the map itself is
        // still consistent, single-call inserts cannot tear it.
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<dyn ExtensionHandler>>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
