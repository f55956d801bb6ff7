//! Loading scopes: named implementation bindings with parent fallback
//!
//! A [`LoadingScope`] is the explicit replacement for an ambient "current
//! loader" slot: every bridging and transformation call receives the scope it
//! should resolve foreign implementations against. An isolated scope covers a
//! specific set of code bundles and falls back to its parent (usually the
//! process-wide ambient scope) for everything else, so concurrent
//! transformations never contend on shared mutable state.

use indexmap::IndexMap;
use std::sync::Arc;

use crate::handler::{builtins, ExtensionHandler};
use crate::plugin::bundle::LoadedBundle;

/// Entry-point name used by implementations that satisfy the handler calling
/// convention directly (single-entry-point shape).
pub const DEFAULT_ENTRY_POINT: &str = "invoke";

/// Fully-qualified names of the built-in implementations exposed through the
/// ambient scope.
pub const BUILTIN_GREET_IMPL: &str = "app.builtin.Greet";
pub const BUILTIN_EXEC_IMPL: &str = "app.builtin.Exec";

/// A named implementation and its named entry points.
///
/// Mirrors the shape of a foreign implementation unit: one implementation
/// name, one or more invocable entry points. An implementation with a
/// [`DEFAULT_ENTRY_POINT`] entry satisfies the handler convention directly.
#[derive(Clone)]
pub struct ImplementationBinding {
    name: String,
    entry_points: IndexMap<String, Arc<dyn ExtensionHandler>>,
}

impl ImplementationBinding {
    /// Create a binding with no entry points yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_points: IndexMap::new(),
        }
    }

    /// Implementation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add or replace a named entry point
    pub fn provide(&mut self, entry_point: impl Into<String>, handler: Arc<dyn ExtensionHandler>) {
        self.entry_points.insert(entry_point.into(), handler);
    }

    /// Look up an entry point by name
    pub fn entry_point(&self, name: &str) -> Option<Arc<dyn ExtensionHandler>> {
        self.entry_points.get(name).cloned()
    }

    /// Whether the implementation satisfies the handler convention directly
    pub fn has_default_entry_point(&self) -> bool {
        self.entry_points.contains_key(DEFAULT_ENTRY_POINT)
    }

    /// Entry-point names in registration order
    pub fn entry_point_names(&self) -> Vec<String> {
        self.entry_points.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ImplementationBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImplementationBinding")
            .field("name", &self.name)
            .field("entry_points", &self.entry_point_names())
            .finish()
    }
}

/// Typed registration surface handed to a code bundle at load time.
///
/// Bundles expose implementations by calling [`BundleRegistrar::provide_handler`]
/// (single-entry-point shape) or [`BundleRegistrar::provide_method`] from
/// their exported registrar function.
#[derive(Default)]
pub struct BundleRegistrar {
    bindings: IndexMap<String, ImplementationBinding>,
}

impl BundleRegistrar {
    /// Create an empty registrar
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose an implementation that satisfies the handler convention directly
    pub fn provide_handler(&mut self, implementation: &str, handler: Arc<dyn ExtensionHandler>) {
        self.provide_method(implementation, DEFAULT_ENTRY_POINT, handler);
    }

    /// Expose a named entry point on an implementation
    pub fn provide_method(
        &mut self,
        implementation: &str,
        entry_point: &str,
        handler: Arc<dyn ExtensionHandler>,
    ) {
        self.bindings
            .entry(implementation.to_string())
            .or_insert_with(|| ImplementationBinding::new(implementation))
            .provide(entry_point, handler);
    }

    /// Consume the registrar, yielding the collected bindings
    pub fn into_bindings(self) -> Vec<ImplementationBinding> {
        self.bindings.into_values().collect()
    }
}

/// A loading scope: implementation bindings plus an optional parent scope.
pub struct LoadingScope {
    bindings: IndexMap<String, ImplementationBinding>,
    // Keeps the bundle libraries mapped for as long as their handlers are
    // reachable through this scope.
    _bundles: Vec<LoadedBundle>,
    parent: Option<Arc<LoadingScope>>,
}

impl LoadingScope {
    /// Create an empty scope with no parent
    pub fn new() -> Self {
        Self {
            bindings: IndexMap::new(),
            _bundles: Vec::new(),
            parent: None,
        }
    }

    /// The ambient scope: built-in implementations, no parent
    pub fn ambient() -> Self {
        let mut scope = Self::new();

        let mut greet = ImplementationBinding::new(BUILTIN_GREET_IMPL);
        greet.provide(DEFAULT_ENTRY_POINT, Arc::new(builtins::greet));
        scope.add_binding(greet);

        let mut exec = ImplementationBinding::new(BUILTIN_EXEC_IMPL);
        exec.provide(DEFAULT_ENTRY_POINT, Arc::new(builtins::exec));
        scope.add_binding(exec);

        scope
    }

    /// Create an isolated scope over the given bindings and bundles, falling
    /// back to `parent` for all other lookups
    pub fn isolated(
        bindings: Vec<ImplementationBinding>,
        bundles: Vec<LoadedBundle>,
        parent: Arc<LoadingScope>,
    ) -> Self {
        let mut scope = Self {
            bindings: IndexMap::new(),
            _bundles: bundles,
            parent: Some(parent),
        };
        for binding in bindings {
            scope.add_binding(binding);
        }
        scope
    }

    /// Add an implementation binding to this scope
    pub fn add_binding(&mut self, binding: ImplementationBinding) {
        self.bindings.insert(binding.name().to_string(), binding);
    }

    /// Resolve an implementation name, walking the parent chain
    pub fn resolve(&self, name: &str) -> Option<&ImplementationBinding> {
        if let Some(binding) = self.bindings.get(name) {
            return Some(binding);
        }
        self.parent.as_deref().and_then(|p| p.resolve(name))
    }

    /// Whether an implementation resolves in this scope or a parent
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Names bound directly in this scope (parents excluded), in order
    pub fn binding_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }
}

impl Default for LoadingScope {
    fn default() -> Self {
        Self::new()
    }
}
