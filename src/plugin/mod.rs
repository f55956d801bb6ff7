//! Plugin manifest loading and handler registration
//!
//! The loader reads a declarative manifest, loads the code bundles it names
//! into an isolated scope, binds every plugin entry to a handler through the
//! typed entry-point API, and registers the handlers into the registry.
//! Registration is all-or-nothing: every entry must bind before any of them
//! is registered, so a bad manifest never leaves a partial load behind.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::BridgeConfig;
use crate::handler::{ExtensionCall, ExtensionHandler, ProcessorContext};
use crate::registry::HandlerRegistry;
use crate::scope::{BundleRegistrar, LoadingScope, DEFAULT_ENTRY_POINT};
use crate::{BridgeError, BridgeResult};

pub mod bundle;
pub mod manifest;
pub mod sample;

pub use manifest::{Manifest, PluginEntry};

/// Outcome of one manifest-load attempt.
///
/// Either `loaded` with the full entry list, or not loaded with a message;
/// never partially populated, never mutated after construction.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Manifest path the attempt targeted
    pub config_path: PathBuf,

    /// Whether the manifest was loaded and its entries registered
    pub loaded: bool,

    /// Registered entries as `element -> Implementation#method`, in
    /// registration order
    pub registered: Vec<String>,

    /// Number of distinct code bundles that were loaded
    pub bundle_count: usize,

    /// Explanation when the manifest was not loaded
    pub message: Option<String>,

    /// When the attempt finished
    pub loaded_at: DateTime<Utc>,
}

impl LoadReport {
    fn ok(config_path: &Path, registered: Vec<String>, bundle_count: usize) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            loaded: true,
            registered,
            bundle_count,
            message: None,
            loaded_at: Utc::now(),
        }
    }

    fn skipped(config_path: &Path, message: impl Into<String>) -> Self {
        Self {
            config_path: config_path.to_path_buf(),
            loaded: false,
            registered: Vec::new(),
            bundle_count: 0,
            message: Some(message.into()),
            loaded_at: Utc::now(),
        }
    }

    fn failed(config_path: &Path, message: impl Into<String>) -> Self {
        Self::skipped(config_path, message)
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        if self.loaded {
            format!(
                "Loaded {} plugin(s) from {} (bundles={})",
                self.registered.len(),
                self.config_path.display(),
                self.bundle_count
            )
        } else {
            format!(
                "Plugins not loaded from {}: {}",
                self.config_path.display(),
                self.message.as_deref().unwrap_or("unknown reason")
            )
        }
    }
}

/// Wraps a bound handler so dispatch failures carry the element name.
///
/// Transformation-layer errors pass through verbatim; anything else is
/// wrapped, tagging the offending element. The wrapper also owns the scope
/// the handler was resolved from: the handler's code may live inside a
/// bundle library that scope holds mapped, so the scope must stay alive for
/// as long as the handler is registered.
struct PluginHandler {
    element: String,
    // Declared before `_scope` so the handler drops while its bundle is
    // still mapped.
    inner: Arc<dyn ExtensionHandler>,
    _scope: Arc<LoadingScope>,
}

impl ExtensionHandler for PluginHandler {
    fn invoke(&self, context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()> {
        match self.inner.invoke(context, call) {
            Ok(()) => Ok(()),
            Err(e @ BridgeError::Transform(_)) => Err(e),
            Err(other) => Err(BridgeError::PluginInvocation {
                element: self.element.clone(),
                source: Box::new(other),
            }),
        }
    }
}

/// Loads plugin manifests and registers the resulting handlers.
pub struct PluginManifestLoader {
    registry: Arc<HandlerRegistry>,
    ambient: Arc<LoadingScope>,
    default_report: Mutex<Option<LoadReport>>,
}

impl PluginManifestLoader {
    /// Create a loader targeting the given registry, resolving
    /// implementations against `ambient` when no bundles are declared
    pub fn new(registry: Arc<HandlerRegistry>, ambient: Arc<LoadingScope>) -> Self {
        Self {
            registry,
            ambient,
            default_report: Mutex::new(None),
        }
    }

    /// Load the default manifest once; later calls return the cached report
    pub async fn ensure_default_loaded(&self, config: &BridgeConfig) -> LoadReport {
        let mut cached = self.default_report.lock().await;
        if let Some(report) = cached.as_ref() {
            return report.clone();
        }
        let report = self.load(config).await;
        *cached = Some(report.clone());
        report
    }

    /// Lenient load: a missing manifest or a failed load is reported, not
    /// raised
    pub async fn load(&self, config: &BridgeConfig) -> LoadReport {
        let path = &config.manifest_path;
        if !path.exists() {
            return LoadReport::skipped(path, "manifest not found");
        }
        match self.load_strict(config).await {
            Ok(report) => report,
            Err(e) => {
                warn!("Manifest load failed: {}", e);
                LoadReport::failed(path, e.to_string())
            }
        }
    }

    /// Strict load: any malformed entry, unresolvable bundle or binding
    /// failure propagates as an error
    pub async fn load_strict(&self, config: &BridgeConfig) -> BridgeResult<LoadReport> {
        let path = &config.manifest_path;
        if !path.exists() {
            return Err(BridgeError::InvalidArgument(format!(
                "manifest does not exist: {}",
                path.display()
            )));
        }

        let source = tokio::fs::read_to_string(path).await?;
        let manifest = manifest::parse_manifest(&source, path)?;
        let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty());

        let bundle_dir = self.resolve_bundle_dir(config, &manifest, base_dir);
        let mut bundle_paths: IndexSet<PathBuf> = IndexSet::new();
        if let Some(dir) = bundle_dir.as_deref() {
            enumerate_bundles(dir, &mut bundle_paths);
        }
        for raw in &manifest.bundles {
            let resolved = crate::utils::resolve_path(raw, base_dir);
            if resolved.is_file() {
                bundle_paths.insert(canonical(&resolved));
            }
        }
        for entry in &manifest.plugins {
            if let Some(raw) = entry.bundle.as_deref() {
                let resolved =
                    crate::utils::resolve_bundle_path(raw, bundle_dir.as_deref(), base_dir);
                if !resolved.is_file() {
                    return Err(BridgeError::InvalidManifestEntry {
                        path: path.to_path_buf(),
                        reason: format!(
                            "bundle for plugin '{}' does not exist: {}",
                            entry.element,
                            resolved.display()
                        ),
                    });
                }
                bundle_paths.insert(canonical(&resolved));
            }
        }

        let scope = self.build_scope(&bundle_paths)?;

        // Bind everything before registering anything, so a failing entry
        // leaves the registry untouched.
        let mut bound: Vec<(String, Arc<dyn ExtensionHandler>, String)> = Vec::new();
        for entry in &manifest.plugins {
            let handler = bind_entry(entry, &scope)?;
            let method = entry
                .method
                .clone()
                .unwrap_or_else(|| entry.element.clone());
            let description = format!("{} -> {}#{}", entry.element, entry.implementation, method);
            bound.push((entry.element.clone(), handler, description));
        }

        let mut registered = Vec::with_capacity(bound.len());
        for (element, handler, description) in bound {
            self.registry.register(&element, handler)?;
            registered.push(description);
        }

        let report = LoadReport::ok(path, registered, bundle_paths.len());
        info!("{}", report.summary());
        Ok(report)
    }

    fn resolve_bundle_dir(
        &self,
        config: &BridgeConfig,
        manifest: &Manifest,
        base_dir: Option<&Path>,
    ) -> Option<PathBuf> {
        // The process-wide override takes precedence over the manifest
        // value; both resolve against the manifest's directory.
        if let Some(dir) = config.bundle_dir.as_deref() {
            return Some(crate::utils::resolve_path(&dir.to_string_lossy(), base_dir));
        }
        manifest
            .bundle_dir
            .as_deref()
            .map(|raw| crate::utils::resolve_path(raw, base_dir))
    }

    fn build_scope(&self, bundle_paths: &IndexSet<PathBuf>) -> BridgeResult<Arc<LoadingScope>> {
        if bundle_paths.is_empty() {
            return Ok(Arc::clone(&self.ambient));
        }
        let mut registrar = BundleRegistrar::new();
        let mut loaded = Vec::with_capacity(bundle_paths.len());
        for path in bundle_paths {
            loaded.push(bundle::load_bundle(path, &mut registrar)?);
        }
        Ok(Arc::new(LoadingScope::isolated(
            registrar.into_bindings(),
            loaded,
            Arc::clone(&self.ambient),
        )))
    }
}

fn bind_entry(
    entry: &PluginEntry,
    scope: &Arc<LoadingScope>,
) -> BridgeResult<Arc<dyn ExtensionHandler>> {
    let binding = scope
        .resolve(&entry.implementation)
        .ok_or_else(|| BridgeError::UnresolvableImplementation(entry.implementation.clone()))?;

    let method = entry.method.as_deref();
    let inner = if (method.is_none() || method == Some(DEFAULT_ENTRY_POINT))
        && binding.has_default_entry_point()
    {
        // Single-entry-point shape with no override: use it directly.
        binding
            .entry_point(DEFAULT_ENTRY_POINT)
            .ok_or_else(|| BridgeError::UnresolvableImplementation(entry.implementation.clone()))?
    } else {
        let name = method.unwrap_or(entry.element.as_str());
        binding.entry_point(name).ok_or_else(|| {
            BridgeError::UnresolvableImplementation(format!(
                "{}#{}",
                entry.implementation, name
            ))
        })?
    };

    Ok(Arc::new(PluginHandler {
        element: entry.element.clone(),
        inner,
        _scope: Arc::clone(scope),
    }))
}

fn enumerate_bundles(dir: &Path, out: &mut IndexSet<PathBuf>) {
    if !dir.is_dir() {
        return;
    }
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| bundle::is_bundle_file(p))
        .collect();
    // Deterministic load order.
    found.sort();
    for path in found {
        out.insert(canonical(&path));
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
