//! XSLT Extension Bridging Library
//!
//! Bridges custom extension elements in XSLT stylesheets to registered
//! handlers: a stylesheet declaring the well-known extension namespace is
//! rewritten to dispatch through a generated binding, plugin manifests map
//! extension elements to implementations loaded from code bundles, and
//! direct foreign-implementation references are resolved eagerly before a
//! transformation runs.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod handler;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod session;
pub mod utils;

pub use bridge::{BridgeArtifact, BRIDGE_UNIT_NAME, EXTENSION_NAMESPACE};
pub use config::BridgeConfig;
pub use handler::{ExtensionCall, ExtensionHandler, ProcessorContext};
pub use plugin::{LoadReport, PluginEntry, PluginManifestLoader};
pub use registry::HandlerRegistry;
pub use resolver::ForeignReferenceTracker;
pub use scope::{BundleRegistrar, ImplementationBinding, LoadingScope};
pub use session::{TransformEngine, TransformOutcome, TransformationSession};

use std::path::Path;
use std::sync::Arc;

/// Main application context that coordinates all components
pub struct XsltBridge {
    config: BridgeConfig,
    registry: Arc<HandlerRegistry>,
    ambient: Arc<LoadingScope>,
    loader: PluginManifestLoader,
}

impl XsltBridge {
    /// Create a new XsltBridge instance with the given configuration.
    ///
    /// The registry starts with the built-in handlers; the ambient scope
    /// exposes the built-in implementations.
    pub fn new(config: BridgeConfig) -> Self {
        let registry = Arc::new(HandlerRegistry::with_builtins());
        let ambient = Arc::new(LoadingScope::ambient());
        let loader = PluginManifestLoader::new(Arc::clone(&registry), Arc::clone(&ambient));

        Self {
            config,
            registry,
            ambient,
            loader,
        }
    }

    /// Resolved configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Shared handler registry
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Ambient loading scope
    pub fn ambient_scope(&self) -> &Arc<LoadingScope> {
        &self.ambient
    }

    /// Load the configured plugin manifest once; later calls return the
    /// cached report
    pub async fn ensure_plugins_loaded(&self) -> LoadReport {
        self.loader.ensure_default_loaded(&self.config).await
    }

    /// Load the configured plugin manifest, reporting rather than raising
    /// failures
    pub async fn load_plugins(&self) -> LoadReport {
        self.loader.load(&self.config).await
    }

    /// Load the configured plugin manifest, failing on the first problem
    pub async fn load_plugins_strict(&self) -> BridgeResult<LoadReport> {
        self.loader.load_strict(&self.config).await
    }

    /// Create a transformation session over the shared registry and scope
    pub fn session(&self) -> TransformationSession {
        TransformationSession::new(Arc::clone(&self.registry), Arc::clone(&self.ambient))
    }

    /// Bridge a stylesheet's extension elements if it declares any
    pub fn preprocess(&self, stylesheet: &Path) -> BridgeResult<Option<BridgeArtifact>> {
        bridge::preprocess_if_needed(stylesheet, &self.registry, &self.ambient)
    }
}

/// Bridging subsystem error types
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("no handler registered for extension element(s): {0:?}")]
    MissingHandlers(Vec<String>),

    #[error("invalid plugin manifest entry in {path}: {reason}")]
    InvalidManifestEntry {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("implementation not found in loading scope: {0}")]
    UnresolvableImplementation(String),

    #[error("failed to rewrite namespace declaration for prefix '{0}'")]
    Rewrite(String),

    #[error("extension element '{element}' failed: {source}")]
    PluginInvocation {
        element: String,
        source: Box<BridgeError>,
    },

    #[error("transformation failed: {0}")]
    Transform(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to load code bundle {path}: {reason}")]
    BundleLoad {
        path: std::path::PathBuf,
        reason: String,
    },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the bridging subsystem
pub type BridgeResult<T> = Result<T, BridgeError>;
