//! Handler invocation contract shared by the registry, the bridge and plugins

use indexmap::IndexMap;
use std::path::{Path, PathBuf};

use crate::BridgeResult;

pub mod builtins;

/// Call-site descriptor for one extension element occurrence.
///
/// Carries the element's local name and its attributes in document order,
/// which is all the engine's foreign-function convention passes through.
#[derive(Debug, Clone)]
pub struct ExtensionCall {
    /// Element local name
    name: String,

    /// Attributes in document order
    attributes: IndexMap<String, String>,
}

impl ExtensionCall {
    /// Create a call descriptor for the given element name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Element local name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Processing context handed to a handler at dispatch time.
///
/// Handlers emit text into the result tree through [`ProcessorContext::output_to_result_tree`];
/// the engine collects the buffer after the call returns.
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Directory relative paths in the source document resolve against
    base_dir: PathBuf,

    /// Accumulated result-tree output
    output: String,
}

impl ProcessorContext {
    /// Create a context rooted at the given base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            output: String::new(),
        }
    }

    /// Base directory of the document being transformed
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append text to the result tree
    pub fn output_to_result_tree(&mut self, text: &str) {
        self.output.push_str(text);
    }

    /// Result-tree text accumulated so far
    pub fn result(&self) -> &str {
        &self.output
    }
}

/// Contract every extension-element implementation must satisfy.
///
/// A handler may fail with [`crate::BridgeError::Transform`], which the
/// dispatch layer propagates verbatim through the engine's error channel;
/// any other error is wrapped in [`crate::BridgeError::PluginInvocation`].
pub trait ExtensionHandler: Send + Sync {
    /// Handle one extension-element call site
    fn invoke(&self, context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()>;
}

impl<F> ExtensionHandler for F
where
    F: Fn(&mut ProcessorContext, &ExtensionCall) -> BridgeResult<()> + Send + Sync,
{
    fn invoke(&self, context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()> {
        self(context, call)
    }
}
