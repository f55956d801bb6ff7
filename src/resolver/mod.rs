//! Early resolution of foreign-implementation references
//!
//! Stylesheets may bypass the handler registry and name an implementation
//! directly in a namespace declaration. The tracker scans every declaration
//! in the tree, recognizes the known URI shapes, and eagerly resolves each
//! named implementation through the given loading scope so that a bad
//! reference fails the preprocessing pass instead of surfacing mid-transform
//! as a less actionable engine error. The tracker has no awareness of the
//! handler registry.

use indexmap::IndexSet;
use std::fs;
use std::path::Path;
use tracing::debug;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::scope::LoadingScope;
use crate::{BridgeError, BridgeResult};

/// `language:`-style direct reference
pub const FOREIGN_LANGUAGE_PREFIX: &str = "language:";

/// HTTP-based engine convention for foreign implementations
pub const FOREIGN_HTTP_PREFIX: &str = "http://xml.transform.dev/impl/";

/// Custom scheme for direct references
pub const FOREIGN_SCHEME_PREFIX: &str = "impl://";

/// Tracks implementations referenced directly from a stylesheet.
///
/// Resolved names are kept in first-seen order with duplicates collapsed;
/// the set is owned by the tracker instance and reset per scan, so concurrent
/// transformations each see only their own references.
#[derive(Default)]
pub struct ForeignReferenceTracker {
    resolved: IndexSet<String>,
}

impl ForeignReferenceTracker {
    /// Create a tracker with an empty resolution set
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all recorded resolutions
    pub fn reset(&mut self) {
        self.resolved.clear();
    }

    /// Resolved implementation names, in first-seen order
    pub fn snapshot(&self) -> Vec<String> {
        self.resolved.iter().cloned().collect()
    }

    /// Scan a stylesheet file, resolving every direct reference.
    ///
    /// A missing file is not an error; the transformation layer reports that
    /// separately. A reference that does not resolve in `scope` is fatal.
    pub fn scan(&mut self, stylesheet: &Path, scope: &LoadingScope) -> BridgeResult<()> {
        if !stylesheet.is_file() {
            return Ok(());
        }
        let source = fs::read_to_string(stylesheet)?;
        self.scan_source(&source, scope)
    }

    /// Scan stylesheet text, resolving every direct reference
    pub fn scan_source(&mut self, source: &str, scope: &LoadingScope) -> BridgeResult<()> {
        for name in collect_foreign_references(source)? {
            if !scope.contains(&name) {
                return Err(BridgeError::UnresolvableImplementation(name));
            }
            debug!("Resolved foreign implementation reference: {}", name);
            self.resolved.insert(name);
        }
        Ok(())
    }
}

/// Collect implementation names referenced by namespace declarations anywhere
/// in the tree, in first-seen order
pub fn collect_foreign_references(source: &str) -> BridgeResult<IndexSet<String>> {
    let mut reader = Reader::from_str(source);
    let mut buf = Vec::new();
    let mut names = IndexSet::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
                    if !key.starts_with("xmlns") {
                        continue;
                    }
                    let value = attr.unescape_value()?;
                    if let Some(name) = extract_implementation_name(value.as_ref()) {
                        if !name.is_empty() {
                            names.insert(name.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        buf.clear();
    }
    Ok(names)
}

/// Extract the implementation name from a recognized foreign URI shape
pub fn extract_implementation_name(uri: &str) -> Option<&str> {
    let trimmed = uri.trim();
    if let Some(rest) = trimmed.strip_prefix(FOREIGN_LANGUAGE_PREFIX) {
        return Some(rest);
    }
    if let Some(rest) = trimmed.strip_prefix(FOREIGN_HTTP_PREFIX) {
        return Some(rest);
    }
    if let Some(rest) = trimmed.strip_prefix(FOREIGN_SCHEME_PREFIX) {
        return Some(rest);
    }
    None
}
