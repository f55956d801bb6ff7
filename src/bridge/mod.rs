//! Namespace bridge generation
//!
//! Inspects a stylesheet for the well-known extension namespace, validates
//! every referenced element against the handler registry, builds a static
//! dispatch binding (one forwarding entry point per discovered element, each
//! resolving through the registry at dispatch time), and writes a rewritten
//! copy of the stylesheet whose extension-namespace declaration points at the
//! bridge through the engine's foreign-implementation URI convention.

use indexmap::IndexSet;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::handler::{ExtensionCall, ExtensionHandler, ProcessorContext};
use crate::registry::HandlerRegistry;
use crate::resolver::FOREIGN_HTTP_PREFIX;
use crate::scope::{ImplementationBinding, LoadingScope};
use crate::{BridgeError, BridgeResult};

/// Well-known namespace identifying custom extension elements
pub const EXTENSION_NAMESPACE: &str = "urn:app-extension";

/// Fully-qualified name the dispatch binding is registered under in the
/// isolated scope; the rewritten stylesheet points at it
pub const BRIDGE_UNIT_NAME: &str = "app.generated.ExtensionBridge";

/// Ephemeral result of one bridge-generation pass.
///
/// Owns the temporary work directory holding the rewritten stylesheet; the
/// directory is removed when the artifact is dropped, on every exit path of
/// the consuming transformation.
pub struct BridgeArtifact {
    rewritten_script: PathBuf,
    scope: Arc<LoadingScope>,
    entry_points: Vec<String>,
    work_dir: TempDir,
}

impl std::fmt::Debug for BridgeArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeArtifact")
            .field("rewritten_script", &self.rewritten_script)
            .field("entry_points", &self.entry_points)
            .field("work_dir", &self.work_dir)
            .finish_non_exhaustive()
    }
}

impl BridgeArtifact {
    /// Path of the rewritten stylesheet inside the work directory
    pub fn rewritten_script(&self) -> &Path {
        &self.rewritten_script
    }

    /// Isolated scope exposing the dispatch binding, with the ambient scope
    /// as parent
    pub fn scope(&self) -> &Arc<LoadingScope> {
        &self.scope
    }

    /// Forwarding entry points, in first-seen document order
    pub fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    /// The temporary work directory owning all generated files
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }
}

/// Forwards one element name to a registry lookup at dispatch time.
struct RegistryForwarder {
    name: String,
    registry: Arc<HandlerRegistry>,
}

impl ExtensionHandler for RegistryForwarder {
    fn invoke(&self, context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()> {
        let handler = self.registry.lookup(&self.name).ok_or_else(|| {
            BridgeError::Transform(format!(
                "no handler registered for extension element '{}'",
                self.name
            ))
        })?;
        handler.invoke(context, call)
    }
}

/// Bridge a stylesheet's custom extension elements if it declares any.
///
/// Returns `Ok(None)` when the stylesheet does not declare the extension
/// namespace or declares it without using it. Validation of missing handlers
/// is exhaustive and strictly precedes all artifact construction.
pub fn preprocess_if_needed(
    stylesheet: &Path,
    registry: &Arc<HandlerRegistry>,
    ambient: &Arc<LoadingScope>,
) -> BridgeResult<Option<BridgeArtifact>> {
    if !stylesheet.is_file() {
        return Ok(None);
    }
    let source = fs::read_to_string(stylesheet)?;

    let Some(prefix) = find_extension_prefix(&source)? else {
        return Ok(None);
    };

    let elements = collect_extension_elements(&source, &prefix)?;
    if elements.is_empty() {
        debug!(
            "Stylesheet declares extension prefix '{}' but never uses it",
            prefix
        );
        return Ok(None);
    }

    let missing: Vec<String> = elements
        .iter()
        .filter(|name| !registry.contains(name))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(BridgeError::MissingHandlers(missing));
    }

    let mut dispatch = ImplementationBinding::new(BRIDGE_UNIT_NAME);
    for name in &elements {
        dispatch.provide(
            name.clone(),
            Arc::new(RegistryForwarder {
                name: name.clone(),
                registry: Arc::clone(registry),
            }),
        );
    }

    let work_dir = tempfile::Builder::new()
        .prefix("xslt_ext_bridge_")
        .tempdir()?;
    let rewritten_script = work_dir.path().join(derive_bridged_name(stylesheet));
    rewrite_namespace(&source, &prefix, &rewritten_script)?;

    let scope = Arc::new(LoadingScope::isolated(
        vec![dispatch],
        Vec::new(),
        Arc::clone(ambient),
    ));

    info!(
        "Bridged {} extension element(s) under prefix '{}' into {}",
        elements.len(),
        prefix,
        BRIDGE_UNIT_NAME
    );

    Ok(Some(BridgeArtifact {
        rewritten_script,
        scope,
        entry_points: elements.into_iter().collect(),
        work_dir,
    }))
}

/// Find the prefix bound to [`EXTENSION_NAMESPACE`] on the root element
pub fn find_extension_prefix(source: &str) -> BridgeResult<Option<String>> {
    let mut reader = Reader::from_str(source);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                for attr in e.attributes().flatten() {
                    if let Some(prefix) = attr.key.as_ref().strip_prefix(b"xmlns:") {
                        let value = attr.unescape_value()?;
                        if value.as_ref() == EXTENSION_NAMESPACE {
                            return Ok(Some(String::from_utf8_lossy(prefix).into_owned()));
                        }
                    }
                }
                // Only the root element carries the declaration.
                return Ok(None);
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        buf.clear();
    }
}

/// Collect local names of all elements under the given prefix, in first-seen
/// document order with duplicates collapsed
pub fn collect_extension_elements(source: &str, prefix: &str) -> BridgeResult<IndexSet<String>> {
    let needle = format!("{}:", prefix).into_bytes();
    let mut reader = Reader::from_str(source);
    let mut buf = Vec::new();
    let mut names = IndexSet::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if let Some(local) = e.name().as_ref().strip_prefix(needle.as_slice()) {
                    if !local.is_empty() {
                        names.insert(String::from_utf8_lossy(local).into_owned());
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

fn rewrite_namespace(source: &str, prefix: &str, output: &Path) -> BridgeResult<()> {
    let target = format!("xmlns:{}", prefix);
    let engine_uri = format!("{}{}", FOREIGN_HTTP_PREFIX, BRIDGE_UNIT_NAME);

    let file = fs::File::create(output)?;
    let mut writer = Writer::new(BufWriter::new(file));
    let mut reader = Reader::from_str(source);
    let mut buf = Vec::new();
    let mut root_seen = false;
    let mut replaced = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if root_seen {
                    writer.write_event(Event::Start(e))?;
                } else {
                    root_seen = true;
                    let rebuilt = substitute_declaration(&e, &target, &engine_uri, &mut replaced)?;
                    writer.write_event(Event::Start(rebuilt))?;
                }
            }
            Ok(Event::Empty(e)) => {
                if root_seen {
                    writer.write_event(Event::Empty(e))?;
                } else {
                    root_seen = true;
                    let rebuilt = substitute_declaration(&e, &target, &engine_uri, &mut replaced)?;
                    writer.write_event(Event::Empty(rebuilt))?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(event) => writer.write_event(event)?,
            Err(e) => return Err(e.into()),
        }
        buf.clear();
    }

    // Defensive: the declaration was located once already in
    // find_extension_prefix, so this should not trigger.
    if !replaced {
        return Err(BridgeError::Rewrite(prefix.to_string()));
    }
    Ok(())
}

fn substitute_declaration(
    element: &BytesStart<'_>,
    target: &str,
    engine_uri: &str,
    replaced: &mut bool,
) -> BridgeResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut rebuilt = BytesStart::new(name);
    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == target {
            rebuilt.push_attribute((key.as_str(), engine_uri));
            *replaced = true;
        } else {
            let value = attr.unescape_value()?;
            rebuilt.push_attribute((key.as_str(), value.as_ref()));
        }
    }
    Ok(rebuilt)
}

fn derive_bridged_name(stylesheet: &Path) -> String {
    let stem = stylesheet
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stylesheet".to_string());
    let ext = stylesheet
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "xsl".to_string());
    format!("{}-bridged.{}", stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRIDGED_STYLESHEET: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:ext="urn:app-extension">
  <xsl:template match="/">
    <ext:greet name="team"/>
    <ext:shout/>
    <ext:greet name="again"/>
  </xsl:template>
</xsl:stylesheet>
"#;

    const PLAIN_STYLESHEET: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"/>
</xsl:stylesheet>
"#;

    const UNUSED_PREFIX_STYLESHEET: &str = r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:ext="urn:app-extension">
  <xsl:template match="/"/>
</xsl:stylesheet>
"#;

    fn write_stylesheet(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("collection.xsl");
        fs::write(&path, content).unwrap();
        path
    }

    fn noop(name: &str, registry: &HandlerRegistry) {
        registry
            .register(name, Arc::new(|_: &mut ProcessorContext, _: &ExtensionCall| Ok(())))
            .unwrap();
    }

    #[test]
    fn test_find_extension_prefix() {
        assert_eq!(
            find_extension_prefix(BRIDGED_STYLESHEET).unwrap(),
            Some("ext".to_string())
        );
        assert_eq!(find_extension_prefix(PLAIN_STYLESHEET).unwrap(), None);
    }

    #[test]
    fn test_collect_elements_first_seen_order() {
        let names = collect_extension_elements(BRIDGED_STYLESHEET, "ext").unwrap();
        let names: Vec<&String> = names.iter().collect();
        assert_eq!(names, vec!["greet", "shout"]);
    }

    #[test]
    fn test_no_namespace_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, PLAIN_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        let ambient = Arc::new(LoadingScope::ambient());

        let artifact = preprocess_if_needed(&stylesheet, &registry, &ambient).unwrap();
        assert!(artifact.is_none());
    }

    #[test]
    fn test_unused_prefix_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, UNUSED_PREFIX_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        let ambient = Arc::new(LoadingScope::ambient());

        let artifact = preprocess_if_needed(&stylesheet, &registry, &ambient).unwrap();
        assert!(artifact.is_none());
    }

    #[test]
    fn test_missing_handlers_listed_exhaustively() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, BRIDGED_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        noop("greet", &registry);
        let ambient = Arc::new(LoadingScope::ambient());

        let err = preprocess_if_needed(&stylesheet, &registry, &ambient).unwrap_err();
        match err {
            BridgeError::MissingHandlers(missing) => {
                assert_eq!(missing, vec!["shout".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bridge_artifact_rewrites_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, BRIDGED_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        noop("greet", &registry);
        noop("shout", &registry);
        let ambient = Arc::new(LoadingScope::ambient());

        let artifact = preprocess_if_needed(&stylesheet, &registry, &ambient)
            .unwrap()
            .expect("bridge expected");

        assert_eq!(artifact.entry_points(), ["greet", "shout"]);
        assert!(artifact.rewritten_script().exists());

        let rewritten = fs::read_to_string(artifact.rewritten_script()).unwrap();
        assert!(!rewritten.contains(EXTENSION_NAMESPACE));
        assert!(rewritten.contains(&format!("{}{}", FOREIGN_HTTP_PREFIX, BRIDGE_UNIT_NAME)));
        // The rewritten copy is still scannable.
        assert_eq!(find_extension_prefix(&rewritten).unwrap(), None);

        let binding = artifact.scope().resolve(BRIDGE_UNIT_NAME).unwrap();
        assert_eq!(binding.entry_point_names(), vec!["greet", "shout"]);
    }

    #[test]
    fn test_bridge_generation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, BRIDGED_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        noop("greet", &registry);
        noop("shout", &registry);
        let ambient = Arc::new(LoadingScope::ambient());

        let first = preprocess_if_needed(&stylesheet, &registry, &ambient)
            .unwrap()
            .unwrap();
        let second = preprocess_if_needed(&stylesheet, &registry, &ambient)
            .unwrap()
            .unwrap();
        assert_eq!(first.entry_points(), second.entry_points());
        assert_ne!(first.work_dir(), second.work_dir());
    }

    #[test]
    fn test_dispatch_resolves_through_registry_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, BRIDGED_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        noop("greet", &registry);
        noop("shout", &registry);
        let ambient = Arc::new(LoadingScope::ambient());

        let artifact = preprocess_if_needed(&stylesheet, &registry, &ambient)
            .unwrap()
            .unwrap();

        // Re-register after generation: the forwarder must see the new handler.
        registry
            .register(
                "greet",
                Arc::new(|context: &mut ProcessorContext, _: &ExtensionCall| {
                    context.output_to_result_tree("replaced");
                    Ok(())
                }),
            )
            .unwrap();

        let binding = artifact.scope().resolve(BRIDGE_UNIT_NAME).unwrap();
        let forwarder = binding.entry_point("greet").unwrap();
        let mut context = ProcessorContext::new(".");
        forwarder
            .invoke(&mut context, &ExtensionCall::new("greet"))
            .unwrap();
        assert_eq!(context.result(), "replaced");
    }

    #[test]
    fn test_work_dir_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let stylesheet = write_stylesheet(&dir, BRIDGED_STYLESHEET);
        let registry = Arc::new(HandlerRegistry::new());
        noop("greet", &registry);
        noop("shout", &registry);
        let ambient = Arc::new(LoadingScope::ambient());

        let artifact = preprocess_if_needed(&stylesheet, &registry, &ambient)
            .unwrap()
            .unwrap();
        let work_dir = artifact.work_dir().to_path_buf();
        assert!(work_dir.exists());
        drop(artifact);
        assert!(!work_dir.exists());
    }
}
