//! Plugin manifest parsing
//!
//! The manifest is a flat XML document: a root element carrying an optional
//! `bundleDir` setting (attribute or child element), zero or more `bundle`
//! elements naming code-bundle files, and zero or more `plugin` elements
//! mapping extension-element names to implementations. Every field reads the
//! attribute first and falls back to the first child element's text, through
//! a fixed list of alternate names (first non-blank wins).

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

use crate::utils::first_non_blank;
use crate::{BridgeError, BridgeResult};

/// One element-to-implementation mapping parsed from the manifest.
///
/// Consumed once to build a registry handler, not retained afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    /// Extension element local name
    pub element: String,

    /// Fully-qualified implementation name
    pub implementation: String,

    /// Optional entry-point override; defaults to the element name
    pub method: Option<String>,

    /// Optional per-entry code-bundle reference
    pub bundle: Option<String>,
}

/// Parsed manifest content
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    /// Bundle directory declared on the manifest root
    pub bundle_dir: Option<String>,

    /// Explicit bundle declarations, in document order
    pub bundles: Vec<String>,

    /// Plugin entries, in document order
    pub plugins: Vec<PluginEntry>,
}

#[derive(Default)]
struct RawEntry {
    attrs: IndexMap<String, String>,
    children: IndexMap<String, String>,
}

impl RawEntry {
    fn value(&self, name: &str) -> Option<&str> {
        first_non_blank([
            self.attrs.get(name).map(String::as_str),
            self.children.get(name).map(String::as_str),
        ])
    }

    fn first(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.value(name))
    }
}

/// Parse manifest text. `path` is used only for error messages.
pub fn parse_manifest(source: &str, path: &Path) -> BridgeResult<Manifest> {
    let mut reader = Reader::from_str(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut manifest = Manifest::default();
    let mut root = RawEntry::default();
    let mut root_seen = false;
    let mut plugin: Option<RawEntry> = None;
    let mut bundle: Option<RawEntry> = None;
    let mut bundle_text = String::new();
    let mut field: Option<(String, String)> = None;
    let mut plugin_index = 0usize;
    let mut skip_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if skip_depth > 0 {
                    skip_depth += 1;
                } else if !root_seen {
                    root_seen = true;
                    root.attrs = attrs_map(&e)?;
                } else if field.is_some() {
                    // Scalar fields are leaves; skip anything nested deeper.
                    skip_depth = 1;
                } else if plugin.is_some() || bundle.is_some() {
                    field = Some((local_name(&e), String::new()));
                } else {
                    match local_name(&e).as_str() {
                        "plugin" => {
                            plugin = Some(RawEntry {
                                attrs: attrs_map(&e)?,
                                children: IndexMap::new(),
                            });
                        }
                        "bundle" => {
                            bundle = Some(RawEntry {
                                attrs: attrs_map(&e)?,
                                children: IndexMap::new(),
                            });
                            bundle_text.clear();
                        }
                        name => {
                            field = Some((name.to_string(), String::new()));
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if skip_depth > 0 || field.is_some() {
                    // Nothing to collect from an empty nested element.
                } else if !root_seen {
                    root_seen = true;
                    root.attrs = attrs_map(&e)?;
                } else if let Some(entry) = plugin.as_mut() {
                    entry.children.entry(local_name(&e)).or_default();
                } else if let Some(entry) = bundle.as_mut() {
                    entry.children.entry(local_name(&e)).or_default();
                } else {
                    match local_name(&e).as_str() {
                        "plugin" => {
                            plugin_index += 1;
                            let raw = RawEntry {
                                attrs: attrs_map(&e)?,
                                children: IndexMap::new(),
                            };
                            manifest.plugins.push(build_entry(raw, path, plugin_index)?);
                        }
                        "bundle" => {
                            let raw = RawEntry {
                                attrs: attrs_map(&e)?,
                                children: IndexMap::new(),
                            };
                            if let Some(value) = raw.first(&["path", "jar"]) {
                                manifest.bundles.push(value.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if skip_depth > 0 {
                    // Skipped subtree.
                } else if let Some((_, text)) = field.as_mut() {
                    text.push_str(&e.unescape()?);
                } else if bundle.is_some() {
                    bundle_text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::End(e)) => {
                if skip_depth > 0 {
                    skip_depth -= 1;
                    continue;
                }
                let name = String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned();
                if field.as_ref().map(|(n, _)| n == &name).unwrap_or(false) {
                    let (field_name, text) = field.take().unwrap_or_default();
                    let target = if let Some(entry) = plugin.as_mut() {
                        &mut entry.children
                    } else if let Some(entry) = bundle.as_mut() {
                        &mut entry.children
                    } else {
                        &mut root.children
                    };
                    // First occurrence wins, even if blank.
                    target.entry(field_name).or_insert(text);
                } else if name == "plugin" && plugin.is_some() {
                    if let Some(raw) = plugin.take() {
                        plugin_index += 1;
                        manifest.plugins.push(build_entry(raw, path, plugin_index)?);
                    }
                } else if name == "bundle" && bundle.is_some() {
                    if let Some(raw) = bundle.take() {
                        let value = first_non_blank([
                            raw.first(&["path", "jar"]),
                            Some(bundle_text.as_str()),
                        ]);
                        if let Some(value) = value {
                            manifest.bundles.push(value.to_string());
                        }
                        bundle_text.clear();
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        buf.clear();
    }

    manifest.bundle_dir = root.value("bundleDir").map(str::to_string);
    Ok(manifest)
}

fn build_entry(raw: RawEntry, path: &Path, index: usize) -> BridgeResult<PluginEntry> {
    let element = raw.first(&["element", "elem", "name"]);
    let implementation = raw.first(&["class", "clazz"]);
    let (Some(element), Some(implementation)) = (element, implementation) else {
        return Err(BridgeError::InvalidManifestEntry {
            path: path.to_path_buf(),
            reason: format!("plugin entry #{} requires 'element' and 'class'", index),
        });
    };
    Ok(PluginEntry {
        element: element.to_string(),
        implementation: implementation.to_string(),
        method: raw.first(&["method", "handler"]).map(str::to_string),
        bundle: raw.first(&["jar", "bundle"]).map(str::to_string),
    })
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned()
}

fn attrs_map(e: &BytesStart<'_>) -> BridgeResult<IndexMap<String, String>> {
    let mut map = IndexMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}
