use std::sync::Arc;
use tempfile::TempDir;

use xslt_bridge::scope::{BUILTIN_EXEC_IMPL, BUILTIN_GREET_IMPL, DEFAULT_ENTRY_POINT};
use xslt_bridge::{
    BridgeError, ExtensionCall, ForeignReferenceTracker, ImplementationBinding, LoadingScope,
    ProcessorContext,
};

#[test]
fn test_scan_resolves_all_known_uri_shapes() {
    let temp_dir = TempDir::new().unwrap();
    let stylesheet = temp_dir.path().join("transform.xsl");
    std::fs::write(
        &stylesheet,
        format!(
            r#"<?xml version="1.0"?>
<xsl:stylesheet version="1.0"
    xmlns:xsl="http://www.w3.org/1999/XSL/Transform"
    xmlns:a="language:{greet}"
    xmlns:b="http://xml.transform.dev/impl/{exec}">
  <xsl:template match="/">
    <inner xmlns:c="impl://{greet}"/>
  </xsl:template>
</xsl:stylesheet>
"#,
            greet = BUILTIN_GREET_IMPL,
            exec = BUILTIN_EXEC_IMPL,
        ),
    )
    .unwrap();

    let scope = LoadingScope::ambient();
    let mut tracker = ForeignReferenceTracker::new();
    tracker.scan(&stylesheet, &scope).unwrap();

    // Each implementation is recorded once, in first-seen order.
    assert_eq!(
        tracker.snapshot(),
        vec![BUILTIN_GREET_IMPL.to_string(), BUILTIN_EXEC_IMPL.to_string()]
    );
}

#[test]
fn test_unresolvable_reference_fails_the_scan() {
    let temp_dir = TempDir::new().unwrap();
    let stylesheet = temp_dir.path().join("transform.xsl");
    std::fs::write(
        &stylesheet,
        r#"<root xmlns:x="language:com.acme.Missing"/>"#,
    )
    .unwrap();

    let scope = LoadingScope::ambient();
    let mut tracker = ForeignReferenceTracker::new();
    let err = tracker.scan(&stylesheet, &scope).unwrap_err();
    match err {
        BridgeError::UnresolvableImplementation(name) => {
            assert_eq!(name, "com.acme.Missing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_stylesheet_is_not_a_scan_error() {
    let scope = LoadingScope::ambient();
    let mut tracker = ForeignReferenceTracker::new();
    tracker
        .scan(std::path::Path::new("/nonexistent/transform.xsl"), &scope)
        .unwrap();
    assert!(tracker.snapshot().is_empty());
}

#[test]
fn test_references_resolve_through_parent_scope() {
    let ambient = Arc::new(LoadingScope::ambient());

    let mut binding = ImplementationBinding::new("com.acme.Local");
    binding.provide(
        DEFAULT_ENTRY_POINT,
        Arc::new(|_: &mut ProcessorContext, _: &ExtensionCall| Ok(())),
    );
    let isolated = LoadingScope::isolated(vec![binding], Vec::new(), ambient);

    let source = format!(
        r#"<root xmlns:a="impl://com.acme.Local" xmlns:b="language:{}"/>"#,
        BUILTIN_GREET_IMPL
    );
    let mut tracker = ForeignReferenceTracker::new();
    tracker.scan_source(&source, &isolated).unwrap();
    assert_eq!(
        tracker.snapshot(),
        vec!["com.acme.Local".to_string(), BUILTIN_GREET_IMPL.to_string()]
    );
}
