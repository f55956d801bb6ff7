use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use xslt_bridge::plugin::sample::SAMPLE_BUNDLE_IMPL;
use xslt_bridge::scope::DEFAULT_ENTRY_POINT;
use xslt_bridge::{
    BridgeConfig, ExtensionCall, ExtensionHandler, HandlerRegistry, ImplementationBinding,
    LoadingScope, PluginManifestLoader, ProcessorContext, XsltBridge,
};

/// Path of the crate's own cdylib, which doubles as a loadable bundle.
fn built_bundle() -> PathBuf {
    let mut dir = std::env::current_exe().unwrap();
    dir.pop();
    if dir.ends_with("deps") {
        dir.pop();
    }
    for name in ["libxslt_bridge.so", "libxslt_bridge.dylib", "xslt_bridge.dll"] {
        let candidate = dir.join(name);
        if candidate.exists() {
            return candidate;
        }
    }
    panic!("bundle cdylib not found under {}", dir.display());
}

fn write_manifest(dir: &TempDir, content: &str) -> BridgeConfig {
    let path = dir.path().join("plugins.xml");
    std::fs::write(&path, content).unwrap();
    BridgeConfig {
        manifest_path: path,
        bundle_dir: None,
    }
}

fn demo_scope() -> Arc<LoadingScope> {
    // An ambient scope extended with an in-process implementation, the way a
    // host application would expose its own extension code.
    let mut scope = LoadingScope::ambient();
    let mut demo = ImplementationBinding::new("com.acme.Demo");
    demo.provide(
        "run",
        Arc::new(|context: &mut ProcessorContext, call: &ExtensionCall| {
            let text = call.attribute("text").unwrap_or_default();
            context.output_to_result_tree(&text.to_uppercase());
            Ok(())
        }),
    );
    scope.add_binding(demo);
    Arc::new(scope)
}

#[tokio::test]
async fn test_manifest_maps_element_to_implementation_method() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_manifest(
        &temp_dir,
        r#"<plugins>
             <plugin element="upper" class="com.acme.Demo" method="run"/>
           </plugins>"#,
    );

    let registry = Arc::new(HandlerRegistry::new());
    let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());
    let report = loader.load_strict(&config).await.unwrap();

    assert!(report.loaded);
    assert_eq!(report.registered, vec!["upper -> com.acme.Demo#run"]);

    let handler = registry.lookup("upper").unwrap();
    let mut context = ProcessorContext::new(temp_dir.path());
    handler
        .invoke(
            &mut context,
            &ExtensionCall::new("upper").with_attribute("text", "hello"),
        )
        .unwrap();
    assert_eq!(context.result(), "HELLO");
}

#[tokio::test]
async fn test_builtin_implementations_resolvable_from_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_manifest(
        &temp_dir,
        r#"<plugins>
             <plugin element="hello" class="app.builtin.Greet"/>
           </plugins>"#,
    );

    let registry = Arc::new(HandlerRegistry::new());
    let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());
    loader.load_strict(&config).await.unwrap();

    let handler = registry.lookup("hello").unwrap();
    let mut context = ProcessorContext::new(temp_dir.path());
    handler
        .invoke(
            &mut context,
            &ExtensionCall::new("hello").with_attribute("name", "manifest"),
        )
        .unwrap();
    assert_eq!(context.result(), "Hello, manifest!");
}

#[tokio::test]
async fn test_missing_manifest_is_lenient_through_facade() {
    let app = XsltBridge::new(BridgeConfig {
        manifest_path: PathBuf::from("/nonexistent/plugins.xml"),
        bundle_dir: None,
    });

    let report = app.ensure_plugins_loaded().await;
    assert!(!report.loaded);
    assert_eq!(report.message.as_deref(), Some("manifest not found"));
    assert_eq!(report.config_path, app.config().manifest_path);
    // Built-in handlers are still available.
    assert!(app.registry().contains("greet"));
    assert!(app.registry().contains("exec"));
}

#[tokio::test]
async fn test_bad_entry_leaves_registry_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_manifest(
        &temp_dir,
        r#"<plugins>
             <plugin element="upper" class="com.acme.Demo" method="run"/>
             <plugin element="broken" class="com.acme.Nope"/>
           </plugins>"#,
    );

    let registry = Arc::new(HandlerRegistry::new());
    let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());

    let report = loader.load(&config).await;
    assert!(!report.loaded);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_reload_replaces_registration() {
    let registry = Arc::new(HandlerRegistry::new());
    let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());

    let first_dir = TempDir::new().unwrap();
    let first = write_manifest(
        &first_dir,
        r#"<plugins>
             <plugin element="upper" class="com.acme.Demo" method="run"/>
           </plugins>"#,
    );
    loader.load_strict(&first).await.unwrap();

    let second_dir = TempDir::new().unwrap();
    let second = write_manifest(
        &second_dir,
        r#"<plugins>
             <plugin element="upper" class="app.builtin.Greet"/>
           </plugins>"#,
    );
    loader.load_strict(&second).await.unwrap();

    // Last registration wins, with a single entry for the element.
    assert_eq!(registry.len(), 1);
    let handler = registry.lookup("upper").unwrap();
    let mut context = ProcessorContext::new(first_dir.path());
    handler
        .invoke(&mut context, &ExtensionCall::new("upper"))
        .unwrap();
    assert_eq!(context.result(), "Hello, world!");
}

#[tokio::test]
async fn test_bundle_dir_with_invalid_bundle_fails_leniently() {
    let temp_dir = TempDir::new().unwrap();
    let bundle_dir = temp_dir.path().join("bundles");
    std::fs::create_dir(&bundle_dir).unwrap();
    std::fs::write(bundle_dir.join("fake.so"), b"not a library").unwrap();

    let mut config = write_manifest(
        &temp_dir,
        r#"<plugins>
             <plugin element="upper" class="com.acme.Demo" method="run"/>
           </plugins>"#,
    );
    config.bundle_dir = Some(bundle_dir);

    let registry = Arc::new(HandlerRegistry::new());
    let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());

    let report = loader.load(&config).await;
    assert!(!report.loaded);
    assert!(report
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("fake.so"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_in_process_registration_through_registrar() {
    // The same typed surface code bundles use is available in-process.
    let mut registrar = xslt_bridge::BundleRegistrar::new();
    registrar.provide_handler(
        "com.acme.Echo",
        Arc::new(|context: &mut ProcessorContext, call: &ExtensionCall| {
            context.output_to_result_tree(call.name());
            Ok(())
        }),
    );

    let ambient = Arc::new(LoadingScope::ambient());
    let scope = LoadingScope::isolated(registrar.into_bindings(), Vec::new(), ambient);

    let binding = scope.resolve("com.acme.Echo").unwrap();
    assert!(binding.has_default_entry_point());
    let handler = binding.entry_point(DEFAULT_ENTRY_POINT).unwrap();

    let mut context = ProcessorContext::new(".");
    handler
        .invoke(&mut context, &ExtensionCall::new("echo"))
        .unwrap();
    assert_eq!(context.result(), "echo");
}

#[tokio::test]
async fn test_bundle_handler_outlives_the_loader() {
    let bundle = built_bundle();
    let temp_dir = TempDir::new().unwrap();
    let config = write_manifest(
        &temp_dir,
        &format!(
            r#"<plugins>
                 <plugin element="reverse" class="{}" jar="{}"/>
               </plugins>"#,
            SAMPLE_BUNDLE_IMPL,
            bundle.display()
        ),
    );

    let registry = Arc::new(HandlerRegistry::new());
    {
        // The loader and the scope it built go away here; the registered
        // handler must keep the bundle's library mapped on its own.
        let loader = PluginManifestLoader::new(Arc::clone(&registry), demo_scope());
        let report = loader.load_strict(&config).await.unwrap();
        assert_eq!(report.bundle_count, 1);
        assert_eq!(
            report.registered,
            vec![format!("reverse -> {}#reverse", SAMPLE_BUNDLE_IMPL)]
        );
    }

    let handler = registry.lookup("reverse").unwrap();
    let mut context = ProcessorContext::new(temp_dir.path());
    handler
        .invoke(
            &mut context,
            &ExtensionCall::new("reverse").with_attribute("text", "stressed"),
        )
        .unwrap();
    assert_eq!(context.result(), "desserts");
}

#[test]
fn test_load_real_bundle_directly() {
    let path = built_bundle();
    let mut registrar = xslt_bridge::BundleRegistrar::new();
    let bundle = xslt_bridge::plugin::bundle::load_bundle(&path, &mut registrar).unwrap();
    assert_eq!(bundle.path(), path);

    let bindings = registrar.into_bindings();
    let binding = bindings
        .iter()
        .find(|b| b.name() == SAMPLE_BUNDLE_IMPL)
        .unwrap();
    assert!(binding.has_default_entry_point());

    let handler = binding.entry_point(DEFAULT_ENTRY_POINT).unwrap();
    let mut context = ProcessorContext::new(".");
    handler
        .invoke(
            &mut context,
            &ExtensionCall::new("reverse").with_attribute("text", "abc"),
        )
        .unwrap();
    assert_eq!(context.result(), "cba");
}
