//! Reference code-bundle exports
//!
//! The crate builds as a cdylib as well as a library; these exports make the
//! cdylib itself loadable as a code bundle. The registered implementation
//! serves as a template for out-of-tree bundles and as the fixture for
//! bundle-loading tests.

use std::sync::Arc;

use crate::handler::{ExtensionCall, ProcessorContext};
use crate::plugin::bundle::BUNDLE_ABI_VERSION;
use crate::scope::BundleRegistrar;

/// Implementation name the sample bundle registers
pub const SAMPLE_BUNDLE_IMPL: &str = "app.sample.Reverse";

#[no_mangle]
pub static XSLT_BRIDGE_ABI_VERSION: u32 = BUNDLE_ABI_VERSION;

/// Registrar entry point invoked by the bundle loader.
///
/// Registers a single implementation satisfying the handler convention
/// directly: it reverses the `text` attribute into the result tree.
#[no_mangle]
pub fn xslt_bridge_bundle_register(registrar: &mut BundleRegistrar) {
    registrar.provide_handler(
        SAMPLE_BUNDLE_IMPL,
        Arc::new(|context: &mut ProcessorContext, call: &ExtensionCall| {
            let text = call.attribute("text").unwrap_or_default();
            context.output_to_result_tree(&text.chars().rev().collect::<String>());
            Ok(())
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::ExtensionHandler;
    use crate::scope::DEFAULT_ENTRY_POINT;

    #[test]
    fn test_abi_version_export_matches_loader_expectation() {
        assert_eq!(XSLT_BRIDGE_ABI_VERSION, BUNDLE_ABI_VERSION);
    }

    #[test]
    fn test_registrar_entry_point_registers_sample() {
        let mut registrar = BundleRegistrar::new();
        xslt_bridge_bundle_register(&mut registrar);

        let bindings = registrar.into_bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].name(), SAMPLE_BUNDLE_IMPL);
        assert!(bindings[0].has_default_entry_point());

        let handler = bindings[0].entry_point(DEFAULT_ENTRY_POINT).unwrap();
        let mut context = ProcessorContext::new(".");
        handler
            .invoke(
                &mut context,
                &ExtensionCall::new("reverse").with_attribute("text", "stressed"),
            )
            .unwrap();
        assert_eq!(context.result(), "desserts");
    }
}
