//! Dynamic code-bundle loading
//!
//! A bundle is a dynamic library exporting an ABI-version static and a single
//! registrar function. Loading a bundle never instantiates anything on its
//! own: the bundle's registrar populates a [`BundleRegistrar`] with named
//! implementations, and the library stays mapped for as long as the owning
//! loading scope is alive.

use libloading::Library;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::scope::BundleRegistrar;
use crate::{BridgeError, BridgeResult};

/// ABI version this host expects from bundles
pub const BUNDLE_ABI_VERSION: u32 = 1;

/// Exported static carrying the bundle's ABI version
pub const ABI_VERSION_SYMBOL: &[u8] = b"XSLT_BRIDGE_ABI_VERSION\0";

/// Exported registrar function: `fn(&mut BundleRegistrar)`
pub const REGISTER_SYMBOL: &[u8] = b"xslt_bridge_bundle_register\0";

/// A successfully loaded bundle. Dropping it unmaps the library, so the
/// owning scope must outlive every handler the bundle provided.
pub struct LoadedBundle {
    path: PathBuf,
    _library: Library,
}

impl LoadedBundle {
    /// Resolved path the bundle was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LoadedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBundle")
            .field("path", &self.path)
            .finish()
    }
}

/// Load a bundle and let it register its implementations.
pub fn load_bundle(path: &Path, registrar: &mut BundleRegistrar) -> BridgeResult<LoadedBundle> {
    let fail = |reason: String| BridgeError::BundleLoad {
        path: path.to_path_buf(),
        reason,
    };

    unsafe {
        let library =
            Library::new(path).map_err(|e| fail(format!("failed to load library: {}", e)))?;

        let version = library
            .get::<*const u32>(ABI_VERSION_SYMBOL)
            .map_err(|e| fail(format!("missing ABI version export: {}", e)))?;
        let version = **version;
        if version != BUNDLE_ABI_VERSION {
            return Err(fail(format!(
                "ABI version mismatch: expected {}, found {}",
                BUNDLE_ABI_VERSION, version
            )));
        }

        let register = library
            .get::<fn(&mut BundleRegistrar)>(REGISTER_SYMBOL)
            .map_err(|e| fail(format!("missing registrar export: {}", e)))?;
        register(registrar);

        info!("Loaded code bundle: {}", path.display());
        Ok(LoadedBundle {
            path: path.to_path_buf(),
            _library: library,
        })
    }
}

/// Whether a path looks like a loadable code bundle
pub fn is_bundle_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_bundle_file() {
        assert!(is_bundle_file(Path::new("lib/demo.so")));
        assert!(is_bundle_file(Path::new("demo.dylib")));
        assert!(is_bundle_file(Path::new("demo.dll")));
        assert!(!is_bundle_file(Path::new("demo.jar")));
        assert!(!is_bundle_file(Path::new("demo")));
    }

    #[test]
    fn test_load_bundle_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-library.so");
        std::fs::write(&path, b"plain text").unwrap();

        let mut registrar = BundleRegistrar::new();
        let err = load_bundle(&path, &mut registrar).unwrap_err();
        match err {
            BridgeError::BundleLoad { path: failed, .. } => {
                assert_eq!(failed, path);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
