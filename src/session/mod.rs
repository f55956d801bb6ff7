//! Transformation sessions
//!
//! A session drives one transformation end to end: preprocess the stylesheet
//! (generating a dispatch bridge when extension elements are present), resolve
//! foreign implementation references against the effective scope, run the
//! engine, and clean up the preprocessing work directory whether or not the
//! transformation succeeded.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bridge;
use crate::registry::HandlerRegistry;
use crate::resolver::ForeignReferenceTracker;
use crate::scope::LoadingScope;
use crate::BridgeResult;

/// The transformation engine seam.
///
/// The engine receives the effective stylesheet (already rewritten when
/// bridging applied) and the scope its extension calls must resolve against.
#[async_trait]
pub trait TransformEngine: Send + Sync {
    async fn transform(
        &self,
        stylesheet: &Path,
        input: &Path,
        output: &Path,
        scope: &LoadingScope,
    ) -> BridgeResult<()>;
}

/// Outcome of a completed transformation
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// Whether a dispatch bridge was generated for this run
    pub bridged: bool,

    /// Foreign implementations the stylesheet referenced directly, in
    /// first-seen order
    pub resolved_implementations: Vec<String>,
}

/// Drives transformations against a shared registry and ambient scope.
pub struct TransformationSession {
    registry: Arc<HandlerRegistry>,
    ambient: Arc<LoadingScope>,
}

impl TransformationSession {
    /// Create a session over the given registry and ambient scope
    pub fn new(registry: Arc<HandlerRegistry>, ambient: Arc<LoadingScope>) -> Self {
        Self { registry, ambient }
    }

    /// Run one transformation.
    ///
    /// The preprocessing work directory is removed on every exit path,
    /// including engine failures.
    pub async fn run(
        &self,
        engine: &dyn TransformEngine,
        stylesheet: &Path,
        input: &Path,
        output: &Path,
    ) -> BridgeResult<TransformOutcome> {
        let artifact = bridge::preprocess_if_needed(stylesheet, &self.registry, &self.ambient)?;

        let (effective_stylesheet, scope) = match artifact.as_ref() {
            Some(artifact) => {
                info!(
                    "Bridged {} extension entry point(s) for {}",
                    artifact.entry_points().len(),
                    stylesheet.display()
                );
                (artifact.rewritten_script(), artifact.scope())
            }
            None => (stylesheet, &self.ambient),
        };

        let mut tracker = ForeignReferenceTracker::new();
        let result = tracker
            .scan(effective_stylesheet, scope)
            .map(|()| tracker.snapshot());

        let result = match result {
            Ok(resolved) => {
                debug!(
                    "Running transformation: {} -> {}",
                    input.display(),
                    output.display()
                );
                engine
                    .transform(effective_stylesheet, input, output, scope)
                    .await
                    .map(|()| TransformOutcome {
                        bridged: artifact.is_some(),
                        resolved_implementations: resolved,
                    })
            }
            Err(e) => Err(e),
        };

        // Dropping the artifact removes its work directory.
        drop(artifact);
        result
    }
}
