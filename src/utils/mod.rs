//! Utility functions shared across the bridging subsystem

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::{BridgeError, BridgeResult};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run an external command with a bounded wait.
///
/// The child is force-killed once `timeout` elapses; the exit status of a
/// finished child is surfaced to the caller unchanged. Timeouts are reported
/// through the transformation error channel so they propagate verbatim out of
/// handler dispatch.
pub fn run_bounded(command: &mut Command, timeout: Duration) -> BridgeResult<ExitStatus> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command.spawn().map_err(|e| {
        BridgeError::Transform(format!("failed to start command '{}': {}", program, e))
    })?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            warn!(
                "Command '{}' exceeded timeout of {:?}, terminating",
                program, timeout
            );
            let _ = child.kill();
            let _ = child.wait();
            return Err(BridgeError::Transform(format!(
                "command '{}' did not finish within {} seconds and was terminated",
                program,
                timeout.as_secs()
            )));
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
}

/// Resolve a possibly-relative path against a base directory
pub fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(raw.trim());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(base) => base.join(path),
        None => path,
    }
}

/// Resolve a bundle reference: a bare file name prefers the bundle directory,
/// everything else resolves against the manifest's base directory
pub fn resolve_bundle_path(
    raw: &str,
    bundle_dir: Option<&Path>,
    base_dir: Option<&Path>,
) -> PathBuf {
    let path = PathBuf::from(raw.trim());
    if path.is_absolute() {
        return path;
    }
    if let Some(dir) = bundle_dir {
        if path.components().count() == 1 {
            return dir.join(path);
        }
    }
    resolve_path(raw, base_dir)
}

/// First non-blank value among the given candidates, trimmed
pub fn first_non_blank<'a, I>(values: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    values
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}
