//! Built-in extension-element handlers registered by default

use std::process::Command;
use std::time::Duration;

use crate::handler::{ExtensionCall, ProcessorContext};
use crate::utils::run_bounded;
use crate::{BridgeError, BridgeResult};

const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 60;

/// Handler for `<ext:greet/>`. Emits a greeting into the result tree.
///
/// Reads the destination from the `name` attribute; a blank or absent
/// attribute falls back to a generic recipient.
pub fn greet(context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()> {
    let name = call
        .attribute("name")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("world");
    context.output_to_result_tree(&format!("Hello, {}!", name));
    Ok(())
}

/// Handler for `<ext:exec/>`. Runs an external command with a bounded wait.
///
/// Attributes: `command` (required), `args` (whitespace-separated, optional),
/// `timeout-secs` (optional, default 60). The child is force-killed when the
/// timeout elapses; a non-zero exit status fails the transformation.
pub fn exec(context: &mut ProcessorContext, call: &ExtensionCall) -> BridgeResult<()> {
    let program = call
        .attribute("command")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            BridgeError::Transform("the 'command' attribute is required on exec".to_string())
        })?;

    let timeout_secs = match call.attribute("timeout-secs") {
        Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
            BridgeError::Transform(format!("invalid 'timeout-secs' value: {}", raw))
        })?,
        None => DEFAULT_EXEC_TIMEOUT_SECS,
    };

    let mut command = Command::new(program);
    if let Some(args) = call.attribute("args") {
        command.args(args.split_whitespace());
    }
    command.current_dir(context.base_dir());

    let status = run_bounded(&mut command, Duration::from_secs(timeout_secs))?;
    if !status.success() {
        return Err(BridgeError::Transform(format!(
            "command '{}' exited with status {}",
            program, status
        )));
    }
    Ok(())
}
