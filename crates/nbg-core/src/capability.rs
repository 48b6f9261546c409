//! Capability restrictor
//!
//! Turns a session's [`CapabilitySet`] into the launch flags of the spawned
//! runtime. These flags are the only place the toggles are enforced; the
//! spawner appends them after its own base arguments and nothing else may
//! emit them.

use crate::types::CapabilitySet;

/// Flag controlling terminal access in the single-user server
pub const TERMINALS_FLAG: &str = "--ServerApp.terminals_enabled";

/// Flag selecting the landing page of the single-user server
pub const DEFAULT_URL_FLAG: &str = "--SingleUserNotebookApp.default_url";

/// Flag enabling verbose runtime logging
pub const DEBUG_FLAG: &str = "--debug";

/// Build the ordered launch flags for a session's capabilities.
///
/// The terminal flag is always emitted so that a runtime whose own default
/// differs cannot re-enable terminals.
pub fn build_launch_args(capabilities: &CapabilitySet) -> Vec<String> {
    let mut args = Vec::with_capacity(3);

    args.push(format!(
        "{}={}",
        TERMINALS_FLAG,
        python_bool(capabilities.terminals_enabled)
    ));

    if let Some(url) = capabilities.default_url.as_deref().filter(|u| !u.is_empty()) {
        args.push(format!("{}={}", DEFAULT_URL_FLAG, url));
    }

    if capabilities.debug {
        args.push(DEBUG_FLAG.to_string());
    }

    args
}

/// Whether `arg` sets one of the toggles owned by [`build_launch_args`]
pub fn is_capability_flag(arg: &str) -> bool {
    [TERMINALS_FLAG, DEFAULT_URL_FLAG, DEBUG_FLAG]
        .iter()
        .any(|flag| match arg.strip_prefix(flag) {
            Some(rest) => rest.is_empty() || rest.starts_with('='),
            None => false,
        })
}

fn python_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
