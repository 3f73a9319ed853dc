//! Child processes for the operator's helper scripts.

use tokio::process::Command;

/// Builds a command for a helper script. On Unix the child gets its own
/// process group, so a Ctrl-C at the terminal reaches only this process and
/// the in-flight call still completes. Dropping the future kills the child.
pub(crate) fn helper_command(program: &str) -> Command {
    let mut command = Command::new(program);
    command.kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}
