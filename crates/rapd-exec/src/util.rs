use std::process::Stdio;

use rapd_core::{AdapterError, WireError};
use rapd_model::JobCommand;
use tokio::process::Command;

pub fn cmd_program(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(|s| s.as_str()));
    cmd.stdin(Stdio::null());
    cmd
}

/// Keep the child out of the launcher's process group so a terminal signal to the
/// launcher does not reach running jobs.
pub fn detach(cmd: &mut Command) {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "unix")] {
            cmd.process_group(0);
        } else if #[cfg(target_family = "windows")] {
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            cmd.creation_flags(DETACHED_PROCESS);
        }
    }
}

pub fn encode(command: &JobCommand) -> Result<Vec<u8>, AdapterError> {
    serde_json::to_vec(command).map_err(|e| AdapterError::Encode(WireError::Encode(e)))
}

pub fn spawn_error(program: &str) -> impl FnOnce(std::io::Error) -> AdapterError + '_ {
    move |source| AdapterError::Spawn {
        program: program.to_string(),
        source,
    }
}
