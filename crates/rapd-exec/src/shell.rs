use async_trait::async_trait;
use rapd_core::{AdapterError, LaunchAdapter, LaunchOutcome, LaunchRequest, write_command_file};
use tracing::{debug, info, trace, warn};

use crate::{
    util::{cmd_program, detach, encode, spawn_error},
    workdir::fix_work_dir,
};

/// Starts `<launch_program> -s <site> <command_file>` as a detached local process.
pub struct ShellAdapter {
    req: LaunchRequest,
}

impl ShellAdapter {
    pub fn new(req: LaunchRequest) -> Self {
        Self { req }
    }
}

#[async_trait]
impl LaunchAdapter for ShellAdapter {
    fn name(&self) -> &'static str {
        "shell"
    }

    async fn run(self: Box<Self>) -> Result<LaunchOutcome, AdapterError> {
        let mut command = self.req.command()?;
        let settings = self.req.settings();

        let work = fix_work_dir(&settings.launch_dir, command.directories.work.as_deref())?;
        trace!(target: "rapd.exec.shell", work = %work.display(), "work dir ready");
        command.directories.work = Some(work);

        let command_file = write_command_file(&settings.launch_dir, &command.command, &encode(&command)?)?;

        let program = settings.launch_program.as_str();
        let args = vec![
            "-s".to_string(),
            self.req.site.site_tag().to_string(),
            command_file.display().to_string(),
        ];
        let mut cmd = cmd_program(program, &args);
        detach(&mut cmd);

        let mut child = cmd.spawn().map_err(spawn_error(program))?;
        let pid = child.id();
        info!(target: "rapd.exec.shell", job = %command.command, ?pid, file = %command_file.display(), "launched");

        // Reap only. The job reports its result to the return address itself.
        let job = command.command.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(target: "rapd.exec.shell", %job, "exit success"),
                Ok(status) => warn!(target: "rapd.exec.shell", %job, code = ?status.code(), "exit non-zero"),
                Err(e) => warn!(target: "rapd.exec.shell", %job, error = %e, "wait failed"),
            }
        });

        Ok(LaunchOutcome::Started { command_file, pid })
    }
}
