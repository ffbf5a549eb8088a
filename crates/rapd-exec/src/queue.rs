use std::path::Path;

use async_trait::async_trait;
use rapd_core::{
    AdapterError, COMMAND_SUFFIX, LaunchAdapter, LaunchOutcome, LaunchRequest,
    write_command_file, write_command_script,
};
use rapd_model::{JobCommand, QueueClass, QueueSettings, SiteSettings};
use tracing::{debug, info};

use crate::{
    echo::EchoAdapter,
    util::{cmd_program, encode, spawn_error},
    workdir::fix_work_dir,
};

/// Subdirectory of the launch directory that holds command files and wrapper scripts.
pub const COMMAND_FILES_DIR: &str = "command_files";

/// Submits jobs to a PBS-style batch scheduler.
///
/// The queue and processor count come from the job type through the site's decision table.
/// Only the submission is awaited; a job that is queued counts as launched.
pub struct QueueAdapter {
    req: LaunchRequest,
}

impl QueueAdapter {
    pub fn new(req: LaunchRequest) -> Self {
        Self { req }
    }
}

#[async_trait]
impl LaunchAdapter for QueueAdapter {
    fn name(&self) -> &'static str {
        "qsub"
    }

    async fn run(self: Box<Self>) -> Result<LaunchOutcome, AdapterError> {
        let mut command = self.req.command()?;
        if command.is_echo() {
            debug!(target: "rapd.exec.qsub", "echo job; not submitting");
            return Box::new(EchoAdapter::new(self.req)).run().await;
        }
        let settings = self.req.settings();

        let launch_dir = command
            .directories
            .launch_dir
            .clone()
            .unwrap_or_else(|| settings.launch_dir.clone());
        let work = fix_work_dir(&launch_dir, command.directories.work.as_deref())?;
        command.directories.work = Some(work.clone());

        let command_file = write_command_file(
            &launch_dir.join(COMMAND_FILES_DIR),
            &command.command,
            &encode(&command)?,
        )?;
        let job_name = job_name(&command_file);

        let command_line = format!(
            "{} -vs {} {}",
            settings.launch_program,
            job_site_tag(&command, &self.req.site),
            command_file.display()
        );
        let script = command_file.with_extension("sh");
        write_command_script(&script, &command_line, &settings.script_shell)?;

        let class = settings.queue.classify(&command.command).clone();
        let args = submit_args(&settings.queue, &work, &job_name, &class, &script);
        let program = settings.queue.submit_program.as_str();
        debug!(target: "rapd.exec.qsub", %program, ?args, "submitting");

        let status = cmd_program(program, &args)
            .current_dir(&work)
            .status()
            .await
            .map_err(spawn_error(program))?;
        if !status.success() {
            return Err(AdapterError::Submit {
                program: program.to_string(),
                code: status.code(),
            });
        }

        info!(
            target: "rapd.exec.qsub",
            job = %command.command,
            %job_name,
            queue = %class.queue,
            nproc = class.nproc,
            "submitted"
        );
        Ok(LaunchOutcome::Submitted {
            command_file,
            job_name,
            queue: class.queue,
            nproc: class.nproc,
        })
    }
}

/// Scheduler job name: the command file's base name without its suffix.
fn job_name(command_file: &Path) -> String {
    let name = command_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(COMMAND_SUFFIX).map(str::to_string).unwrap_or(name)
}

/// Site tag for `rapd.launch`: the job's own tag, else the launcher's, up to the first `_`.
fn job_site_tag(command: &JobCommand, site: &SiteSettings) -> String {
    let tag = command
        .site_tag()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| site.site_tag());
    tag.split('_').next().unwrap_or(tag).to_string()
}

fn submit_args(
    queue: &QueueSettings,
    work: &Path,
    job_name: &str,
    class: &QueueClass,
    script: &Path,
) -> Vec<String> {
    let path_export = match &queue.job_path {
        Some(path) => format!("PATH={path}"),
        None => "PATH".to_string(),
    };
    vec![
        "-d".to_string(),
        work.display().to_string(),
        "-v".to_string(),
        path_export,
        "-N".to_string(),
        job_name.to_string(),
        "-q".to_string(),
        class.queue.clone(),
        "-l".to_string(),
        format!("nodes=1:ppn={}", class.nproc),
        script.display().to_string(),
    ]
}
