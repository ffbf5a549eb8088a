mod cli;
mod control;
mod services;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rapd_exec::{Launcher, default_registry};
use rapd_model::{Address, JobCommand, SiteSettings};
use rapd_net::{ControlServer, LaunchAction, RetryPolicy, ServerConfig};
use rapd_observe::{LoggerConfig, logger_init};
use tracing::info;

use crate::cli::{Args, Commands, ControlArgs, LauncherArgs, SendArgs};
use crate::control::ResultLog;
use crate::services::{MonitorPlan, open_store, require_store};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // The local UTC offset can only be read while the process is single-threaded,
    // so the logger goes up before the runtime does.
    let log_cfg = LoggerConfig::from_env()?
        .with_overrides(args.log_level.clone(), args.log_format.clone())?
        .with_verbosity(args.verbose);
    logger_init(&log_cfg)?;
    rapd_core::mark_started();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async move {
        match args.command {
            Commands::Launcher(cmd) => run_launcher(cmd).await,
            Commands::Control(cmd) => run_control(cmd).await,
            Commands::Send(cmd) => run_send(cmd).await,
        }
    })
}

fn load_site(path: &std::path::Path) -> anyhow::Result<SiteSettings> {
    SiteSettings::from_file(path).with_context(|| format!("failed to load site settings from {}", path.display()))
}

async fn run_launcher(cmd: LauncherArgs) -> anyhow::Result<()> {
    let mut site = load_site(&cmd.site)?;
    if let Some(port) = cmd.port {
        site.launcher.port = port;
    }
    if let Some(adapter) = cmd.adapter {
        site.launcher.adapter = adapter;
    }
    site.validate()?;

    let store = open_store(cmd.store.url.as_deref().or(site.store_url.as_deref())).await?;
    let site = Arc::new(site);
    let launcher = Launcher::new(site.clone(), &default_registry())?;
    let token = shutdown::install_shutdown_handler()?;
    let server = ControlServer::bind(&site.launcher.bind_authority(), ServerConfig::default()).await?;

    let overwatch = match &cmd.store.overwatch_id {
        Some(ow_id) => {
            let store = require_store(store.as_ref(), "--overwatch-id")?;
            Some(services::start_overwatch(store, "launcher", ow_id, &site.id, token.clone())?)
        }
        None => None,
    };

    let handle = server.spawn(Arc::new(launcher), token)?;
    info!(
        target: "rapd",
        site = %site.id,
        adapter = %site.launcher.adapter,
        addr = %handle.local_addr(),
        overwatch = ?overwatch.as_ref().map(|ow| ow.registrar.id()),
        "launcher ready"
    );

    handle.join().await?;
    if let Some(overwatch) = overwatch {
        overwatch.task.await?;
    }
    info!(target: "rapd", "launcher stopped");
    Ok(())
}

async fn run_control(cmd: ControlArgs) -> anyhow::Result<()> {
    let mut site = load_site(&cmd.site)?;
    if let Some(port) = cmd.port {
        site.control.port = port;
    }

    let plan = MonitorPlan {
        image_tags: site.control.image_tags.iter().chain(&cmd.image_tags).cloned().collect(),
        run_tags: site.control.run_tags.iter().chain(&cmd.run_tags).cloned().collect(),
        clean_start: cmd.clean_start,
        ow_id: cmd.store.overwatch_id.clone(),
    };

    let store = open_store(cmd.store.url.as_deref().or(site.store_url.as_deref())).await?;
    let log = Arc::new(ResultLog::new(cmd.print));
    let token = shutdown::install_shutdown_handler()?;
    let server = ControlServer::bind(&site.control.bind_authority(), ServerConfig::default()).await?;

    let overwatch = match &cmd.store.overwatch_id {
        Some(ow_id) => {
            let store = require_store(store.as_ref(), "--overwatch-id")?;
            Some(services::start_overwatch(store, "control", ow_id, &site.id, token.clone())?)
        }
        None => None,
    };
    let monitors = if plan.is_empty() {
        Vec::new()
    } else {
        let store = require_store(store.as_ref(), "monitoring")?;
        services::start_monitors(store, &plan, log.clone(), token.clone())?
    };

    let handle = server.spawn(log, token)?;
    info!(
        target: "rapd",
        site = %site.id,
        addr = %handle.local_addr(),
        monitors = monitors.len(),
        "control ready"
    );

    handle.join().await?;
    services::join_monitors(monitors).await;
    if let Some(overwatch) = overwatch {
        overwatch.task.await?;
    }
    info!(target: "rapd", "control stopped");
    Ok(())
}

async fn run_send(cmd: SendArgs) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(&cmd.file)
        .await
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    let job = JobCommand::from_json(&text)?;

    let target = Address::new(cmd.host, cmd.port);
    let policy = RetryPolicy::new(cmd.attempts, Duration::from_millis(cmd.delay_ms));
    let sent = LaunchAction::new(target.clone(), &job)?.with_policy(policy).send().await?;

    info!(target: "rapd", peer = %target.authority(), command = %job.command, bytes = sent, "job sent");
    Ok(())
}
