use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rapd")]
#[command(version)]
#[command(about = "Launch and dispatch RAPD jobs")]
#[command(propagate_version = true)]
pub struct Args {
    /// Log filter, e.g. "info" or "rapd.net=debug" (overrides RAPD_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: text, json or journald (overrides RAPD_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// More output; repeat for trace
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Receive jobs and launch them with the site's adapter
    Launcher(LauncherArgs),

    /// Receive results and log them
    Control(ControlArgs),

    /// Send a job file to a launcher
    Send(SendArgs),
}

#[derive(Parser, Debug)]
pub struct LauncherArgs {
    /// Site settings file (JSON)
    #[arg(long, short = 's')]
    pub site: PathBuf,

    /// Port to listen on instead of the site's launcher port
    #[arg(long)]
    pub port: Option<u16>,

    /// Adapter to use instead of the site's, e.g. "echo"
    #[arg(long)]
    pub adapter: Option<String>,

    #[command(flatten)]
    pub store: StoreArgs,
}

/// Shared-store options common to long-running commands.
#[derive(clap::Args, Debug, Default)]
pub struct StoreArgs {
    /// Shared store URL instead of the site's, e.g. redis://127.0.0.1:6379/0
    #[arg(long = "store")]
    pub url: Option<String>,

    /// Register under this overwatch id and keep the entry alive (needs a store)
    #[arg(long)]
    pub overwatch_id: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ControlArgs {
    /// Site settings file (JSON)
    #[arg(long, short = 's')]
    pub site: PathBuf,

    /// Port to listen on instead of the site's control port
    #[arg(long)]
    pub port: Option<u16>,

    /// Also print every received message to stdout, one JSON document per line
    #[arg(long)]
    pub print: bool,

    /// Watch images_collected:<TAG> in addition to the site's image tags (repeatable)
    #[arg(long = "image-tag")]
    pub image_tags: Vec<String>,

    /// Watch run_data:<tag> in addition to the site's run tags (repeatable)
    #[arg(long = "run-tag")]
    pub run_tags: Vec<String>,

    /// Drop queued announcements before monitoring starts
    #[arg(long)]
    pub clean_start: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Job command file (JSON object or five-element array)
    pub file: PathBuf,

    /// Launcher host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Launcher port
    #[arg(long, short = 'p', default_value = "50000")]
    pub port: u16,

    /// Connect attempts before giving up
    #[arg(long, default_value = "10")]
    pub attempts: u32,

    /// Pause between connect attempts, in milliseconds
    #[arg(long, default_value = "1000")]
    pub delay_ms: u64,
}
