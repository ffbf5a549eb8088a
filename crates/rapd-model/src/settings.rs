use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Site definition a launcher or control process is started with.
///
/// Loaded once at process start and shared read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SiteSettings {
    /// Site identity, e.g. `"NECAT_E"`. Also used as the default monitor tag.
    pub id: String,
    #[serde(default)]
    pub launcher: LauncherSettings,
    #[serde(default)]
    pub control: ControlSettings,
    /// Shared store every process of the site talks to, e.g. `redis://control:6379/0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_url: Option<String>,
}

impl SiteSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            launcher: LauncherSettings::default(),
            control: ControlSettings::default(),
            store_url: None,
        }
    }

    /// Read a JSON site file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: SiteSettings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.id.trim().is_empty() {
            return Err(ModelError::InvalidSettings("site id is empty".into()));
        }
        self.launcher.validate()
    }

    /// Site tag used on launch command lines: the explicit launcher tag, else the site id.
    pub fn site_tag(&self) -> &str {
        self.launcher.site_tag.as_deref().unwrap_or(&self.id)
    }
}

/// Options of a single launcher instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    /// Registry key of the launch adapter (`"shell"`, `"qsub"`, `"echo"`).
    pub adapter: String,
    /// Interface the launcher binds to.
    pub listen: String,
    pub port: u16,
    /// Root for command files and job working directories.
    pub launch_dir: PathBuf,
    /// Program that consumes a persisted command file.
    pub launch_program: String,
    /// Overrides the site id on launch command lines.
    pub site_tag: Option<String>,
    /// Interpreter written into wrapper scripts.
    pub script_shell: String,
    pub queue: QueueSettings,
    /// Send echoed commands back to their return address.
    pub echo_reply: bool,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            adapter: "shell".to_string(),
            listen: "0.0.0.0".to_string(),
            port: 50000,
            launch_dir: PathBuf::from("/tmp/rapd/launch"),
            launch_program: "rapd.launch".to_string(),
            site_tag: None,
            script_shell: "/bin/sh".to_string(),
            queue: QueueSettings::default(),
            echo_reply: false,
        }
    }
}

impl LauncherSettings {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.adapter.trim().is_empty() {
            return Err(ModelError::InvalidSettings("launcher adapter is empty".into()));
        }
        if self.launch_dir.as_os_str().is_empty() {
            return Err(ModelError::InvalidSettings("launch_dir is empty".into()));
        }
        if self.launch_program.trim().is_empty() {
            return Err(ModelError::InvalidSettings("launch_program is empty".into()));
        }
        self.queue.validate()
    }

    /// `listen:port`, for binding.
    pub fn bind_authority(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

/// Batch-queue submission options and the job-type decision table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub submit_program: String,
    /// `PATH` exported into the batch job, if the scheduler does not inherit one.
    pub job_path: Option<String>,
    pub rules: Vec<QueueRule>,
    /// Class for job types no rule matches.
    pub fallback: QueueClass,
}

/// Maps one job type to a queue class. Matching ignores ASCII case.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueRule {
    pub job_type: String,
    #[serde(flatten)]
    pub class: QueueClass,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueClass {
    pub queue: String,
    /// Processors requested on a single node.
    pub nproc: u32,
}

impl QueueClass {
    pub fn new(queue: impl Into<String>, nproc: u32) -> Self {
        Self {
            queue: queue.into(),
            nproc,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        let rule = |job_type: &str, queue: &str, nproc| QueueRule {
            job_type: job_type.to_string(),
            class: QueueClass::new(queue, nproc),
        };
        Self {
            submit_program: "qsub".to_string(),
            job_path: None,
            rules: vec![
                rule("AUTO", "phase3.q", 4),
                rule("INDEX", "phase3.q", 4),
                rule("BEAMCENTER", "all.q", 1),
                rule("XDS", "all.q", 1),
            ],
            fallback: QueueClass::new("all.q", 1),
        }
    }
}

impl QueueSettings {
    /// Queue class for a job type.
    pub fn classify(&self, job_type: &str) -> &QueueClass {
        self.rules
            .iter()
            .find(|r| r.job_type.eq_ignore_ascii_case(job_type))
            .map(|r| &r.class)
            .unwrap_or(&self.fallback)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.submit_program.trim().is_empty() {
            return Err(ModelError::InvalidSettings("submit_program is empty".into()));
        }
        let classes = self.rules.iter().map(|r| &r.class).chain(Some(&self.fallback));
        for class in classes {
            if class.nproc == 0 {
                return Err(ModelError::InvalidSettings(format!(
                    "queue {} requests zero processors",
                    class.queue
                )));
            }
        }
        Ok(())
    }
}

/// Where a control process listens for results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub listen: String,
    pub port: u16,
    /// Site tags whose `images_collected` lists are watched.
    pub image_tags: Vec<String>,
    /// Site tags whose `run_data` lists are watched.
    pub run_tags: Vec<String>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".to_string(),
            port: 50001,
            image_tags: Vec::new(),
            run_tags: Vec::new(),
        }
    }
}

impl ControlSettings {
    pub fn bind_authority(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}
