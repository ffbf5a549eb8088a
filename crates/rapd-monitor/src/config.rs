use std::time::Duration;

use crate::MonitorError;

/// What a monitor watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// `images_collected:<TAG>` lists of image paths; tags are upper-cased.
    Image,
    /// `run_data:<tag>` lists of JSON run descriptions; tags are lower-cased.
    Run,
}

impl MonitorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorKind::Image => "image",
            MonitorKind::Run => "run",
        }
    }

    pub fn normalize_tag(&self, tag: &str) -> String {
        match self {
            MonitorKind::Image => tag.to_uppercase(),
            MonitorKind::Run => tag.to_lowercase(),
        }
    }

    /// Store key of the list for an already normalized tag.
    pub fn list_key(&self, tag: &str) -> String {
        match self {
            MonitorKind::Image => format!("images_collected:{tag}"),
            MonitorKind::Run => format!("run_data:{tag}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub kind: MonitorKind,
    /// Site tags, normalized for `kind` on construction.
    pub tags: Vec<String>,
    /// Rest after every pop, hit or miss.
    pub poll_interval: Duration,
    /// Polling rounds between overwatch updates.
    pub update_every: u32,
    /// Drop whatever is queued before the first poll.
    pub clean_start: bool,
}

impl MonitorConfig {
    pub fn new<I, S>(kind: MonitorKind, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kind,
            tags: tags.into_iter().map(|t| kind.normalize_tag(t.as_ref())).collect(),
            poll_interval: Duration::from_millis(100),
            update_every: 50,
            clean_start: false,
        }
    }

    pub fn image<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(MonitorKind::Image, tags)
    }

    pub fn run<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(MonitorKind::Run, tags)
    }

    pub fn with_clean_start(mut self, clean_start: bool) -> Self {
        self.clean_start = clean_start;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.tags.iter().all(|t| t.trim().is_empty()) {
            return Err(MonitorError::NoTags);
        }
        Ok(())
    }
}
