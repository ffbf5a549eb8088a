use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Environment variable holding an `EnvFilter` directive, e.g. `rapd=debug,info`.
pub const ENV_LOG_LEVEL: &str = "RAPD_LOG";
/// Environment variable selecting the output format.
pub const ENV_LOG_FORMAT: &str = "RAPD_LOG_FORMAT";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Defaults overridden by [`ENV_LOG_LEVEL`] and [`ENV_LOG_FORMAT`] when set.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::default().with_overrides(
            std::env::var(ENV_LOG_LEVEL).ok(),
            std::env::var(ENV_LOG_FORMAT).ok(),
        )
    }

    /// Apply optional level and format strings on top of `self`. Empty strings are ignored.
    pub fn with_overrides(
        mut self,
        level: Option<String>,
        format: Option<String>,
    ) -> Result<Self, LoggerError> {
        if let Some(level) = level.filter(|l| !l.trim().is_empty()) {
            self.level = level;
        }
        if let Some(format) = format.filter(|f| !f.trim().is_empty()) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    /// Raise verbosity to `debug` (or `trace` for `verbose > 1`) unless a filter was given.
    pub fn with_verbosity(mut self, verbose: u8) -> Self {
        if self.level == "info" {
            self.level = match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
            .to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_defaults() {
        let cfg = LoggerConfig::default()
            .with_overrides(Some("rapd=debug".into()), Some("json".into()))
            .unwrap();
        assert_eq!(cfg.level, "rapd=debug");
        assert_eq!(cfg.format, LoggerFormat::Json);
    }

    #[test]
    fn blank_overrides_are_ignored() {
        let cfg = LoggerConfig::default()
            .with_overrides(Some("  ".into()), None)
            .unwrap();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LoggerFormat::Text);
    }

    #[test]
    fn bad_format_override_fails() {
        let res = LoggerConfig::default().with_overrides(None, Some("yaml".into()));
        assert!(res.is_err());
    }

    #[test]
    fn verbosity_only_touches_default_level() {
        assert_eq!(LoggerConfig::default().with_verbosity(1).level, "debug");
        assert_eq!(LoggerConfig::default().with_verbosity(3).level, "trace");

        let explicit = LoggerConfig {
            level: "warn".into(),
            ..Default::default()
        };
        assert_eq!(explicit.with_verbosity(2).level, "warn");
    }
}
