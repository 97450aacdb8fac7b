use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use smallvec::SmallVec;

use crate::error::Error;
use crate::model::channel::StyleChannel;
use crate::scan::PatternKind;

const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

/// On-disk configuration. Every section falls back to the built-in defaults,
/// so a user file only lists what it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    pub styles: StyleConfig,
    pub display: DisplayConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub content_interval_ms: u64,
    pub viewport_interval_ms: u64,
    pub full_document: bool,
    pub patterns: PatternKind,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            content_interval_ms: 500,
            viewport_interval_ms: 285,
            full_document: true,
            patterns: PatternKind::Classic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    pub url_channel: u32,
    pub text_channel: u32,
    pub clear_channels: Vec<u32>,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            url_channel: u32::from(StyleChannel::URL.id()),
            text_channel: u32::from(StyleChannel::URL_TEXT.id()),
            clear_channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// -1 (or any negative value) disables truncation.
    pub ellipsis_length: i64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            ellipsis_length: -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub background: bool,
    pub poll_quantum_ms: u64,
    pub stop_poll_interval_ms: u64,
    pub stop_retries: u32,
    pub stop_grace_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            background: true,
            poll_quantum_ms: 10,
            stop_poll_interval_ms: 100,
            stop_retries: 300,
            stop_grace_ms: 2000,
        }
    }
}

impl EngineConfig {
    /// Load configuration with layering: built-in defaults → user config.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_toml_str(DEFAULT_CONFIG)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "urlmark") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                config = Self::load_from(&config_path)?;
            }
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Checks channel ids and converts the raw numbers into engine settings.
    pub fn settings(&self) -> std::result::Result<EngineSettings, Error> {
        let clear_channels = self
            .styles
            .clear_channels
            .iter()
            .map(|&id| StyleChannel::new(id))
            .collect::<std::result::Result<SmallVec<_>, _>>()?;

        if self.scheduler.poll_quantum_ms == 0 {
            return Err(Error::Config("scheduler.poll_quantum_ms must be positive".into()));
        }

        Ok(EngineSettings {
            content_interval: Duration::from_millis(self.scan.content_interval_ms),
            viewport_interval: Duration::from_millis(self.scan.viewport_interval_ms),
            full_document: self.scan.full_document,
            patterns: self.scan.patterns,
            url_channel: StyleChannel::new(self.styles.url_channel)?,
            text_channel: StyleChannel::new(self.styles.text_channel)?,
            clear_channels,
            display_length: usize::try_from(self.display.ellipsis_length).ok(),
            poll_quantum: Duration::from_millis(self.scheduler.poll_quantum_ms),
            stop_policy: StopPolicy {
                poll_interval: Duration::from_millis(self.scheduler.stop_poll_interval_ms),
                retries: self.scheduler.stop_retries,
                grace: Duration::from_millis(self.scheduler.stop_grace_ms),
            },
        })
    }
}

/// How long a stop request waits for the scan worker to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub poll_interval: Duration,
    pub retries: u32,
    /// Extra wait after the retries run out, before the worker is abandoned.
    pub grace: Duration,
}

impl StopPolicy {
    pub fn budget(&self) -> Duration {
        self.poll_interval * self.retries + self.grace
    }
}

/// Validated, per-engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub content_interval: Duration,
    pub viewport_interval: Duration,
    pub full_document: bool,
    pub patterns: PatternKind,
    pub url_channel: StyleChannel,
    pub text_channel: StyleChannel,
    pub clear_channels: SmallVec<[StyleChannel; 4]>,
    pub display_length: Option<usize>,
    pub poll_quantum: Duration,
    pub stop_policy: StopPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            content_interval: Duration::from_millis(500),
            viewport_interval: Duration::from_millis(285),
            full_document: true,
            patterns: PatternKind::Classic,
            url_channel: StyleChannel::URL,
            text_channel: StyleChannel::URL_TEXT,
            clear_channels: SmallVec::new(),
            display_length: None,
            poll_quantum: Duration::from_millis(10),
            stop_policy: StopPolicy {
                poll_interval: Duration::from_millis(100),
                retries: 300,
                grace: Duration::from_secs(2),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_defaults_match_default_impls() {
        let parsed = EngineConfig::from_toml_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, EngineConfig::default());
        assert_eq!(parsed.settings().unwrap(), EngineSettings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [scan]
            full_document = false
            patterns = "combined"

            [display]
            ellipsis_length = 50
            "#,
        )
        .unwrap();

        let settings = config.settings().unwrap();
        assert!(!settings.full_document);
        assert_eq!(settings.patterns, PatternKind::Combined);
        assert_eq!(settings.display_length, Some(50));
        assert_eq!(settings.content_interval, Duration::from_millis(500));
        assert_eq!(settings.url_channel, StyleChannel::URL);
    }

    #[test]
    fn out_of_range_channel_is_rejected() {
        let config = EngineConfig::from_toml_str("[styles]\nclear_channels = [3, 40]\n").unwrap();
        assert!(matches!(
            config.settings(),
            Err(Error::ChannelOutOfRange(40))
        ));
    }

    #[test]
    fn unknown_pattern_kind_fails_to_parse() {
        assert!(EngineConfig::from_toml_str("[scan]\npatterns = \"fancy\"\n").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\ncontent_interval_ms = 750").unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.scan.content_interval_ms, 750);
        assert_eq!(config.scan.viewport_interval_ms, 285);
    }

    #[test]
    fn stop_budget_adds_grace() {
        let policy = EngineSettings::default().stop_policy;
        assert_eq!(policy.budget(), Duration::from_secs(32));
    }
}
