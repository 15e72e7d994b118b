// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Convoke invite engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use convoke_core::{ConvokeError, GroupId, RunConfig};
use serde::{Deserialize, Serialize};

/// Top-level Convoke configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConvokeConfig {
    /// Dispatch settings for invite runs.
    #[serde(default)]
    pub run: RunSettings,

    /// Where invite targets come from.
    #[serde(default)]
    pub source: SourceSettings,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dispatch settings, converted into an engine [`RunConfig`] at run start.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    /// Group to invite into. May also be supplied on the command line.
    #[serde(default)]
    pub group_id: Option<String>,

    /// Seconds each worker waits between its own dispatches.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,

    /// Number of concurrent dispatch workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Retries after a rate-limited or transient failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Upper bound for a single invite call. Unset waits indefinitely.
    #[serde(default)]
    pub invite_timeout_secs: Option<u64>,

    /// Identifiers that are never invited (case-insensitive).
    #[serde(default)]
    pub deny_list: Vec<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            group_id: None,
            delay_secs: default_delay_secs(),
            workers: default_workers(),
            max_retries: default_max_retries(),
            invite_timeout_secs: None,
            deny_list: Vec::new(),
        }
    }
}

fn default_delay_secs() -> f64 {
    5.0
}

fn default_workers() -> usize {
    5
}

fn default_max_retries() -> u32 {
    RunConfig::DEFAULT_MAX_RETRIES
}

impl RunSettings {
    /// Builds the immutable engine config. `group_override` wins over `group_id`.
    pub fn to_run_config(&self, group_override: Option<&str>) -> Result<RunConfig, ConvokeError> {
        let group = group_override
            .or(self.group_id.as_deref())
            .ok_or_else(|| ConvokeError::Config("no group id configured".to_string()))?;

        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            return Err(ConvokeError::Config(format!(
                "run.delay_secs must be a non-negative number, got {}",
                self.delay_secs
            )));
        }

        let config = RunConfig::new(GroupId::new(group))
            .with_delay(Duration::from_secs_f64(self.delay_secs))
            .with_workers(self.workers)
            .with_max_retries(self.max_retries)
            .with_invite_timeout(self.invite_timeout_secs.map(Duration::from_secs))
            .with_denied(&self.deny_list);
        config.validate()?;
        Ok(config)
    }
}

/// Target source selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Usernames imported from a text file.
    File,
    /// Members of the caller's current instance.
    #[default]
    Instance,
}

/// Target source configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    #[serde(default)]
    pub mode: SourceMode,

    /// Path of the target list used in file mode.
    #[serde(default)]
    pub user_file: Option<String>,

    /// Reject malformed target list lines instead of dropping them.
    #[serde(default)]
    pub strict: bool,

    /// Minimum seconds a roster member must have been present to be invited.
    #[serde(default)]
    pub min_presence_secs: u64,
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
