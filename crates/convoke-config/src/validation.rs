// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive worker counts, finite delays and file-mode prerequisites.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{ConvokeConfig, SourceMode};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound on `run.max_retries`; more retries would hammer the platform.
const MAX_RETRIES_LIMIT: u32 = 10;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ConvokeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.run.workers < 1 {
        errors.push(ConfigError::Validation {
            message: "run.workers must be at least 1".to_string(),
        });
    }

    let delay = config.run.delay_secs;
    if !delay.is_finite() || delay < 0.0 {
        errors.push(ConfigError::Validation {
            message: format!("run.delay_secs must be a non-negative number, got {delay}"),
        });
    }

    if config.run.max_retries > MAX_RETRIES_LIMIT {
        errors.push(ConfigError::Validation {
            message: format!(
                "run.max_retries must be at most {MAX_RETRIES_LIMIT}, got {}",
                config.run.max_retries
            ),
        });
    }

    if config.run.invite_timeout_secs == Some(0) {
        errors.push(ConfigError::Validation {
            message: "run.invite_timeout_secs must be greater than 0 when set".to_string(),
        });
    }

    if let Some(group) = &config.run.group_id
        && group.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "run.group_id must not be empty".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for entry in &config.run.deny_list {
        let key = entry.trim().to_lowercase();
        if key.is_empty() {
            errors.push(ConfigError::Validation {
                message: "run.deny_list must not contain empty entries".to_string(),
            });
        } else if !seen.insert(key) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate entry `{entry}` in run.deny_list"),
            });
        }
    }

    if config.source.mode == SourceMode::File
        && config
            .source
            .user_file
            .as_deref()
            .is_none_or(|p| p.trim().is_empty())
    {
        errors.push(ConfigError::Validation {
            message: "source.user_file is required when source.mode = \"file\"".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = ConvokeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_workers_fails_validation() {
        let mut config = ConvokeConfig::default();
        config.run.workers = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "run.workers"));
    }

    #[test]
    fn negative_delay_fails_validation() {
        let mut config = ConvokeConfig::default();
        config.run.delay_secs = -1.0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "delay_secs"));
    }

    #[test]
    fn file_mode_without_user_file_fails_validation() {
        let mut config = ConvokeConfig::default();
        config.source.mode = SourceMode::File;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "source.user_file"));

        config.source.user_file = Some("users.txt".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn duplicate_deny_entries_are_reported() {
        let mut config = ConvokeConfig::default();
        config.run.deny_list = vec!["bob".to_string(), "BOB".to_string()];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "duplicate entry"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ConvokeConfig::default();
        config.run.workers = 0;
        config.run.max_retries = 50;
        config.run.invite_timeout_secs = Some(0);
        config.logging.level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
