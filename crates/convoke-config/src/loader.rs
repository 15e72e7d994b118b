// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./convoke.toml` > `~/.config/convoke/convoke.toml` >
//! `/etc/convoke/convoke.toml` with environment variable overrides via `CONVOKE_` prefix.

// figment::Error is external and cannot be boxed without a wrapper.
#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use tracing::debug;

use crate::model::ConvokeConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/convoke/convoke.toml";
pub(crate) const LOCAL_CONFIG: &str = "convoke.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("convoke/convoke.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/convoke/convoke.toml` (system-wide)
/// 3. `~/.config/convoke/convoke.toml` (user XDG config)
/// 4. `./convoke.toml` (local directory)
/// 5. `CONVOKE_*` environment variables
pub fn load_config() -> Result<ConvokeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ConvokeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvokeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ConvokeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ConvokeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    let files = [
        PathBuf::from(SYSTEM_CONFIG),
        user_config_path().unwrap_or_default(),
        PathBuf::from(LOCAL_CONFIG),
    ];

    let mut figment = Figment::new().merge(Serialized::defaults(ConvokeConfig::default()));
    for path in files {
        debug!(path = %path.display(), present = path.is_file(), "config file considered");
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Environment variable provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `CONVOKE_RUN_GROUP_ID` must map to `run.group_id`, not
/// `run.group.id`.
fn env_provider() -> Env {
    Env::prefixed("CONVOKE_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("run_", "run.", 1)
            .replacen("source_", "source.", 1)
            .replacen("logging_", "logging.", 1);
        mapped.into()
    })
}
