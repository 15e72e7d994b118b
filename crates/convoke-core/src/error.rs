// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Convoke invite engine.
//!
//! [`ConvokeError`] covers failures of the engine and its collaborators.
//! [`DispatchError`] classifies the outcome of a single invite call so the
//! scheduler can decide between retrying and failing the target.

use thiserror::Error;

/// The primary error type used across the engine and collaborator traits.
#[derive(Debug, Error)]
pub enum ConvokeError {
    /// Invalid configuration (bad TOML, out-of-range values, missing group).
    #[error("configuration error: {0}")]
    Config(String),

    /// No roster or session is available to source targets from.
    #[error("target source unavailable: {0}")]
    SourceUnavailable(String),

    /// A target list line could not be parsed and strict parsing is enabled.
    #[error("invalid target list entry on line {line}: `{content}`")]
    InvalidTargetList { line: usize, content: String },

    /// The run was started without an authenticated session.
    #[error("no authenticated session")]
    NotAuthenticated,

    /// The session may not invite into the requested group.
    #[error("not permitted to invite into group: {0}")]
    NotPermitted(String),

    /// A run is already in progress on this controller.
    #[error("an invite run is already in progress")]
    RunInProgress,

    /// The platform client reported an error outside the invite response set.
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvokeError {
    /// Returns true if this error aborts a run before any dispatch begins.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            ConvokeError::SourceUnavailable(_)
                | ConvokeError::InvalidTargetList { .. }
                | ConvokeError::NotAuthenticated
                | ConvokeError::NotPermitted(_)
        )
    }
}

/// Classified failure of a single invite dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The platform throttled the caller.
    #[error("rate limited")]
    RateLimited,

    /// A transient network or server condition.
    #[error("{0}")]
    Transient(String),

    /// The target cannot be invited (not invitable, already in group, blocked).
    #[error("{0}")]
    Permanent(String),
}

impl DispatchError {
    /// Rate limits and transient failures are retried; permanent ones are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DispatchError::RateLimited | DispatchError::Transient(_))
    }

    /// Maps a collaborator error to a dispatch outcome.
    ///
    /// Timeouts are transient. Anything else the platform client reports
    /// outside its response set is treated as permanent.
    pub fn from_platform_error(err: &ConvokeError) -> Self {
        match err {
            ConvokeError::Timeout { .. } => DispatchError::Transient(err.to_string()),
            other => DispatchError::Permanent(other.to_string()),
        }
    }
}
