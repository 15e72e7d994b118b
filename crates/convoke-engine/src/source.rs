// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Target source: turns an imported list or a live roster into an ordered,
//! deduplicated sequence of invite targets.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use convoke_core::{ConvokeError, InviteTarget, PlatformClient, RosterMember, SessionHandle};
use tracing::{debug, info};

/// Where a run's targets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRequest {
    /// A plain-text list, one username per line.
    File { payload: String },
    /// A snapshot of the caller's current instance.
    Instance,
}

impl TargetRequest {
    /// Reads a target list from disk. Parsing happens when the run starts.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConvokeError> {
        let path = path.as_ref();
        let payload = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConvokeError::SourceUnavailable(format!(
                "cannot read target list {}: {e}",
                path.display()
            ))
        })?;
        Ok(TargetRequest::File { payload })
    }

    pub fn mode(&self) -> &'static str {
        match self {
            TargetRequest::File { .. } => "file",
            TargetRequest::Instance => "instance",
        }
    }
}

/// Sourcing behaviour that outlives a single run.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Fail on the first malformed line instead of dropping it.
    pub strict: bool,
    /// Minimum time a roster member must have been in the instance.
    pub min_presence: Duration,
}

/// Produces targets for a run.
#[derive(Debug, Clone, Default)]
pub struct TargetSource {
    options: SourceOptions,
}

impl TargetSource {
    pub fn new(options: SourceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    /// Lists the targets for `request`, in source order, without duplicates.
    ///
    /// Instance mode queries the roster exactly once and fails with
    /// [`ConvokeError::SourceUnavailable`] when there is no session.
    pub async fn list_targets(
        &self,
        request: &TargetRequest,
        session: Option<&SessionHandle>,
        platform: &dyn PlatformClient,
    ) -> Result<Vec<InviteTarget>, ConvokeError> {
        let targets = match request {
            TargetRequest::File { payload } => parse_target_list(payload, self.options.strict)?,
            TargetRequest::Instance => {
                let session = session.ok_or_else(|| {
                    ConvokeError::SourceUnavailable(
                        "instance mode requires an active session".into(),
                    )
                })?;
                let roster = platform
                    .list_current_instance_members(session)
                    .await
                    .map_err(|e| ConvokeError::SourceUnavailable(e.to_string()))?;
                self.roster_targets(roster)
            }
        };

        info!(mode = request.mode(), count = targets.len(), "targets sourced");
        Ok(targets)
    }

    fn roster_targets(&self, roster: Vec<RosterMember>) -> Vec<InviteTarget> {
        let now = Utc::now();
        let min_presence = self.options.min_presence;

        let present = roster.into_iter().filter(|member| {
            if !is_valid_identifier(&member.id) {
                debug!(member = %member.id, "roster entry without a usable id dropped");
                return false;
            }
            if min_presence.is_zero() {
                return true;
            }
            let Some(joined) = member.joined_at else {
                return true;
            };
            let long_enough = now
                .signed_duration_since(joined)
                .to_std()
                .is_ok_and(|presence| presence >= min_presence);
            if !long_enough {
                debug!(member = %member.id, "roster member below minimum presence");
            }
            long_enough
        });

        dedup_targets(present.map(InviteTarget::from))
    }
}

/// Parses a plain-text target list.
///
/// Lines are trimmed; blank lines and `#` comments are ignored. A line that
/// is not a single identifier is dropped, or rejected when `strict` is set.
/// Identifiers are deduplicated case-insensitively, keeping the first
/// occurrence.
pub fn parse_target_list(payload: &str, strict: bool) -> Result<Vec<InviteTarget>, ConvokeError> {
    let mut targets = Vec::new();

    for (index, raw) in payload.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !is_valid_identifier(line) {
            if strict {
                return Err(ConvokeError::InvalidTargetList {
                    line: index + 1,
                    content: line.to_string(),
                });
            }
            debug!(line = index + 1, "malformed target line dropped");
            continue;
        }
        targets.push(InviteTarget::new(line, line));
    }

    Ok(dedup_targets(targets))
}

/// Removes case-insensitive duplicates, keeping first occurrences in order.
pub fn dedup_targets<I>(targets: I) -> Vec<InviteTarget>
where
    I: IntoIterator<Item = InviteTarget>,
{
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert(t.id.key()))
        .collect()
}

fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.trim() == s
        && !s.chars().any(|c| c.is_whitespace() || c.is_control())
}
