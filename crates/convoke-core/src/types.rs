// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the target source, scheduler and run controller.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ConvokeError, DispatchError};

/// Stable platform identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded key used for deduplication and deny-list matching.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the group invitations are sent for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `instance` is an instance hosted by this group.
    ///
    /// Group instances are named `grp_<group>` optionally followed by
    /// `~`-separated modifiers. The group part may carry its own `grp_`
    /// prefix.
    pub fn hosts_instance(&self, instance: &str) -> bool {
        let Some(owner) = instance.split('~').next().and_then(|head| head.strip_prefix("grp_"))
        else {
            return false;
        };
        let group = self.0.trim();
        !owner.is_empty() && (owner == group || group.strip_prefix("grp_") == Some(owner))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A platform user considered for an invitation.
///
/// Equality and hashing use the identifier only; the display name is
/// informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteTarget {
    pub id: TargetId,
    pub display_name: String,
}

impl InviteTarget {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(id),
            display_name: display_name.into(),
        }
    }
}

impl PartialEq for InviteTarget {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InviteTarget {}

impl Hash for InviteTarget {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Per-target invite state within a run.
///
/// States only move forward: `NotAttempted -> Pending -> {Sent, Failed}` or
/// `NotAttempted -> Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum InviteStatus {
    NotAttempted,
    Pending,
    Sent,
    Failed(String),
    Skipped(String),
}

impl InviteStatus {
    /// Returns true for `Sent`, `Failed` and `Skipped`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InviteStatus::Sent | InviteStatus::Failed(_) | InviteStatus::Skipped(_)
        )
    }

    /// Ordering rank used to reject backwards transitions.
    pub fn rank(&self) -> u8 {
        match self {
            InviteStatus::NotAttempted => 0,
            InviteStatus::Pending => 1,
            InviteStatus::Sent | InviteStatus::Failed(_) | InviteStatus::Skipped(_) => 2,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            InviteStatus::Failed(r) | InviteStatus::Skipped(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InviteStatus::NotAttempted => write!(f, "not-attempted"),
            InviteStatus::Pending => write!(f, "pending"),
            InviteStatus::Sent => write!(f, "sent"),
            InviteStatus::Failed(reason) => write!(f, "failed ({reason})"),
            InviteStatus::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Lifecycle status of a run controller.
///
/// `Idle -> Running -> {Completed, Cancelled, Aborted}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Aborted
        )
    }
}

/// Immutable settings for one invite run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Group invitations are sent for.
    pub group: GroupId,
    /// Wait between successive dispatches of the same worker, and before each retry.
    pub delay: Duration,
    /// Maximum number of concurrent invite calls.
    pub workers: usize,
    /// Case-folded identifiers that must never be invited.
    pub deny_list: HashSet<String>,
    /// Additional attempts after a recoverable failure.
    pub max_retries: u32,
    /// Upper bound on a single invite call; `None` waits indefinitely.
    pub invite_timeout: Option<Duration>,
}

impl RunConfig {
    /// Default number of retries after a recoverable failure.
    pub const DEFAULT_MAX_RETRIES: u32 = 2;

    pub fn new(group: GroupId) -> Self {
        Self {
            group,
            delay: Duration::ZERO,
            workers: 1,
            deny_list: HashSet::new(),
            max_retries: Self::DEFAULT_MAX_RETRIES,
            invite_timeout: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_invite_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.invite_timeout = timeout;
        self
    }

    pub fn with_denied<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deny_list
            .extend(ids.into_iter().map(|s| s.as_ref().trim().to_lowercase()));
        self
    }

    pub fn is_denied(&self, id: &TargetId) -> bool {
        self.deny_list.contains(&id.key())
    }

    /// Checks the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConvokeError> {
        if self.group.as_str().trim().is_empty() {
            return Err(ConvokeError::Config("group id must not be empty".into()));
        }
        if self.workers == 0 {
            return Err(ConvokeError::Config(
                "worker count must be at least 1".into(),
            ));
        }
        if self.invite_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConvokeError::Config(
                "invite timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// A member of the caller's current instance, as reported by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterMember {
    pub id: String,
    pub display_name: String,
    /// When the member joined the instance, if known.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

impl From<RosterMember> for InviteTarget {
    fn from(member: RosterMember) -> Self {
        InviteTarget::new(member.id, member.display_name)
    }
}

/// Users that must not be invited because the platform already knows them.
#[derive(Debug, Clone, Default)]
pub struct GroupExclusions {
    pub members: HashSet<TargetId>,
    pub pending_invites: HashSet<TargetId>,
}

/// Response of the platform's group invite call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteResponse {
    Success,
    RateLimited,
    Transient(String),
    Permanent(String),
}

impl InviteResponse {
    pub fn into_result(self) -> Result<(), DispatchError> {
        match self {
            InviteResponse::Success => Ok(()),
            InviteResponse::RateLimited => Err(DispatchError::RateLimited),
            InviteResponse::Transient(reason) => Err(DispatchError::Transient(reason)),
            InviteResponse::Permanent(reason) => Err(DispatchError::Permanent(reason)),
        }
    }
}
