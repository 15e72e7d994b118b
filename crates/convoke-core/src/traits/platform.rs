// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform client trait for the social platform's official API.

use async_trait::async_trait;

use crate::error::ConvokeError;
use crate::session::SessionHandle;
use crate::types::{GroupExclusions, GroupId, InviteResponse, RosterMember, TargetId};

/// The platform API client the engine dispatches invites through.
///
/// Authentication, HTTP transport and response parsing live behind this
/// trait. An `Err` from [`send_group_invite`](Self::send_group_invite) is
/// treated as a permanent failure unless it is a [`ConvokeError::Timeout`].
#[async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Returns the human-readable name of this client.
    fn name(&self) -> &str;

    /// Sends a group invitation to `target`.
    async fn send_group_invite(
        &self,
        session: &SessionHandle,
        target: &TargetId,
        group: &GroupId,
    ) -> Result<InviteResponse, ConvokeError>;

    /// Returns a snapshot of the members of the caller's current instance.
    async fn list_current_instance_members(
        &self,
        session: &SessionHandle,
    ) -> Result<Vec<RosterMember>, ConvokeError>;

    /// Returns users already in `group` or holding a pending invitation to it.
    ///
    /// Clients that cannot answer this return no exclusions.
    async fn group_exclusions(
        &self,
        _session: &SessionHandle,
        _group: &GroupId,
    ) -> Result<GroupExclusions, ConvokeError> {
        Ok(GroupExclusions::default())
    }

    /// Whether the session's user is a member of `group`.
    ///
    /// Clients that cannot answer this report membership.
    async fn is_group_member(
        &self,
        _session: &SessionHandle,
        _group: &GroupId,
    ) -> Result<bool, ConvokeError> {
        Ok(true)
    }

    /// Identifier of the instance the session's user is currently in, if known.
    async fn current_instance(
        &self,
        _session: &SessionHandle,
    ) -> Result<Option<String>, ConvokeError> {
        Ok(None)
    }
}
