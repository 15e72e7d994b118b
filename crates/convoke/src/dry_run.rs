// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dry-run platform client.
//!
//! Stands in for the real platform API: every invite succeeds after an
//! optional simulated latency and is logged instead of sent. The instance
//! roster is read from a JSON file (an array of `{id, display_name,
//! joined_at?}` objects).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use convoke_core::{
    ConvokeError, GroupId, InviteResponse, PlatformClient, RosterMember, SessionHandle, TargetId,
};
use tracing::info;

#[derive(Debug, Default)]
pub struct DryRunPlatform {
    roster: Option<Vec<RosterMember>>,
    latency: Duration,
}

impl DryRunPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_roster(mut self, roster: Vec<RosterMember>) -> Self {
        self.roster = Some(roster);
        self
    }

    /// Loads the roster from a JSON file.
    pub async fn load_roster(self, path: &Path) -> Result<Self, ConvokeError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConvokeError::SourceUnavailable(format!("cannot read roster {}: {e}", path.display()))
        })?;
        let roster = parse_roster(&raw)?;
        Ok(self.with_roster(roster))
    }
}

pub fn parse_roster(raw: &str) -> Result<Vec<RosterMember>, ConvokeError> {
    serde_json::from_str(raw)
        .map_err(|e| ConvokeError::SourceUnavailable(format!("invalid roster JSON: {e}")))
}

#[async_trait]
impl PlatformClient for DryRunPlatform {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn send_group_invite(
        &self,
        session: &SessionHandle,
        target: &TargetId,
        group: &GroupId,
    ) -> Result<InviteResponse, ConvokeError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        info!(
            from = %session.user_id(),
            target_id = %target,
            group = %group,
            "dry run: invite not sent"
        );
        Ok(InviteResponse::Success)
    }

    async fn list_current_instance_members(
        &self,
        _session: &SessionHandle,
    ) -> Result<Vec<RosterMember>, ConvokeError> {
        self.roster.clone().ok_or_else(|| {
            ConvokeError::SourceUnavailable("no roster loaded; pass --roster <json>".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn session() -> SessionHandle {
        SessionHandle::new("usr_local", "Local", SecretString::from(String::new()))
    }

    #[test]
    fn parses_roster_with_optional_join_time() {
        let roster = parse_roster(
            r#"[
                {"id": "usr_1", "display_name": "Alice", "joined_at": "2026-01-01T12:00:00Z"},
                {"id": "usr_2", "display_name": "Bob"}
            ]"#,
        )
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster[0].joined_at.is_some());
        assert!(roster[1].joined_at.is_none());
    }

    #[test]
    fn rejects_malformed_roster() {
        let err = parse_roster("{not json").unwrap_err();
        assert!(matches!(err, ConvokeError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn invites_always_succeed() {
        let platform = DryRunPlatform::new();
        let response = platform
            .send_group_invite(&session(), &TargetId::new("usr_1"), &GroupId::new("grp"))
            .await
            .unwrap();
        assert_eq!(response, InviteResponse::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_each_invite() {
        let platform = DryRunPlatform::new().with_latency(Duration::from_millis(250));
        let start = tokio::time::Instant::now();
        platform
            .send_group_invite(&session(), &TargetId::new("usr_1"), &GroupId::new("grp"))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn missing_roster_is_unavailable() {
        let err = DryRunPlatform::new()
            .list_current_instance_members(&session())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--roster"));
    }
}
