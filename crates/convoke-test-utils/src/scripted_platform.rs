// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted platform client for deterministic testing.
//!
//! Replies are popped from a per-target FIFO queue. When a target's queue is
//! empty the invite succeeds. Every call is recorded, and concurrent calls
//! are tracked so tests can assert the worker bound and the
//! one-attempt-per-target rule.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use convoke_core::{
    ConvokeError, GroupExclusions, GroupId, InviteResponse, PlatformClient, RosterMember,
    SessionHandle, TargetId,
};

/// One scripted reaction to an invite call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(InviteResponse),
    /// Fail with a [`ConvokeError::Platform`] outside the response set.
    Error(String),
    /// Never complete. Pair with an invite timeout.
    Hang,
    /// Panic inside the call.
    Panic(String),
}

/// A platform client whose behaviour is fixed up front.
#[derive(Default)]
pub struct ScriptedPlatform {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    latency: Duration,
    roster: Vec<RosterMember>,
    roster_error: Option<String>,
    roster_delay: Duration,
    not_member: bool,
    instance: Option<String>,
    exclusions: GroupExclusions,
    exclusions_error: bool,
    calls: Mutex<Vec<TargetId>>,
    roster_calls: AtomicUsize,
    in_flight: Mutex<HashMap<String, usize>>,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    overlap: AtomicBool,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every invite call before it replies.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue responses for `id`, consumed one per call.
    pub fn script<I>(self, id: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = InviteResponse>,
    {
        responses
            .into_iter()
            .fold(self, |platform, r| platform.script_reply(id, ScriptedReply::Respond(r)))
    }

    pub fn script_reply(self, id: &str, reply: ScriptedReply) -> Self {
        lock(&self.scripts)
            .entry(TargetId::new(id).key())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn with_roster(mut self, roster: Vec<RosterMember>) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_roster_error(mut self, message: impl Into<String>) -> Self {
        self.roster_error = Some(message.into());
        self
    }

    /// Delay applied to the roster lookup.
    pub fn with_roster_delay(mut self, delay: Duration) -> Self {
        self.roster_delay = delay;
        self
    }

    pub fn with_group_membership(mut self, member: bool) -> Self {
        self.not_member = !member;
        self
    }

    /// Instance reported by `current_instance`.
    pub fn with_current_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_exclusions(mut self, exclusions: GroupExclusions) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_exclusions_error(mut self) -> Self {
        self.exclusions_error = true;
        self
    }

    /// Targets invited, in call order (retries included).
    pub fn calls(&self) -> Vec<TargetId> {
        lock(&self.calls).clone()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn call_count(&self, id: &str) -> usize {
        let key = TargetId::new(id).key();
        lock(&self.calls).iter().filter(|c| c.key() == key).count()
    }

    pub fn roster_calls(&self) -> usize {
        self.roster_calls.load(Ordering::SeqCst)
    }

    /// Highest number of invite calls observed in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// True if two calls for the same target were ever in flight together.
    pub fn overlap_detected(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    fn next_reply(&self, id: &TargetId) -> ScriptedReply {
        lock(&self.scripts)
            .get_mut(&id.key())
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedReply::Respond(InviteResponse::Success))
    }

    fn enter(&self, id: &TargetId) -> InFlight<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);

        let key = id.key();
        let mut in_flight = lock(&self.in_flight);
        let count = in_flight.entry(key.clone()).or_default();
        if *count > 0 {
            self.overlap.store(true, Ordering::SeqCst);
        }
        *count += 1;

        InFlight {
            platform: self,
            key,
        }
    }
}

/// Decrements in-flight counters when a call ends or is dropped.
struct InFlight<'a> {
    platform: &'a ScriptedPlatform,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.platform.current.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = lock(&self.platform.in_flight).get_mut(&self.key) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl PlatformClient for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_group_invite(
        &self,
        _session: &SessionHandle,
        target: &TargetId,
        _group: &GroupId,
    ) -> Result<InviteResponse, ConvokeError> {
        lock(&self.calls).push(target.clone());
        let _guard = self.enter(target);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.next_reply(target) {
            ScriptedReply::Respond(response) => Ok(response),
            ScriptedReply::Error(message) => Err(ConvokeError::Platform {
                message,
                source: None,
            }),
            ScriptedReply::Hang => std::future::pending().await,
            ScriptedReply::Panic(message) => panic!("{message}"),
        }
    }

    async fn list_current_instance_members(
        &self,
        _session: &SessionHandle,
    ) -> Result<Vec<RosterMember>, ConvokeError> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        if !self.roster_delay.is_zero() {
            tokio::time::sleep(self.roster_delay).await;
        }
        match &self.roster_error {
            Some(message) => Err(ConvokeError::Platform {
                message: message.clone(),
                source: None,
            }),
            None => Ok(self.roster.clone()),
        }
    }

    async fn group_exclusions(
        &self,
        _session: &SessionHandle,
        _group: &GroupId,
    ) -> Result<GroupExclusions, ConvokeError> {
        if self.exclusions_error {
            return Err(ConvokeError::Platform {
                message: "group lookup unavailable".into(),
                source: None,
            });
        }
        Ok(self.exclusions.clone())
    }

    async fn is_group_member(
        &self,
        _session: &SessionHandle,
        _group: &GroupId,
    ) -> Result<bool, ConvokeError> {
        Ok(!self.not_member)
    }

    async fn current_instance(
        &self,
        _session: &SessionHandle,
    ) -> Result<Option<String>, ConvokeError> {
        Ok(self.instance.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
