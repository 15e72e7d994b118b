// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Eligibility filter: decides whether a target may be dispatched.

use std::fmt;

use convoke_core::{InviteStatus, InviteTarget, RunConfig, TargetId};

use crate::ledger::InviteLedger;

/// Why a target is not eligible for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Denied,
    OwnAccount,
    /// The ledger already holds a pending or terminal state for the target.
    AlreadyRecorded(InviteStatus),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Denied => f.write_str("deny-listed"),
            SkipReason::OwnAccount => f.write_str("own account"),
            SkipReason::AlreadyRecorded(state) => write!(f, "already {state}"),
        }
    }
}

/// Pure membership test over the deny list, the ledger and the caller's id.
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    self_key: String,
}

impl EligibilityFilter {
    pub fn new(self_id: &TargetId) -> Self {
        Self {
            self_key: self_id.key(),
        }
    }

    pub fn is_eligible(
        &self,
        target: &InviteTarget,
        ledger: &InviteLedger,
        config: &RunConfig,
    ) -> bool {
        self.check(target, ledger, config).is_none()
    }

    /// Returns the first reason `target` must be skipped, if any.
    pub fn check(
        &self,
        target: &InviteTarget,
        ledger: &InviteLedger,
        config: &RunConfig,
    ) -> Option<SkipReason> {
        if config.is_denied(&target.id) {
            return Some(SkipReason::Denied);
        }
        match ledger.state(&target.id) {
            InviteStatus::NotAttempted | InviteStatus::Failed(_) => {}
            state => return Some(SkipReason::AlreadyRecorded(state)),
        }
        if target.id.key() == self.self_key {
            return Some(SkipReason::OwnAccount);
        }
        None
    }
}
