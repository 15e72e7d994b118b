// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run invite state, keyed by case-folded target identifier.
//!
//! Every transition goes through the map's entry API, so the check and the
//! write happen under the same shard lock. This is what enforces the
//! at-most-one-in-flight rule across workers.

use std::collections::HashMap;

use convoke_core::{InviteStatus, TargetId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

#[derive(Debug, Clone)]
struct Record {
    id: TargetId,
    status: InviteStatus,
}

/// Invite state for every target a run has touched.
///
/// Targets never seen by the ledger are implicitly `NotAttempted`.
#[derive(Debug, Default)]
pub struct InviteLedger {
    records: DashMap<String, Record>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves a target from `NotAttempted` to `Pending`.
    ///
    /// Returns false if the target is already pending or terminal; the
    /// caller must not dispatch it in that case.
    pub fn begin_attempt(&self, id: &TargetId) -> bool {
        match self.records.entry(id.key()) {
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    id: id.clone(),
                    status: InviteStatus::Pending,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                if slot.get().status == InviteStatus::NotAttempted {
                    slot.get_mut().status = InviteStatus::Pending;
                    true
                } else {
                    debug!(target_id = %id, state = %slot.get().status, "attempt rejected");
                    false
                }
            }
        }
    }

    /// Records the outcome of a pending attempt.
    ///
    /// Only `Pending -> Sent` and `Pending -> Failed` are accepted.
    pub fn complete(&self, id: &TargetId, outcome: InviteStatus) -> bool {
        if !matches!(outcome, InviteStatus::Sent | InviteStatus::Failed(_)) {
            return false;
        }
        match self.records.get_mut(&id.key()) {
            Some(mut record) if record.status == InviteStatus::Pending => {
                record.status = outcome;
                true
            }
            _ => {
                debug!(
                    target_id = %id,
                    outcome = %outcome,
                    "completion ignored, target not pending"
                );
                false
            }
        }
    }

    /// Marks a target that was never attempted as skipped.
    pub fn skip(&self, id: &TargetId, reason: impl Into<String>) -> bool {
        let status = InviteStatus::Skipped(reason.into());
        match self.records.entry(id.key()) {
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    id: id.clone(),
                    status,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                if slot.get().status == InviteStatus::NotAttempted {
                    slot.get_mut().status = status;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Skips every identifier in `ids` with the same reason. Returns how
    /// many were newly recorded.
    pub fn seed_skipped<I>(&self, ids: I, reason: &str) -> usize
    where
        I: IntoIterator<Item = TargetId>,
    {
        ids.into_iter()
            .filter(|id| self.skip(id, reason))
            .count()
    }

    /// Fails every target still pending. Used when a worker dies mid-attempt.
    pub fn abandon_pending(&self, reason: &str) -> Vec<TargetId> {
        let mut abandoned = Vec::new();
        for mut record in self.records.iter_mut() {
            if record.status == InviteStatus::Pending {
                record.status = InviteStatus::Failed(reason.to_string());
                abandoned.push(record.id.clone());
            }
        }
        abandoned
    }

    pub fn state(&self, id: &TargetId) -> InviteStatus {
        self.records
            .get(&id.key())
            .map(|r| r.status.clone())
            .unwrap_or(InviteStatus::NotAttempted)
    }

    /// Point-in-time copy of every recorded state.
    pub fn snapshot(&self) -> HashMap<TargetId, InviteStatus> {
        self.records
            .iter()
            .map(|r| (r.id.clone(), r.status.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
