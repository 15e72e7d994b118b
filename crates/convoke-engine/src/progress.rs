// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Completion events, progress snapshots and run summaries.
//!
//! Workers only send [`DispatchEvent`]s. A single [`ProgressTracker`] task
//! folds them into counts and publishes a fresh [`ProgressSnapshot`] after
//! each event, so readers never wait on the scheduler.

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use convoke_core::{InviteStatus, InviteTarget, RunStatus, TargetId};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ledger::InviteLedger;

/// Emitted by dispatch workers.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A worker moved the target to `Pending` and is about to call the platform.
    Started { target: InviteTarget, worker: usize },
    /// The target reached a terminal state.
    Finished {
        target: InviteTarget,
        state: InviteStatus,
        attempts: u32,
    },
}

/// Sending half of the completion channel.
pub type EventSink = mpsc::UnboundedSender<DispatchEvent>;

/// Point-in-time view of a run, safe to poll at any rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub run_id: Option<Uuid>,
    pub status: RunStatus,
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub not_attempted: usize,
    /// Identifiers currently being dispatched.
    pub in_flight: Vec<TargetId>,
}

impl ProgressSnapshot {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            status: RunStatus::Idle,
            total: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            pending: 0,
            not_attempted: 0,
            in_flight: Vec::new(),
        }
    }

    /// Targets in a terminal state.
    pub fn finished(&self) -> usize {
        self.sent + self.failed + self.skipped
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

/// Final state of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub target: InviteTarget,
    pub state: InviteStatus,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Every sourced target with its final state, in source order.
    pub entries: Vec<SummaryEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Builds the summary from the ledger, which is authoritative once all
    /// workers have stopped.
    pub fn from_ledger(
        run_id: Uuid,
        status: RunStatus,
        targets: &[InviteTarget],
        ledger: &InviteLedger,
        started_at: DateTime<Utc>,
    ) -> Self {
        let entries: Vec<SummaryEntry> = targets
            .iter()
            .map(|target| SummaryEntry {
                target: target.clone(),
                state: ledger.state(&target.id),
            })
            .collect();

        let count = |pred: fn(&InviteStatus) -> bool| {
            entries.iter().filter(|e| pred(&e.state)).count()
        };

        Self {
            run_id,
            status,
            sent: count(|s| matches!(s, InviteStatus::Sent)),
            failed: count(|s| matches!(s, InviteStatus::Failed(_))),
            skipped: count(|s| matches!(s, InviteStatus::Skipped(_))),
            entries,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Summary of a run that stopped before dispatching anything.
    pub fn undispatched(run_id: Uuid, status: RunStatus, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status,
            sent: 0,
            failed: 0,
            skipped: 0,
            entries: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Final state of `id`, if it was part of the run.
    pub fn state_of(&self, id: &str) -> Option<&InviteStatus> {
        let key = TargetId::new(id).key();
        self.entries
            .iter()
            .find(|e| e.target.id.key() == key)
            .map(|e| &e.state)
    }

    pub fn to_progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            run_id: Some(self.run_id),
            status: self.status,
            total: self.total(),
            sent: self.sent,
            failed: self.failed,
            skipped: self.skipped,
            pending: 0,
            not_attempted: self.total() - self.finished(),
            in_flight: Vec::new(),
        }
    }

    fn finished(&self) -> usize {
        self.sent + self.failed + self.skipped
    }
}

/// Folds dispatch events into progress snapshots.
#[derive(Debug)]
pub struct ProgressTracker {
    snapshot: ProgressSnapshot,
    in_flight: BTreeSet<TargetId>,
}

impl ProgressTracker {
    pub fn new(run_id: Uuid, total: usize) -> Self {
        Self {
            snapshot: ProgressSnapshot {
                run_id: Some(run_id),
                status: RunStatus::Running,
                total,
                not_attempted: total,
                ..ProgressSnapshot::idle()
            },
            in_flight: BTreeSet::new(),
        }
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn apply(&mut self, event: &DispatchEvent) {
        let snap = &mut self.snapshot;
        match event {
            DispatchEvent::Started { target, .. } => {
                if self.in_flight.insert(target.id.clone()) {
                    snap.not_attempted = snap.not_attempted.saturating_sub(1);
                    snap.pending += 1;
                }
            }
            DispatchEvent::Finished { target, state, .. } => {
                if self.in_flight.remove(&target.id) {
                    snap.pending = snap.pending.saturating_sub(1);
                } else {
                    snap.not_attempted = snap.not_attempted.saturating_sub(1);
                }
                match state {
                    InviteStatus::Sent => snap.sent += 1,
                    InviteStatus::Failed(_) => snap.failed += 1,
                    InviteStatus::Skipped(_) => snap.skipped += 1,
                    InviteStatus::NotAttempted | InviteStatus::Pending => {}
                }
            }
        }
        snap.in_flight = self.in_flight.iter().cloned().collect();
    }

    /// Drains `events` until every sender is dropped, publishing after each one.
    pub async fn drain(
        mut self,
        mut events: mpsc::UnboundedReceiver<DispatchEvent>,
        published: Arc<ArcSwap<ProgressSnapshot>>,
    ) -> ProgressSnapshot {
        published.store(Arc::new(self.snapshot.clone()));
        while let Some(event) = events.recv().await {
            self.apply(&event);
            published.store(Arc::new(self.snapshot.clone()));
        }
        self.snapshot
    }
}
