// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Convoke invite orchestration engine.
//!
//! Data flows `TargetSource -> EligibilityFilter -> DispatchScheduler`, with
//! the hook bus invoked around each dispatch and the [`RunController`]
//! aggregating completion events into progress snapshots and a final
//! [`RunSummary`].

pub mod controller;
pub mod eligibility;
pub mod ledger;
pub mod progress;
pub mod scheduler;
pub mod shutdown;
pub mod source;

pub use controller::{RunController, RunHandle};
pub use eligibility::{EligibilityFilter, SkipReason};
pub use ledger::InviteLedger;
pub use progress::{DispatchEvent, EventSink, ProgressSnapshot, RunSummary, SummaryEntry};
pub use scheduler::{DispatchEnd, DispatchScheduler};
pub use source::{SourceOptions, TargetRequest, TargetSource, dedup_targets, parse_target_list};
