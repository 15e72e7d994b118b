// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch scheduler.
//!
//! A fixed pool of workers pulls targets from one shared FIFO queue. Each
//! worker runs the per-target sequence (pending, pre hooks, invite call with
//! bounded retries, outcome, post hooks) and then waits the configured delay
//! before taking its next target. The run-level [`CancellationToken`] is
//! checked before every new dispatch; calls already in flight finish.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use convoke_core::{
    ConvokeError, DispatchError, InviteStatus, InviteTarget, PlatformClient, RunConfig,
    SessionHandle,
};
use convoke_hooks::{HookBus, HookPhase};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::eligibility::EligibilityFilter;
use crate::ledger::InviteLedger;
use crate::progress::{DispatchEvent, EventSink};
use crate::source::dedup_targets;

/// Reason recorded for targets that were never started because of a cancel.
pub const CANCELLED: &str = "cancelled";

type SharedQueue = Arc<Mutex<VecDeque<InviteTarget>>>;

/// How a dispatch pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    /// Every queued target was worked through.
    Drained,
    /// A cancel stopped work that was still outstanding.
    Interrupted,
}

/// Drives eligible targets through the platform's invite call.
#[derive(Clone)]
pub struct DispatchScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    platform: Arc<dyn PlatformClient>,
    session: Arc<SessionHandle>,
    ledger: Arc<InviteLedger>,
    filter: EligibilityFilter,
    hooks: Arc<HookBus>,
    retry_cut_short: AtomicBool,
}

impl DispatchScheduler {
    pub fn new(
        platform: Arc<dyn PlatformClient>,
        session: Arc<SessionHandle>,
        ledger: Arc<InviteLedger>,
        hooks: Arc<HookBus>,
    ) -> Self {
        let filter = EligibilityFilter::new(session.user_id());
        Self {
            inner: Arc::new(SchedulerInner {
                platform,
                session,
                ledger,
                filter,
                hooks,
                retry_cut_short: AtomicBool::new(false),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<InviteLedger> {
        &self.inner.ledger
    }

    /// Dispatches `targets` and returns once every worker has stopped.
    ///
    /// On return every target is terminal in the ledger: targets left in the
    /// queue after a cancel are skipped with reason `cancelled`. A cancel that
    /// lands after the last target was taken reports [`DispatchEnd::Drained`].
    ///
    /// A panicking worker stops only itself; its queued targets are skipped
    /// and the run returns [`ConvokeError::Internal`].
    pub async fn run(
        &self,
        targets: Vec<InviteTarget>,
        config: &RunConfig,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<DispatchEnd, ConvokeError> {
        config.validate()?;
        self.inner.retry_cut_short.store(false, Ordering::SeqCst);

        let queue: SharedQueue = Arc::new(Mutex::new(dedup_targets(targets).into()));
        let config = Arc::new(config.clone());
        let worker_count = config.workers;

        info!(
            group = %config.group,
            workers = worker_count,
            delay_ms = config.delay.as_millis() as u64,
            queued = lock(&queue).len(),
            "dispatch started"
        );

        let mut workers = JoinSet::new();
        for index in 0..worker_count {
            let inner = self.inner.clone();
            workers.spawn(inner.worker(
                index,
                config.clone(),
                queue.clone(),
                events.clone(),
                cancel.clone(),
            ));
        }

        let mut worker_failure = None;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatch worker stopped abnormally");
                worker_failure = Some(e.to_string());
            }
        }

        let reason = if worker_failure.is_some() && !cancel.is_cancelled() {
            "worker stopped"
        } else {
            CANCELLED
        };
        let leftover: Vec<InviteTarget> = lock(&queue).drain(..).collect();
        let interrupted = cancel.is_cancelled()
            && (!leftover.is_empty() || self.inner.retry_cut_short.load(Ordering::SeqCst));
        for target in leftover {
            self.inner.skip(&target, reason, &events);
        }
        for id in self.inner.ledger.abandon_pending("worker stopped") {
            warn!(target_id = %id, "in-flight attempt abandoned");
        }

        info!(interrupted, "dispatch finished");

        match worker_failure {
            Some(e) => Err(ConvokeError::Internal(format!("dispatch worker failed: {e}"))),
            None if interrupted => Ok(DispatchEnd::Interrupted),
            None => Ok(DispatchEnd::Drained),
        }
    }
}

impl SchedulerInner {
    async fn worker(
        self: Arc<Self>,
        index: usize,
        config: Arc<RunConfig>,
        queue: SharedQueue,
        events: EventSink,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let Some(target) = lock(&queue).pop_front() else {
                break;
            };

            if !self.process(index, &target, &config, &events, &cancel).await {
                continue;
            }

            if lock(&queue).is_empty() {
                break;
            }
            if !config.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.delay) => {}
                }
            }
        }
        debug!(worker = index, "worker stopped");
    }

    /// Runs the per-target sequence. Returns true if the platform was called.
    async fn process(
        &self,
        worker: usize,
        target: &InviteTarget,
        config: &RunConfig,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> bool {
        if let Some(reason) = self.filter.check(target, &self.ledger, config) {
            debug!(target_id = %target.id, reason = %reason, "target not eligible");
            self.skip(target, &reason.to_string(), events);
            return false;
        }

        if !self.ledger.begin_attempt(&target.id) {
            debug!(target_id = %target.id, "target already claimed");
            return false;
        }
        emit(
            events,
            DispatchEvent::Started {
                target: target.clone(),
                worker,
            },
        );

        self.hooks.invoke(HookPhase::PreInvite, target).await;

        let (outcome, attempts) = self.dispatch(target, config, cancel).await;
        self.ledger.complete(&target.id, outcome.clone());

        match &outcome {
            InviteStatus::Sent => {
                info!(target_id = %target.id, attempts, "invite sent");
            }
            InviteStatus::Failed(reason) => {
                warn!(target_id = %target.id, attempts, reason = %reason, "invite failed");
            }
            _ => {}
        }

        emit(
            events,
            DispatchEvent::Finished {
                target: target.clone(),
                state: outcome.clone(),
                attempts,
            },
        );

        if outcome == InviteStatus::Sent {
            self.hooks.invoke(HookPhase::PostInvite, target).await;
        }
        true
    }

    /// Calls the platform, retrying recoverable failures up to
    /// `config.max_retries` times with `config.delay` before each retry.
    async fn dispatch(
        &self,
        target: &InviteTarget,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> (InviteStatus, u32) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let err = match self.send_once(target, config).await {
                Ok(()) => return (InviteStatus::Sent, attempts),
                Err(e) => e,
            };

            if !err.is_recoverable() || attempts > config.max_retries {
                return (InviteStatus::Failed(err.to_string()), attempts);
            }

            debug!(
                target_id = %target.id,
                attempt = attempts,
                error = %err,
                "recoverable failure, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.retry_cut_short.store(true, Ordering::SeqCst);
                    return (InviteStatus::Failed(err.to_string()), attempts);
                }
                _ = tokio::time::sleep(config.delay) => {}
            }
        }
    }

    async fn send_once(
        &self,
        target: &InviteTarget,
        config: &RunConfig,
    ) -> Result<(), DispatchError> {
        let call = self
            .platform
            .send_group_invite(&self.session, &target.id, &config.group);

        let response = match config.invite_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(ConvokeError::Timeout { duration: limit })),
            None => call.await,
        };

        match response {
            Ok(response) => response.into_result(),
            Err(e) => Err(DispatchError::from_platform_error(&e)),
        }
    }

    fn skip(&self, target: &InviteTarget, reason: &str, events: &EventSink) {
        self.ledger.skip(&target.id, reason);
        let state = self.ledger.state(&target.id);
        if state.is_terminal() {
            emit(
                events,
                DispatchEvent::Finished {
                    target: target.clone(),
                    state,
                    attempts: 0,
                },
            );
        }
    }
}

fn emit(events: &EventSink, event: DispatchEvent) {
    if events.send(event).is_err() {
        debug!("progress receiver dropped");
    }
}

fn lock(queue: &SharedQueue) -> std::sync::MutexGuard<'_, VecDeque<InviteTarget>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}
