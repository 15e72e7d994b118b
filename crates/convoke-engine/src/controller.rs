// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run controller: owns the lifecycle of one invite run at a time.
//!
//! ```text
//! Idle -> Running -> {Completed, Cancelled, Aborted}
//! ```
//!
//! A terminal state accepts a new `start`. Hooks can only be changed while
//! no run is `Running`; each run works on a frozen copy of the hook bus.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::{DateTime, Utc};
use convoke_core::{
    ConvokeError, InviteTarget, PlatformClient, RunConfig, RunStatus, SessionHandle,
};
use convoke_hooks::{HookBus, HookPhase, InviteHook};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ledger::InviteLedger;
use crate::progress::{ProgressSnapshot, ProgressTracker, RunSummary};
use crate::scheduler::{DispatchEnd, DispatchScheduler};
use crate::source::{SourceOptions, TargetRequest, TargetSource};

const ALREADY_IN_GROUP: &str = "already in group";
const INVITE_PENDING: &str = "invite already pending";

#[derive(Debug)]
struct Lifecycle {
    status: RunStatus,
    run_id: Option<Uuid>,
    cancel: Option<CancellationToken>,
}

struct ControllerInner {
    platform: Arc<dyn PlatformClient>,
    source: TargetSource,
    lifecycle: Mutex<Lifecycle>,
    hooks: Mutex<HookBus>,
    progress: Arc<ArcSwap<ProgressSnapshot>>,
    last_summary: ArcSwapOption<RunSummary>,
}

/// Entry point for the presentation layer.
///
/// Cheap to clone; clones share the same run state.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<ControllerInner>,
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: Uuid,
    task: JoinHandle<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Waits for the run to reach a terminal status.
    pub async fn wait(self) -> Result<RunSummary, ConvokeError> {
        self.task
            .await
            .map_err(|e| ConvokeError::Internal(format!("run task failed: {e}")))
    }
}

/// Ends a run that never reached dispatch.
///
/// Dropped while still armed, the run is recorded as `Aborted` so the
/// controller can start again.
struct Preflight<'a> {
    controller: &'a RunController,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    armed: bool,
}

impl Preflight<'_> {
    fn abort(mut self, err: ConvokeError) -> ConvokeError {
        self.armed = false;
        warn!(run_id = %self.run_id, error = %err, "run aborted before dispatch");
        self.end(RunStatus::Aborted);
        err
    }

    fn cancelled(mut self) -> RunHandle {
        self.armed = false;
        info!(run_id = %self.run_id, "run cancelled before dispatch");
        let summary = self.end(RunStatus::Cancelled);
        RunHandle {
            run_id: self.run_id,
            task: tokio::spawn(async move { summary }),
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    fn end(&self, status: RunStatus) -> RunSummary {
        let summary = RunSummary::undispatched(self.run_id, status, self.started_at);
        self.controller.finish(&summary);
        summary
    }
}

impl Drop for Preflight<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(run_id = %self.run_id, "run start abandoned before dispatch");
            self.end(RunStatus::Aborted);
        }
    }
}

impl RunController {
    pub fn new(platform: Arc<dyn PlatformClient>, options: SourceOptions) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                platform,
                source: TargetSource::new(options),
                lifecycle: Mutex::new(Lifecycle {
                    status: RunStatus::Idle,
                    run_id: None,
                    cancel: None,
                }),
                hooks: Mutex::new(HookBus::new()),
                progress: Arc::new(ArcSwap::from_pointee(ProgressSnapshot::idle())),
                last_summary: ArcSwapOption::empty(),
            }),
        }
    }

    /// Starts a run.
    ///
    /// Permission checks, sourcing and pre-flight exclusions happen before
    /// this returns; dispatch continues in the background. A failure in any
    /// of them moves the controller to `Aborted` and is returned as the
    /// error. A cancel during this phase ends the run `Cancelled` with no
    /// targets, and dropping the returned future ends it `Aborted`.
    pub async fn start(
        &self,
        session: Option<Arc<SessionHandle>>,
        config: RunConfig,
        request: TargetRequest,
    ) -> Result<RunHandle, ConvokeError> {
        config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let cancel = CancellationToken::new();
        let hooks = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.status == RunStatus::Running {
                return Err(ConvokeError::RunInProgress);
            }
            lifecycle.status = RunStatus::Running;
            lifecycle.run_id = Some(run_id);
            lifecycle.cancel = Some(cancel.clone());
            Arc::new(self.hooks().clone())
        };
        self.inner.progress.store(Arc::new(ProgressSnapshot {
            run_id: Some(run_id),
            status: RunStatus::Running,
            ..ProgressSnapshot::idle()
        }));
        info!(%run_id, mode = request.mode(), group = %config.group, "run started");

        let preflight = Preflight {
            controller: self,
            run_id,
            started_at,
            armed: true,
        };

        let Some(session) = session else {
            let err = match request {
                TargetRequest::Instance => ConvokeError::SourceUnavailable(
                    "instance mode requires an active session".into(),
                ),
                TargetRequest::File { .. } => ConvokeError::NotAuthenticated,
            };
            return Err(preflight.abort(err));
        };

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            prepared = self.prepare(&session, &config, &request) => Some(prepared),
        };
        let (targets, ledger) = match prepared {
            Some(Ok(prepared)) => prepared,
            Some(Err(e)) => return Err(preflight.abort(e)),
            None => return Ok(preflight.cancelled()),
        };
        preflight.disarm();

        let scheduler = DispatchScheduler::new(
            self.inner.platform.clone(),
            session,
            ledger.clone(),
            hooks,
        );
        let controller = self.clone();

        let task = tokio::spawn(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let tracker = ProgressTracker::new(run_id, targets.len());
            let aggregator = tokio::spawn(tracker.drain(rx, controller.inner.progress.clone()));

            let end = scheduler.run(targets.clone(), &config, tx, cancel.clone()).await;
            if let Err(e) = aggregator.await {
                warn!(%run_id, error = %e, "progress aggregator stopped abnormally");
            }

            let status = match end {
                Ok(DispatchEnd::Drained) => RunStatus::Completed,
                Ok(DispatchEnd::Interrupted) => RunStatus::Cancelled,
                Err(e) => {
                    error!(%run_id, error = %e, "dispatch ended with an error");
                    if cancel.is_cancelled() {
                        RunStatus::Cancelled
                    } else {
                        RunStatus::Completed
                    }
                }
            };
            let summary = RunSummary::from_ledger(run_id, status, &targets, &ledger, started_at);
            controller.finish(&summary);
            summary
        });

        Ok(RunHandle { run_id, task })
    }

    /// Requests cancellation of the current run.
    ///
    /// Returns false when no run is in progress.
    pub fn cancel(&self) -> bool {
        let lifecycle = self.lifecycle();
        match (&lifecycle.status, &lifecycle.cancel) {
            (RunStatus::Running, Some(token)) => {
                if !token.is_cancelled() {
                    info!(run_id = ?lifecycle.run_id, "cancellation requested");
                    token.cancel();
                }
                true
            }
            _ => false,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.lifecycle().status
    }

    /// Latest progress snapshot. Never blocks on the scheduler.
    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.load().as_ref().clone()
    }

    /// Summary of the most recently finished run.
    pub fn last_summary(&self) -> Option<RunSummary> {
        self.inner.last_summary.load_full().map(|s| s.as_ref().clone())
    }

    pub fn register_hook(
        &self,
        phase: HookPhase,
        hook: Arc<dyn InviteHook>,
    ) -> Result<(), ConvokeError> {
        let lifecycle = self.lifecycle();
        if lifecycle.status == RunStatus::Running {
            return Err(ConvokeError::RunInProgress);
        }
        self.hooks().register(phase, hook);
        Ok(())
    }

    pub fn clear_hooks(&self) -> Result<(), ConvokeError> {
        let lifecycle = self.lifecycle();
        if lifecycle.status == RunStatus::Running {
            return Err(ConvokeError::RunInProgress);
        }
        self.hooks().clear();
        Ok(())
    }

    pub fn hook_names(&self, phase: HookPhase) -> Vec<String> {
        self.hooks().names(phase)
    }

    /// Permission checks, sourcing and exclusion seeding for one run.
    async fn prepare(
        &self,
        session: &SessionHandle,
        config: &RunConfig,
        request: &TargetRequest,
    ) -> Result<(Vec<InviteTarget>, Arc<InviteLedger>), ConvokeError> {
        let platform = self.inner.platform.as_ref();
        if !platform.is_group_member(session, &config.group).await? {
            return Err(ConvokeError::NotPermitted(format!(
                "{} is not a member of {}",
                session.user_id(),
                config.group
            )));
        }
        if let Some(instance) = platform.current_instance(session).await? {
            if !config.group.hosts_instance(&instance) {
                return Err(ConvokeError::NotPermitted(format!(
                    "current instance {instance} is not hosted by {}",
                    config.group
                )));
            }
        }

        let targets = self
            .inner
            .source
            .list_targets(request, Some(session), platform)
            .await?;

        let ledger = Arc::new(InviteLedger::new());
        self.seed_exclusions(session, config, &ledger).await;
        Ok((targets, ledger))
    }

    async fn seed_exclusions(
        &self,
        session: &SessionHandle,
        config: &RunConfig,
        ledger: &InviteLedger,
    ) {
        match self.inner.platform.group_exclusions(session, &config.group).await {
            Ok(exclusions) => {
                let members = ledger.seed_skipped(exclusions.members, ALREADY_IN_GROUP);
                let pending = ledger.seed_skipped(exclusions.pending_invites, INVITE_PENDING);
                if members + pending > 0 {
                    info!(members, pending, "pre-flight exclusions applied");
                }
            }
            Err(e) => {
                warn!(
                    group = %config.group,
                    error = %e,
                    "group exclusion lookup failed, continuing without it"
                );
            }
        }
    }

    fn finish(&self, summary: &RunSummary) {
        self.inner.last_summary.store(Some(Arc::new(summary.clone())));
        self.inner.progress.store(Arc::new(summary.to_progress()));

        let mut lifecycle = self.lifecycle();
        lifecycle.status = summary.status;
        lifecycle.cancel = None;
        info!(
            run_id = %summary.run_id,
            status = %summary.status,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks(&self) -> MutexGuard<'_, HookBus> {
        self.inner.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RunController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunController")
            .field("platform", &self.inner.platform.name())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use convoke_core::{GroupExclusions, GroupId, InviteStatus, RosterMember, TargetId};
    use convoke_hooks::FnHook;
    use convoke_test_utils::ScriptedPlatform;
    use secrecy::SecretString;

    use super::*;

    fn session() -> Option<Arc<SessionHandle>> {
        Some(Arc::new(SessionHandle::new(
            "usr_me",
            "Me",
            SecretString::from("token".to_string()),
        )))
    }

    fn file(payload: &str) -> TargetRequest {
        TargetRequest::File {
            payload: payload.to_string(),
        }
    }

    fn config() -> RunConfig {
        RunConfig::new(GroupId::new("grp_1"))
    }

    fn controller(platform: ScriptedPlatform) -> (RunController, Arc<ScriptedPlatform>) {
        let platform = Arc::new(platform);
        (
            RunController::new(platform.clone(), SourceOptions::default()),
            platform,
        )
    }

    #[tokio::test]
    async fn starts_idle() {
        let (controller, _) = controller(ScriptedPlatform::new());
        assert_eq!(controller.status(), RunStatus::Idle);
        assert_eq!(controller.progress(), ProgressSnapshot::idle());
        assert!(controller.last_summary().is_none());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn completed_run_reports_every_target() {
        let (controller, platform) = controller(ScriptedPlatform::new());
        let handle = controller
            .start(session(), config(), file("alice\nAlice\nbob\n"))
            .await
            .unwrap();
        let summary = handle.wait().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.total(), 2);
        assert_eq!(platform.total_calls(), 2);
        assert_eq!(controller.status(), RunStatus::Completed);
        assert_eq!(controller.progress().sent, 2);
        assert_eq!(controller.last_summary().unwrap().run_id, summary.run_id);
    }

    #[tokio::test]
    async fn instance_mode_without_session_aborts() {
        let (controller, platform) = controller(ScriptedPlatform::new());
        let err = controller
            .start(None, config(), TargetRequest::Instance)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvokeError::SourceUnavailable(_)));
        assert_eq!(controller.status(), RunStatus::Aborted);
        assert_eq!(platform.total_calls(), 0);
        assert_eq!(controller.last_summary().unwrap().status, RunStatus::Aborted);
    }

    #[tokio::test]
    async fn file_mode_without_session_is_unauthenticated() {
        let (controller, _) = controller(ScriptedPlatform::new());
        let err = controller
            .start(None, config(), file("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvokeError::NotAuthenticated));
        assert_eq!(controller.status(), RunStatus::Aborted);
    }

    #[tokio::test]
    async fn roster_failure_aborts() {
        let (controller, _) = controller(ScriptedPlatform::new().with_roster_error("offline"));
        let err = controller
            .start(session(), config(), TargetRequest::Instance)
            .await
            .unwrap_err();
        assert!(err.aborts_run());
        assert_eq!(controller.status(), RunStatus::Aborted);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_before_running() {
        let (controller, _) = controller(ScriptedPlatform::new());
        let err = controller
            .start(session(), config().with_workers(0), file("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvokeError::Config(_)));
        assert_eq!(controller.status(), RunStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn only_one_run_at_a_time() {
        let (controller, _) =
            controller(ScriptedPlatform::new().with_latency(Duration::from_secs(1)));
        let handle = controller
            .start(session(), config(), file("alice\nbob"))
            .await
            .unwrap();

        let err = controller
            .start(session(), config(), file("carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvokeError::RunInProgress));

        handle.wait().await.unwrap();
        let second = controller
            .start(session(), config(), file("carol"))
            .await
            .unwrap();
        assert_eq!(second.wait().await.unwrap().sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_marks_unstarted_targets_skipped() {
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_latency(Duration::from_millis(100)));
        let handle = controller
            .start(
                session(),
                config().with_delay(Duration::from_secs(5)),
                file("a\nb\nc\nd"),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.cancel());
        let summary = handle.wait().await.unwrap();

        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(platform.total_calls(), 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.state_of("d"), Some(&InviteStatus::Skipped("cancelled".into())));
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn exclusions_are_seeded_as_skipped() {
        let mut exclusions = GroupExclusions::default();
        exclusions.members.insert(TargetId::new("member"));
        exclusions.pending_invites.insert(TargetId::new("invited"));
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_exclusions(exclusions));

        let summary = controller
            .start(session(), config(), file("member\ninvited\nfresh"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(platform.total_calls(), 1);
        assert_eq!(
            summary.state_of("member"),
            Some(&InviteStatus::Skipped("already in group".into()))
        );
        assert_eq!(
            summary.state_of("invited"),
            Some(&InviteStatus::Skipped("invite already pending".into()))
        );
    }

    #[tokio::test]
    async fn failed_exclusion_lookup_does_not_abort() {
        let (controller, platform) = controller(ScriptedPlatform::new().with_exclusions_error());
        let summary = controller
            .start(session(), config(), file("alice"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(platform.total_calls(), 1);
    }

    #[tokio::test]
    async fn instance_run_excludes_self() {
        let roster = ["usr_me", "usr_1"]
            .into_iter()
            .map(|id| RosterMember {
                id: id.into(),
                display_name: id.into(),
                joined_at: None,
            })
            .collect();
        let (controller, platform) = controller(ScriptedPlatform::new().with_roster(roster));

        let summary = controller
            .start(session(), config(), TargetRequest::Instance)
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(platform.calls(), vec![TargetId::new("usr_1")]);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hooks_are_frozen_while_running() {
        let (controller, _) =
            controller(ScriptedPlatform::new().with_latency(Duration::from_millis(200)));
        controller
            .register_hook(
                HookPhase::PostInvite,
                Arc::new(FnHook::new("audit", |_, _: &convoke_core::InviteTarget| Ok(()))),
            )
            .unwrap();

        let handle = controller
            .start(session(), config(), file("alice"))
            .await
            .unwrap();
        let late = Arc::new(FnHook::new("late", |_, _: &convoke_core::InviteTarget| Ok(())));
        assert!(matches!(
            controller.register_hook(HookPhase::PreInvite, late),
            Err(ConvokeError::RunInProgress)
        ));
        assert!(matches!(controller.clear_hooks(), Err(ConvokeError::RunInProgress)));

        handle.wait().await.unwrap();
        assert_eq!(controller.hook_names(HookPhase::PostInvite), vec!["audit"]);
        controller.clear_hooks().unwrap();
        assert!(controller.hook_names(HookPhase::PostInvite).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_shows_in_flight_targets() {
        let (controller, _) =
            controller(ScriptedPlatform::new().with_latency(Duration::from_secs(10)));
        let handle = controller
            .start(session(), config().with_workers(2), file("a\nb\nc"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let progress = controller.progress();
        assert_eq!(progress.status, RunStatus::Running);
        assert_eq!(progress.total, 3);
        assert_eq!(progress.pending, 2);
        assert_eq!(progress.in_flight, vec![TargetId::new("a"), TargetId::new("b")]);

        handle.wait().await.unwrap();
        assert_eq!(controller.progress().sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_start_releases_the_controller() {
        let (controller, _) =
            controller(ScriptedPlatform::new().with_roster_delay(Duration::from_secs(3600)));

        let stalled = tokio::time::timeout(
            Duration::from_secs(5),
            controller.start(session(), config(), TargetRequest::Instance),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(controller.status(), RunStatus::Aborted);
        assert_eq!(controller.last_summary().unwrap().status, RunStatus::Aborted);
        assert!(!controller.cancel());

        let handle = controller
            .start(session(), config(), file("alice"))
            .await
            .unwrap();
        assert_eq!(handle.wait().await.unwrap().sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sourcing_ends_the_run() {
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_roster_delay(Duration::from_secs(3600)));
        let starting = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller
                    .start(session(), config(), TargetRequest::Instance)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.status(), RunStatus::Running);
        assert!(controller.cancel());

        let summary = starting.await.unwrap().unwrap().wait().await.unwrap();
        assert_eq!(summary.status, RunStatus::Cancelled);
        assert_eq!(summary.total(), 0);
        assert_eq!(controller.status(), RunStatus::Cancelled);
        assert_eq!(platform.roster_calls(), 1);
        assert_eq!(platform.total_calls(), 0);
    }

    #[tokio::test]
    async fn non_member_cannot_invite() {
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_group_membership(false));
        let err = controller
            .start(session(), config(), file("alice"))
            .await
            .unwrap_err();

        assert!(matches!(err, ConvokeError::NotPermitted(_)));
        assert!(err.aborts_run());
        assert_eq!(controller.status(), RunStatus::Aborted);
        assert_eq!(platform.total_calls(), 0);
    }

    #[tokio::test]
    async fn instance_of_another_group_cannot_invite() {
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_current_instance("grp_other~region(eu)"));
        let err = controller
            .start(session(), config(), TargetRequest::Instance)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvokeError::NotPermitted(_)));
        assert_eq!(platform.roster_calls(), 0);
        assert_eq!(controller.status(), RunStatus::Aborted);
    }

    #[tokio::test]
    async fn instance_of_the_group_may_invite() {
        let (controller, platform) =
            controller(ScriptedPlatform::new().with_current_instance("grp_1~region(eu)"));
        let summary = controller
            .start(session(), config(), file("alice"))
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(platform.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_every_target_started_reports_completed() {
        let (controller, _) =
            controller(ScriptedPlatform::new().with_latency(Duration::from_secs(2)));
        let handle = controller
            .start(session(), config().with_workers(2), file("a\nb"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(controller.cancel());
        let summary = handle.wait().await.unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.sent, 2);
        assert_eq!(controller.status(), RunStatus::Completed);
    }
}
