// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-run scenarios driven through the run controller.
//!
//! Each test builds an isolated TestHarness with a scripted platform.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use convoke_core::{InviteResponse, InviteStatus, InviteTarget, RosterMember, RunStatus};
use convoke_engine::{RunSummary, SourceOptions, TargetRequest};
use convoke_hooks::{FnHook, HookError, HookPhase};
use convoke_test_utils::{ScriptedPlatform, TestHarness};
use tokio::time::Instant;
use tracing_test::traced_test;

fn assert_all_terminal(summary: &RunSummary) {
    for entry in &summary.entries {
        assert!(
            entry.state.is_terminal(),
            "{} ended in {}",
            entry.target.id,
            entry.state
        );
    }
    assert_eq!(
        summary.sent + summary.failed + summary.skipped,
        summary.entries.len()
    );
}

// ---- Scenario: case-insensitive dedup ----

#[tokio::test]
async fn duplicate_spellings_are_invited_once() {
    let harness = TestHarness::builder().build().unwrap();
    let summary = harness.run_list("alice\nAlice\nbob\n").await.unwrap();

    assert_eq!(harness.platform.total_calls(), 2);
    assert_eq!(summary.sent, 2);
    assert_eq!(summary.entries.len(), 2);
    assert_all_terminal(&summary);
}

// ---- Scenario: throttle timing ----

#[tokio::test(start_paused = true)]
async fn one_worker_two_second_delay_three_targets() {
    let harness = TestHarness::builder()
        .with_platform(ScriptedPlatform::new().with_latency(Duration::from_millis(250)))
        .with_workers(1)
        .with_delay(Duration::from_secs(2))
        .build()
        .unwrap();

    let start = Instant::now();
    let summary = harness.run_list("a\nb\nc").await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(summary.sent, 3);
    assert_eq!(elapsed, Duration::from_millis(3 * 250 + 2 * 2000));
}

// ---- Scenario: retry then success ----

#[tokio::test(start_paused = true)]
async fn rate_limited_twice_then_success_ends_sent() {
    let platform = ScriptedPlatform::new().script(
        "alice",
        [
            InviteResponse::RateLimited,
            InviteResponse::RateLimited,
            InviteResponse::Success,
        ],
    );
    let harness = TestHarness::builder()
        .with_platform(platform)
        .with_delay(Duration::from_secs(1))
        .build()
        .unwrap();

    let summary = harness.run_list("alice").await.unwrap();

    assert_eq!(summary.state_of("alice"), Some(&InviteStatus::Sent));
    assert_eq!(harness.platform.call_count("alice"), 3);
}

// ---- Scenario: permanent failure ----

#[tokio::test]
async fn permanent_failure_makes_exactly_one_call() {
    let platform =
        ScriptedPlatform::new().script("bob", [InviteResponse::Permanent("not invitable".into())]);
    let harness = TestHarness::builder().with_platform(platform).build().unwrap();

    let summary = harness.run_list("bob\ncarol").await.unwrap();

    assert_eq!(harness.platform.call_count("bob"), 1);
    assert_eq!(
        summary.state_of("bob"),
        Some(&InviteStatus::Failed("not invitable".into()))
    );
    assert_eq!(summary.state_of("carol"), Some(&InviteStatus::Sent));
    assert_eq!(summary.status, RunStatus::Completed);
}

// ---- Concurrency ----

#[tokio::test(start_paused = true)]
async fn workers_never_exceed_bound_or_overlap_on_a_target() {
    let payload: String = (0..40).map(|i| format!("usr_{i}\nUSR_{i}\n")).collect();
    let harness = TestHarness::builder()
        .with_platform(ScriptedPlatform::new().with_latency(Duration::from_millis(30)))
        .with_workers(4)
        .with_delay(Duration::from_millis(100))
        .build()
        .unwrap();

    let summary = harness.run_list(&payload).await.unwrap();

    assert_eq!(summary.sent, 40);
    assert_eq!(harness.platform.total_calls(), 40);
    assert!(harness.platform.max_concurrent() <= 4);
    assert!(!harness.platform.overlap_detected());
    assert_all_terminal(&summary);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_threaded_run_leaves_no_target_pending() {
    let payload: String = (0..200).map(|i| format!("usr_{}\n", i % 150)).collect();
    let mut platform = ScriptedPlatform::new();
    for i in (0..150).step_by(7) {
        platform =
            platform.script(&format!("usr_{i}"), [InviteResponse::Transient("reset".into())]);
    }
    let harness = TestHarness::builder()
        .with_platform(platform)
        .with_workers(8)
        .build()
        .unwrap();

    let summary = harness.run_list(&payload).await.unwrap();

    assert_eq!(summary.entries.len(), 150);
    assert_eq!(summary.sent, 150);
    assert!(!harness.platform.overlap_detected());
    assert_all_terminal(&summary);
}

// ---- Cancellation ----

#[tokio::test(start_paused = true)]
async fn cancellation_drains_in_flight_and_skips_the_rest() {
    let harness = TestHarness::builder()
        .with_platform(ScriptedPlatform::new().with_latency(Duration::from_secs(3)))
        .with_workers(2)
        .build()
        .unwrap();

    let handle = harness
        .start(TargetRequest::File {
            payload: "a\nb\nc\nd\ne".into(),
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.controller.progress().in_flight.len(), 2);
    assert!(harness.controller.cancel());

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.status, RunStatus::Cancelled);
    assert_eq!(summary.sent, 2, "in-flight calls complete");
    assert_eq!(summary.skipped, 3);
    assert_eq!(harness.platform.total_calls(), 2);
    for id in ["c", "d", "e"] {
        assert_eq!(
            summary.state_of(id),
            Some(&InviteStatus::Skipped("cancelled".into()))
        );
    }
    assert_all_terminal(&summary);
}

// ---- Hooks ----

#[traced_test]
#[tokio::test]
async fn hook_failures_are_logged_and_isolated() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = seen.clone();
        FnHook::new("recorder", move |_, target: &InviteTarget| {
            seen.lock().unwrap().push(target.id.to_string());
            Ok(())
        })
    };

    let harness = TestHarness::builder()
        .with_hook(
            HookPhase::PreInvite,
            Arc::new(FnHook::new("broken", |_, _: &InviteTarget| {
                Err(HookError::failed("extension crashed"))
            })),
        )
        .with_hook(HookPhase::PostInvite, Arc::new(recorder))
        .build()
        .unwrap();

    let summary = harness.run_list("alice\nbob").await.unwrap();

    assert_eq!(summary.sent, 2);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(logs_contain("hook failed, continuing"));
    assert!(logs_contain("extension crashed"));
}

// ---- Sourcing ----

#[tokio::test]
async fn strict_sourcing_aborts_on_malformed_line() {
    let harness = TestHarness::builder()
        .with_source_options(SourceOptions {
            strict: true,
            ..SourceOptions::default()
        })
        .build()
        .unwrap();

    let err = harness.run_list("alice\nbad name\n").await.unwrap_err();

    assert!(err.aborts_run());
    assert_eq!(harness.controller.status(), RunStatus::Aborted);
    assert_eq!(harness.platform.total_calls(), 0);
}

#[tokio::test]
async fn lenient_sourcing_drops_malformed_line() {
    let harness = TestHarness::builder().build().unwrap();
    let summary = harness.run_list("alice\nbad name\n").await.unwrap();
    assert_eq!(summary.entries.len(), 1);
}

#[tokio::test]
async fn instance_run_skips_deny_listed_and_self() {
    let roster = ["usr_self", "usr_1", "usr_2", "usr_3"]
        .into_iter()
        .map(|id| RosterMember {
            id: id.into(),
            display_name: id.to_uppercase(),
            joined_at: None,
        })
        .collect();
    let harness = TestHarness::builder()
        .with_platform(ScriptedPlatform::new().with_roster(roster))
        .with_config(
            convoke_core::RunConfig::new(convoke_core::GroupId::new("grp_test"))
                .with_denied(["USR_2"]),
        )
        .build()
        .unwrap();

    let summary = harness.run_instance().await.unwrap();

    assert_eq!(summary.sent, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(
        summary.state_of("usr_2"),
        Some(&InviteStatus::Skipped("deny-listed".into()))
    );
    assert_eq!(
        summary.state_of("usr_self"),
        Some(&InviteStatus::Skipped("own account".into()))
    );
    assert_eq!(harness.platform.roster_calls(), 1);
}
