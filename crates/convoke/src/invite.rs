// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `convoke invite` command implementation.
//!
//! Runs the engine end-to-end against the dry-run platform client, shows a
//! progress bar while polling the controller, and prints a per-target
//! summary. Ctrl+C cancels the run; in-flight invites still finish.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use convoke_config::{ConvokeConfig, SourceMode};
use convoke_core::{ConvokeError, InviteStatus, InviteTarget, RunStatus, SessionHandle};
use convoke_engine::shutdown::cancel_on_signal;
use convoke_engine::{ProgressSnapshot, RunController, RunSummary, SourceOptions, TargetRequest};
use convoke_hooks::{FnHook, HookPhase};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use tracing::debug;

use crate::dry_run::DryRunPlatform;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line overrides for one invite run.
#[derive(Debug, Default, Clone)]
pub struct InviteOptions {
    pub file: Option<PathBuf>,
    pub roster: Option<PathBuf>,
    pub group: Option<String>,
    pub workers: Option<usize>,
    pub delay: Option<f64>,
    pub latency_ms: Option<u64>,
    pub json: bool,
    pub plain: bool,
}

/// Run the `convoke invite` command.
pub async fn run_invite(
    config: &ConvokeConfig,
    opts: InviteOptions,
) -> Result<RunSummary, ConvokeError> {
    let mut settings = config.run.clone();
    if let Some(workers) = opts.workers {
        settings.workers = workers;
    }
    if let Some(delay) = opts.delay {
        settings.delay_secs = delay;
    }
    let run_config = settings.to_run_config(opts.group.as_deref())?;

    let mut platform = DryRunPlatform::new();
    if let Some(ms) = opts.latency_ms {
        platform = platform.with_latency(Duration::from_millis(ms));
    }
    if let Some(roster) = &opts.roster {
        platform = platform.load_roster(roster).await?;
    }
    let request = resolve_request(config, &opts).await?;

    let options = SourceOptions {
        strict: config.source.strict,
        min_presence: Duration::from_secs(config.source.min_presence_secs),
    };
    let controller = RunController::new(Arc::new(platform), options);
    controller.register_hook(
        HookPhase::PostInvite,
        Arc::new(FnHook::new("audit", |_, target: &InviteTarget| {
            debug!(target_id = %target.id, name = %target.display_name, "invite recorded");
            Ok(())
        })),
    )?;

    let signals = cancel_on_signal(controller.clone());
    let result = drive(&controller, local_session(), run_config, request, &opts).await;
    signals.abort();
    let summary = result?;

    if opts.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !opts.plain && std::io::stdout().is_terminal();
        if !use_color {
            colored::control::set_override(false);
        }
        print_summary(&summary);
    }
    Ok(summary)
}

async fn resolve_request(
    config: &ConvokeConfig,
    opts: &InviteOptions,
) -> Result<TargetRequest, ConvokeError> {
    if let Some(file) = &opts.file {
        return TargetRequest::from_file(file).await;
    }
    if opts.roster.is_some() {
        return Ok(TargetRequest::Instance);
    }
    match (config.source.mode, &config.source.user_file) {
        (SourceMode::File, Some(path)) => TargetRequest::from_file(path).await,
        (SourceMode::File, None) => Err(ConvokeError::Config(
            "source.mode = \"file\" requires source.user_file".into(),
        )),
        (SourceMode::Instance, _) => Ok(TargetRequest::Instance),
    }
}

/// The credential store is external; the dry run authenticates as a local user.
fn local_session() -> Arc<SessionHandle> {
    let user_id = std::env::var("CONVOKE_USER_ID").unwrap_or_else(|_| "usr_local".to_string());
    Arc::new(SessionHandle::new(
        user_id,
        "local user",
        SecretString::from(String::new()),
    ))
}

async fn drive(
    controller: &RunController,
    session: Arc<SessionHandle>,
    config: convoke_core::RunConfig,
    request: TargetRequest,
    opts: &InviteOptions,
) -> Result<RunSummary, ConvokeError> {
    let handle = controller.start(Some(session), config, request).await?;

    let bar = if opts.json || !std::io::stderr().is_terminal() {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        bar.set_style(style.progress_chars("=> "));
    }

    let wait = handle.wait();
    tokio::pin!(wait);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);

    let summary = loop {
        tokio::select! {
            summary = &mut wait => break summary?,
            _ = ticker.tick() => update_bar(&bar, &controller.progress()),
        }
    };
    update_bar(&bar, &summary.to_progress());
    bar.finish_and_clear();
    Ok(summary)
}

fn update_bar(bar: &ProgressBar, progress: &ProgressSnapshot) {
    bar.set_length(progress.total as u64);
    bar.set_position(progress.finished() as u64);
    bar.set_message(progress_line(progress));
}

fn progress_line(progress: &ProgressSnapshot) -> String {
    let mut line = format!(
        "sent {}  failed {}  skipped {}",
        progress.sent, progress.failed, progress.skipped
    );
    if !progress.in_flight.is_empty() {
        let ids: Vec<String> = progress.in_flight.iter().map(ToString::to_string).collect();
        line.push_str(&format!("  [{}]", ids.join(", ")));
    }
    line
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("  convoke invite ({})", summary.run_id);
    println!("  {}", "-".repeat(50));

    for entry in &summary.entries {
        let (symbol, detail) = match &entry.state {
            InviteStatus::Sent => ("✓".green().to_string(), String::new()),
            InviteStatus::Failed(reason) => ("✗".red().to_string(), reason.red().to_string()),
            InviteStatus::Skipped(reason) => {
                ("-".yellow().to_string(), reason.dimmed().to_string())
            }
            other => ("?".normal().to_string(), other.to_string()),
        };
        println!("  {symbol} {:<24} {detail}", entry.target.id.as_str());
    }

    println!("  {}", "-".repeat(50));
    let status = match summary.status {
        RunStatus::Completed => summary.status.to_string().green(),
        RunStatus::Cancelled => summary.status.to_string().yellow(),
        _ => summary.status.to_string().red(),
    };
    println!(
        "  {status}: {} sent, {} failed, {} skipped",
        summary.sent, summary.failed, summary.skipped
    );
    println!();
}

#[cfg(test)]
mod tests {
    use convoke_core::TargetId;

    use super::*;

    #[test]
    fn progress_line_lists_in_flight() {
        let progress = ProgressSnapshot {
            sent: 2,
            failed: 1,
            in_flight: vec![TargetId::new("usr_9")],
            ..ProgressSnapshot::idle()
        };
        let line = progress_line(&progress);
        assert!(line.starts_with("sent 2  failed 1  skipped 0"));
        assert!(line.ends_with("[usr_9]"));
    }

    #[tokio::test]
    async fn file_mode_without_path_is_a_config_error() {
        let mut config = ConvokeConfig::default();
        config.source.mode = SourceMode::File;
        let err = resolve_request(&config, &InviteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvokeError::Config(_)));
    }

    #[tokio::test]
    async fn roster_flag_selects_instance_mode() {
        let opts = InviteOptions {
            roster: Some(PathBuf::from("roster.json")),
            ..InviteOptions::default()
        };
        let request = resolve_request(&ConvokeConfig::default(), &opts).await.unwrap();
        assert_eq!(request, TargetRequest::Instance);
    }

    #[tokio::test]
    async fn dry_run_invites_every_listed_target() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("targets.txt");
        std::fs::write(&list, "alice\nbob\nAlice\n").unwrap();

        let opts = InviteOptions {
            file: Some(list),
            group: Some("grp_cli".into()),
            delay: Some(0.0),
            json: true,
            ..InviteOptions::default()
        };
        let summary = run_invite(&ConvokeConfig::default(), opts).await.unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.sent, 2);
    }

    #[tokio::test]
    async fn missing_group_is_rejected() {
        let err = run_invite(&ConvokeConfig::default(), InviteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvokeError::Config(_)));
    }
}
