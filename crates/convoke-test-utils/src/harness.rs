// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end run testing.
//!
//! `TestHarness` wires a [`RunController`] to a [`ScriptedPlatform`] and an
//! authenticated session, and offers one-call helpers that start a run and
//! wait for its summary.

use std::sync::Arc;
use std::time::Duration;

use convoke_core::{ConvokeError, GroupId, RunConfig, SessionHandle};
use convoke_engine::{RunController, RunHandle, RunSummary, SourceOptions, TargetRequest};
use convoke_hooks::{HookPhase, InviteHook};
use secrecy::SecretString;

use crate::scripted_platform::ScriptedPlatform;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    platform: ScriptedPlatform,
    config: RunConfig,
    options: SourceOptions,
    user_id: String,
    authenticated: bool,
    hooks: Vec<(HookPhase, Arc<dyn InviteHook>)>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            platform: ScriptedPlatform::new(),
            config: RunConfig::new(GroupId::new("grp_test")),
            options: SourceOptions::default(),
            user_id: "usr_self".to_string(),
            authenticated: true,
            hooks: Vec::new(),
        }
    }

    pub fn with_platform(mut self, platform: ScriptedPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config = self.config.with_workers(workers);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config = self.config.with_delay(delay);
        self
    }

    pub fn with_source_options(mut self, options: SourceOptions) -> Self {
        self.options = options;
        self
    }

    /// Identifier of the logged-in user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Start runs without a session.
    pub fn unauthenticated(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn with_hook(mut self, phase: HookPhase, hook: Arc<dyn InviteHook>) -> Self {
        self.hooks.push((phase, hook));
        self
    }

    pub fn build(self) -> Result<TestHarness, ConvokeError> {
        let platform = Arc::new(self.platform);
        let controller = RunController::new(platform.clone(), self.options);
        for (phase, hook) in self.hooks {
            controller.register_hook(phase, hook)?;
        }

        let session = self.authenticated.then(|| {
            Arc::new(SessionHandle::new(
                self.user_id.clone(),
                "Test User",
                SecretString::from("test-token".to_string()),
            ))
        });

        Ok(TestHarness {
            controller,
            platform,
            session,
            config: self.config,
        })
    }
}

/// A controller, its scripted platform, and a session.
pub struct TestHarness {
    pub controller: RunController,
    pub platform: Arc<ScriptedPlatform>,
    pub session: Option<Arc<SessionHandle>>,
    pub config: RunConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Starts a run with the harness configuration.
    pub async fn start(&self, request: TargetRequest) -> Result<RunHandle, ConvokeError> {
        self.controller
            .start(self.session.clone(), self.config.clone(), request)
            .await
    }

    /// Runs a file-mode target list to completion.
    pub async fn run_list(&self, payload: &str) -> Result<RunSummary, ConvokeError> {
        self.start(TargetRequest::File {
            payload: payload.to_string(),
        })
        .await?
        .wait()
        .await
    }

    /// Runs against the scripted roster to completion.
    pub async fn run_instance(&self) -> Result<RunSummary, ConvokeError> {
        self.start(TargetRequest::Instance).await?.wait().await
    }
}
