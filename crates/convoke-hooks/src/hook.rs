// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook trait, phases, and a closure adapter.

use async_trait::async_trait;
use convoke_core::InviteTarget;
use strum::Display;
use thiserror::Error;

/// Point in the dispatch sequence at which a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum HookPhase {
    /// After the target is marked pending, before the invite call.
    PreInvite,
    /// After a successful invite.
    PostInvite,
}

/// Failure reported by (or on behalf of) a hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Failed(String),

    #[error("hook panicked: {0}")]
    Panicked(String),
}

impl HookError {
    pub fn failed(message: impl Into<String>) -> Self {
        HookError::Failed(message.into())
    }
}

/// An extension callback invoked around invite dispatches.
///
/// Hooks only observe targets; they have no access to invite state.
#[async_trait]
pub trait InviteHook: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn call(&self, phase: HookPhase, target: &InviteTarget) -> Result<(), HookError>;
}

/// Adapts a synchronous closure into an [`InviteHook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(HookPhase, &InviteTarget) -> Result<(), HookError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> InviteHook for FnHook<F>
where
    F: Fn(HookPhase, &InviteTarget) -> Result<(), HookError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, phase: HookPhase, target: &InviteTarget) -> Result<(), HookError> {
        (self.f)(phase, target)
    }
}
