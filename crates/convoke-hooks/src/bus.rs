// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hook bus: per-phase hook lists with isolated invocation.
//!
//! Hooks run sequentially in registration order. A hook that returns an
//! error or panics is logged at `warn` and the remaining hooks still run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use convoke_core::InviteTarget;
use futures::FutureExt;
use tracing::{debug, warn};

use crate::hook::{HookError, HookPhase, InviteHook};

/// Outcome of invoking every hook for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookReport {
    pub invoked: usize,
    pub failed: usize,
}

/// Registry of hooks keyed by phase.
///
/// Cloning is cheap: hooks are shared behind `Arc`. The run controller
/// freezes a clone at run start, so registration changes never affect a
/// run in progress.
#[derive(Clone, Default)]
pub struct HookBus {
    pre_invite: Vec<Arc<dyn InviteHook>>,
    post_invite: Vec<Arc<dyn InviteHook>>,
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookBus")
            .field("pre_invite", &self.names(HookPhase::PreInvite))
            .field("post_invite", &self.names(HookPhase::PostInvite))
            .finish()
    }
}

impl HookBus {
    /// Create a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for the given phase.
    pub fn register(&mut self, phase: HookPhase, hook: Arc<dyn InviteHook>) {
        debug!(phase = %phase, hook = hook.name(), "hook registered");
        self.hooks_mut(phase).push(hook);
    }

    /// Names of the hooks registered for a phase, in invocation order.
    pub fn names(&self, phase: HookPhase) -> Vec<String> {
        self.hooks(phase)
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Remove every registered hook.
    pub fn clear(&mut self) {
        self.pre_invite.clear();
        self.post_invite.clear();
    }

    /// Total number of registered hooks across phases.
    pub fn len(&self) -> usize {
        self.pre_invite.len() + self.post_invite.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every hook registered for `phase`.
    ///
    /// Never fails: errors and panics are logged and counted in the report.
    pub async fn invoke(&self, phase: HookPhase, target: &InviteTarget) -> HookReport {
        let mut report = HookReport::default();

        for hook in self.hooks(phase) {
            report.invoked += 1;
            let outcome = AssertUnwindSafe(hook.call(phase, target))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(HookError::Panicked(panic_message(payload))));

            if let Err(e) = outcome {
                report.failed += 1;
                warn!(
                    phase = %phase,
                    hook = hook.name(),
                    target = %target.id,
                    error = %e,
                    "hook failed, continuing"
                );
            }
        }

        report
    }

    fn hooks(&self, phase: HookPhase) -> &[Arc<dyn InviteHook>] {
        match phase {
            HookPhase::PreInvite => &self.pre_invite,
            HookPhase::PostInvite => &self.post_invite,
        }
    }

    fn hooks_mut(&mut self, phase: HookPhase) -> &mut Vec<Arc<dyn InviteHook>> {
        match phase {
            HookPhase::PreInvite => &mut self.pre_invite,
            HookPhase::PostInvite => &mut self.post_invite,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
