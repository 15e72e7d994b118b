// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook bus for extensions that observe invite dispatches.
//!
//! Extensions register callbacks for the [`HookPhase::PreInvite`] and
//! [`HookPhase::PostInvite`] phases. The bus runs every registered hook for
//! a phase, logging and swallowing errors and panics so that no extension
//! can abort or stall a run.

pub mod bus;
pub mod hook;

pub use bus::{HookBus, HookReport};
pub use hook::{FnHook, HookError, HookPhase, InviteHook};
