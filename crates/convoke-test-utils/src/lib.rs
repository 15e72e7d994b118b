// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Convoke.
//!
//! - [`ScriptedPlatform`]: a platform client with per-target scripted replies,
//!   simulated latency and in-flight tracking.
//! - [`TestHarness`]: a run controller wired to a scripted platform and a
//!   session, for end-to-end tests.

pub mod harness;
pub mod scripted_platform;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use scripted_platform::{ScriptedPlatform, ScriptedReply};
