// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits implemented outside the engine.
//!
//! All collaborators use `#[async_trait]` for dynamic dispatch compatibility.

pub mod platform;

pub use platform::PlatformClient;
