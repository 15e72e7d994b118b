// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated session handle supplied by the credential store.
//!
//! The engine never reads or refreshes credentials. It carries the handle
//! from `start` to the platform client and uses the caller's identifier to
//! avoid inviting themselves.

use secrecy::SecretString;

use crate::types::TargetId;

/// An authenticated platform session owned by the surrounding application.
#[derive(Debug)]
pub struct SessionHandle {
    user_id: TargetId,
    display_name: String,
    token: SecretString,
}

impl SessionHandle {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        token: SecretString,
    ) -> Self {
        Self {
            user_id: TargetId::new(user_id),
            display_name: display_name.into(),
            token,
        }
    }

    /// Identifier of the logged-in user.
    pub fn user_id(&self) -> &TargetId {
        &self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Opaque credential for the platform client. Never logged.
    pub fn token(&self) -> &SecretString {
        &self.token
    }
}
