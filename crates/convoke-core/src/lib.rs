// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Convoke invite orchestration engine.
//!
//! This crate provides the data model shared by every other crate in the
//! workspace (targets, invite states, run configuration and status), the
//! error taxonomy, and the traits through which the engine talks to its
//! external collaborators: the platform API client and the session handle
//! supplied by the credential store.

pub mod error;
pub mod session;
pub mod traits;
pub mod types;

pub use error::{ConvokeError, DispatchError};
pub use session::SessionHandle;
pub use traits::PlatformClient;
pub use types::{
    GroupExclusions, GroupId, InviteResponse, InviteStatus, InviteTarget, RosterMember,
    RunConfig, RunStatus, TargetId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convoke_error_has_all_variants() {
        let _config = ConvokeError::Config("test".into());
        let _source = ConvokeError::SourceUnavailable("no session".into());
        let _list = ConvokeError::InvalidTargetList {
            line: 3,
            content: "bad entry".into(),
        };
        let _auth = ConvokeError::NotAuthenticated;
        let _busy = ConvokeError::RunInProgress;
        let _platform = ConvokeError::Platform {
            message: "test".into(),
            source: Some(Box::new(std::io::Error::other("test"))),
        };
        let _timeout = ConvokeError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = ConvokeError::Internal("test".into());
    }

    #[test]
    fn run_status_display_and_parse() {
        use std::str::FromStr;

        let variants = [
            RunStatus::Idle,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Cancelled,
            RunStatus::Aborted,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = RunStatus::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn all_collaborator_traits_are_exported() {
        fn _assert_platform_client<T: PlatformClient>() {}
    }
}
