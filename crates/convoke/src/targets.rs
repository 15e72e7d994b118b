// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `convoke targets` command implementation.

use std::path::Path;

use convoke_config::ConvokeConfig;
use convoke_core::{ConvokeError, InviteTarget};
use convoke_engine::{TargetRequest, parse_target_list};

/// Parses a target list and prints the deduplicated identifiers.
pub async fn run_targets(
    config: &ConvokeConfig,
    file: &Path,
    json: bool,
) -> Result<(), ConvokeError> {
    let targets = load_targets(file, config.source.strict).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&targets).unwrap_or_else(|_| "[]".to_string())
        );
    } else {
        for target in &targets {
            println!("{}", target.id);
        }
        eprintln!("{} target(s)", targets.len());
    }
    Ok(())
}

async fn load_targets(file: &Path, strict: bool) -> Result<Vec<InviteTarget>, ConvokeError> {
    match TargetRequest::from_file(file).await? {
        TargetRequest::File { payload } => parse_target_list(&payload, strict),
        TargetRequest::Instance => Ok(Vec::new()),
    }
}
