// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Convoke - group invites for everyone in your instance.
//!
//! This is the binary entry point. It runs the invite engine against a
//! dry-run platform client; the real platform client and credential store
//! plug in through `convoke_core::PlatformClient` and `SessionHandle`.

mod dry_run;
mod invite;
mod targets;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use convoke_config::ConvokeConfig;

use crate::invite::InviteOptions;

/// Convoke - group invites for everyone in your instance.
#[derive(Parser, Debug)]
#[command(name = "convoke", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse a target list and print the deduplicated targets.
    Targets {
        /// Plain-text list, one username per line.
        #[arg(long)]
        file: PathBuf,
        /// Output JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run an invite pass against the dry-run platform client.
    Invite {
        /// Plain-text target list (file mode).
        #[arg(long, conflicts_with = "roster")]
        file: Option<PathBuf>,
        /// JSON roster of the current instance (instance mode).
        #[arg(long)]
        roster: Option<PathBuf>,
        /// Group to invite into; overrides run.group_id.
        #[arg(long)]
        group: Option<String>,
        /// Number of concurrent workers; overrides run.workers.
        #[arg(long)]
        workers: Option<usize>,
        /// Seconds each worker waits between invites; overrides run.delay_secs.
        #[arg(long)]
        delay: Option<f64>,
        /// Simulated latency of each dry-run invite call, in milliseconds.
        #[arg(long)]
        latency_ms: Option<u64>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => convoke_config::load_and_validate_path(path),
        None => convoke_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            convoke_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);

    let result = match cli.command {
        Some(Commands::Targets { file, json }) => targets::run_targets(&config, &file, json).await,
        Some(Commands::Invite {
            file,
            roster,
            group,
            workers,
            delay,
            latency_ms,
            json,
            plain,
        }) => {
            let opts = InviteOptions {
                file,
                roster,
                group,
                workers,
                delay,
                latency_ms,
                json,
                plain,
            };
            invite::run_invite(&config, opts).await.map(|_| ())
        }
        Some(Commands::Config) => {
            print_config(&config);
            Ok(())
        }
        None => {
            println!("convoke: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_config(config: &ConvokeConfig) {
    match toml::to_string_pretty(config) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => eprintln!("error: cannot render configuration: {e}"),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("convoke={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
