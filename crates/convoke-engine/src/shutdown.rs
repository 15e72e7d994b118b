// SPDX-FileCopyrightText: 2026 Convoke Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal-driven cancellation.
//!
//! SIGINT (Ctrl+C) and SIGTERM request cancellation of the controller's
//! current run. In-flight invite calls still finish; the run then settles
//! in `Cancelled`.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::RunController;

/// Waits for SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (Ctrl+C)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot install SIGTERM handler, listening for Ctrl+C only");
                if ctrl_c.await.is_ok() {
                    info!("received SIGINT (Ctrl+C)");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if ctrl_c.await.is_ok() {
            info!("received Ctrl+C");
        }
    }
}

/// Spawns a task that cancels the controller's run on the first signal.
///
/// Abort the returned handle once the run has finished.
pub fn cancel_on_signal(controller: RunController) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        if controller.cancel() {
            info!("run cancellation requested by signal");
        } else {
            debug!("signal received with no run in progress");
        }
    })
}
