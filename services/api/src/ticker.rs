//! services/api/src/ticker.rs
//!
//! Keeps the streak current while the server runs by ticking the Progress
//! Engine on a fixed cadence.

use luna_core::ProgressEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawns the ticker. It stops when `token` is cancelled.
pub fn spawn_progress_ticker(
    progress: Arc<Mutex<ProgressEngine>>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the caller has just loaded.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Progress ticker stopped.");
                    break;
                }
                _ = interval.tick() => {
                    let changed = progress.lock().await.tick().await;
                    if changed {
                        debug!("Progress tick updated the streak.");
                    }
                }
            }
        }
    })
}
