//! Interval polling of the task views.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::monitor::{TaskMonitor, TaskMonitorSnapshot, TaskViews};

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub views: TaskViews,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            views: TaskViews::EVERYTHING,
        }
    }
}

/// Handle to a running poll loop. Dropping it also ends the loop.
pub struct PollHandle {
    shutdown_tx: mpsc::Sender<()>,
    updates: watch::Receiver<Option<TaskMonitorSnapshot>>,
    join: JoinHandle<()>,
}

impl PollHandle {
    /// Receiver of the snapshot taken after every completed refresh.
    pub fn updates(&self) -> watch::Receiver<Option<TaskMonitorSnapshot>> {
        self.updates.clone()
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "Task poll loop ended abnormally");
        }
    }
}

impl TaskMonitor {
    /// Refresh `config.views` every `config.interval` until the handle is stopped or
    /// dropped. The first refresh runs immediately.
    pub fn start_polling(self: Arc<Self>, config: PollConfig) -> PollHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (updates_tx, updates) = watch::channel(None);

        let join = tokio::spawn(async move {
            self.poll_loop(config, shutdown_rx, updates_tx).await;
        });

        PollHandle {
            shutdown_tx,
            updates,
            join,
        }
    }

    async fn poll_loop(
        &self,
        config: PollConfig,
        mut shutdown_rx: mpsc::Receiver<()>,
        updates_tx: watch::Sender<Option<TaskMonitorSnapshot>>,
    ) {
        tracing::info!(
            interval_ms = config.interval.as_millis() as u64,
            "Task poll loop started"
        );

        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task poll loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.refresh(config.views).await;
                    let snapshot = self.snapshot().await;
                    updates_tx.send_replace(Some(snapshot));
                }
            }
        }
    }
}
