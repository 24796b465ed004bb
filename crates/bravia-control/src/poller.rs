//! Periodic state polling.
//!
//! Refreshes every control on an interval and publishes what it finds on the
//! event bus. Poll failures are logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::controls::{Control, ControlKind};
use crate::error::Result;
use crate::reconciler::StateReconciler;

/// Poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Time between polls
    pub interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_secs: 30 }
    }
}

/// Outcome of one poll pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollReport {
    pub polled: usize,
    pub failed: usize,
    pub powered: bool,
}

/// Background poller for one television.
pub struct StatePoller {
    config: PollerConfig,
    reconciler: StateReconciler,
    controls: Arc<Vec<Control>>,
    running: Arc<RwLock<bool>>,
    task_handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl StatePoller {
    pub fn new(reconciler: StateReconciler, controls: Vec<Control>, config: PollerConfig) -> Self {
        Self {
            config,
            reconciler,
            controls: Arc::new(controls),
            running: Arc::new(RwLock::new(false)),
            task_handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Poll every control once.
    pub async fn poll_once(&self) -> PollReport {
        poll_controls(&self.reconciler, &self.controls).await
    }

    /// Start polling in the background.
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let reconciler = self.reconciler.clone();
        let controls = self.controls.clone();
        let running_flag = self.running.clone();
        let poll_interval = Duration::from_secs(self.config.interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                {
                    let r = running_flag.read().await;
                    if !*r {
                        break;
                    }
                }

                let report = poll_controls(&reconciler, &controls).await;
                debug!(
                    polled = report.polled,
                    failed = report.failed,
                    powered = report.powered,
                    "poll finished"
                );
            }
        });

        let mut task = self.task_handle.write().await;
        *task = Some(handle);
    }

    /// Stop polling; an in-progress poll is abandoned.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        drop(running);

        let mut task = self.task_handle.write().await;
        if let Some(handle) = task.take() {
            drop(task);
            handle.abort();
            handle.await.ok();
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

async fn poll_controls(reconciler: &StateReconciler, controls: &[Control]) -> PollReport {
    let mut report = PollReport::default();

    report.powered = match reconciler.get_power().await {
        Ok(on) => on,
        Err(e) => {
            warn!(device = %reconciler.config().name, error = %e, "power poll failed");
            report.failed += 1;
            return report;
        }
    };
    report.polled += 1;

    if !report.powered {
        return report;
    }

    for control in controls {
        match poll_control(reconciler, control).await {
            Ok(()) => report.polled += 1,
            Err(e) => {
                warn!(control = %control.name, error = %e, "poll failed");
                report.failed += 1;
            }
        }
    }
    report
}

async fn poll_control(reconciler: &StateReconciler, control: &Control) -> Result<()> {
    match &control.kind {
        // Already polled above
        ControlKind::Power => Ok(()),
        ControlKind::Volume => reconciler.get_volume().await.map(|_| ()),
        ControlKind::Channel => reconciler.get_channel().await.map(|_| ()),
        ControlKind::Switch(_) => reconciler.get_switch(control).await.map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poller_config_default() {
        assert_eq!(PollerConfig::default().interval_secs, 30);
    }
}
