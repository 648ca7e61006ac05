//! Liveness watchdog
//!
//! A periodic task that reads the active handle's missed-heartbeat counter
//! and reports a [`LivenessFailure`] to the owner's crash callback once the
//! count exceeds the manager's threshold. It never touches in-flight chat
//! requests and never reloads; recovery belongs to whoever owns the session.
//!
//! The task is owned by the [`LivenessWatchdog`] value and is aborted when
//! that value is stopped or dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::session::manager::EngineHandleManager;

/// Period between checks
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

/// Delivered to the crash callback when the engine stops answering
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessFailure {
    pub model_id: Option<String>,
    pub missed_heartbeats: u32,
    pub threshold: u32,
    pub detected_at: DateTime<Utc>,
}

impl std::fmt::Display for LivenessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "engine for {} missed {} heartbeats (threshold {})",
            self.model_id.as_deref().unwrap_or("<none>"),
            self.missed_heartbeats,
            self.threshold
        )
    }
}

pub type CrashCallback = Arc<dyn Fn(LivenessFailure) + Send + Sync>;

pub struct LivenessWatchdog {
    task: Option<JoinHandle<()>>,
}

impl LivenessWatchdog {
    /// Starts checking `manager` every `period`. The first check runs one full
    /// period after spawning. Must be called inside a tokio runtime.
    pub fn spawn(
        manager: Arc<EngineHandleManager>,
        period: Duration,
        on_crash: CrashCallback,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Some(failure) = Self::check(&manager) {
                    tracing::warn!("Engine liveness failure: {}", failure);
                    on_crash(failure);
                }
            }
        });

        tracing::debug!("Liveness watchdog started ({:?} period)", period);
        Self { task: Some(task) }
    }

    /// One liveness check
    pub fn check(manager: &EngineHandleManager) -> Option<LivenessFailure> {
        let missed = manager.missed_heartbeats();
        let threshold = manager.heartbeat_threshold();
        (missed > threshold).then(|| LivenessFailure {
            model_id: manager.current_model_id(),
            missed_heartbeats: missed,
            threshold,
            detected_at: Utc::now(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Liveness watchdog stopped");
        }
    }
}

impl Drop for LivenessWatchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
