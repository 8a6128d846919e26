//! One repeating task per active configuration.
//!
//! Each schedule owns a cancellation token and the task's join handle. Ticks
//! of different configurations run concurrently; a slow tick only delays its
//! own configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineResult;

use super::engine::TickReport;

/// Work performed on every tick of a configuration's schedule.
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    async fn tick(&self, config_id: &str, cancel: &CancellationToken) -> EngineResult<TickReport>;
}

struct Schedule {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    interval: Duration,
}

/// Registry of running schedules keyed by configuration id.
pub struct Scheduler {
    handler: Arc<dyn TickHandler>,
    schedules: HashMap<String, Schedule>,
}

impl Scheduler {
    pub fn new(handler: Arc<dyn TickHandler>) -> Self {
        Self {
            handler,
            schedules: HashMap::new(),
        }
    }

    /// Start ticking `config_id` every `every`, first tick immediately.
    ///
    /// Returns false if the configuration was already scheduled.
    pub fn start(&mut self, config_id: &str, every: Duration) -> bool {
        if self.schedules.contains_key(config_id) {
            debug!(config_id = %config_id, "Already scheduled");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_schedule(
            self.handler.clone(),
            config_id.to_string(),
            every,
            cancel.clone(),
        ));

        self.schedules.insert(
            config_id.to_string(),
            Schedule {
                cancel,
                task,
                interval: every,
            },
        );

        info!(config_id = %config_id, interval_ms = every.as_millis() as u64, "Schedule started");
        true
    }

    /// Cancel a schedule and wait for its in-flight tick to finish.
    ///
    /// Returns false if nothing was scheduled.
    pub async fn stop(&mut self, config_id: &str) -> bool {
        let Some(schedule) = self.schedules.remove(config_id) else {
            return false;
        };

        schedule.cancel.cancel();
        if let Err(e) = schedule.task.await {
            error!(config_id = %config_id, error = %e, "Schedule task ended abnormally");
        }

        info!(config_id = %config_id, "Schedule stopped");
        true
    }

    /// Stop every schedule, waiting for all in-flight ticks.
    pub async fn stop_all(&mut self) {
        let schedules: Vec<(String, Schedule)> = self.schedules.drain().collect();

        for (_, schedule) in &schedules {
            schedule.cancel.cancel();
        }

        let results =
            futures::future::join_all(schedules.into_iter().map(|(id, s)| async move {
                (id, s.task.await)
            }))
            .await;

        for (config_id, result) in results {
            if let Err(e) = result {
                error!(config_id = %config_id, error = %e, "Schedule task ended abnormally");
            }
        }
    }

    pub fn interval_of(&self, config_id: &str) -> Option<Duration> {
        self.schedules.get(config_id).map(|s| s.interval)
    }

    pub fn scheduled_ids(&self) -> Vec<String> {
        self.schedules.keys().cloned().collect()
    }
}

async fn run_schedule(
    handler: Arc<dyn TickHandler>,
    config_id: String,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match handler.tick(&config_id, &cancel).await {
            Ok(report) => debug!(
                config_id = %config_id,
                fired = report.conditions_fired,
                opened = report.trades_opened,
                closed = report.trades_closed,
                errors = report.errors,
                "Tick complete"
            ),
            Err(e) if e.is_recoverable() => {
                warn!(config_id = %config_id, error = %e, "Tick failed")
            }
            Err(e) => {
                error!(config_id = %config_id, error = %e, "Tick failed, ending schedule");
                break;
            }
        }
    }

    debug!(config_id = %config_id, "Schedule loop exited");
}
