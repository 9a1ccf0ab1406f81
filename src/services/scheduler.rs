//! Periodic refresh/classify/rotate loop.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::PolicySet;
use crate::services::credential_engine::CredentialEngine;

/// Re-reads the policy document; called at the start of every tick.
pub type PolicySource = Box<dyn Fn() -> DomainResult<PolicySet> + Send + Sync>;

/// Counters returned when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Cycles run, failed ones included.
    pub cycles: u64,
    /// Cycles that returned a non-fatal error.
    pub failed_cycles: u64,
    /// Policy reloads that failed validation; the old policy stayed active.
    pub rejected_reloads: u64,
}

/// Runs [`CredentialEngine::run_cycle`] on a fixed interval.
pub struct Scheduler {
    engine: Arc<CredentialEngine>,
    interval: Duration,
    policy_source: Option<PolicySource>,
}

impl Scheduler {
    /// Scheduler ticking every `interval`.
    pub fn new(engine: Arc<CredentialEngine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            policy_source: None,
        }
    }

    /// Reload policy from `source` before each cycle.
    #[must_use]
    pub fn with_policy_source(mut self, source: PolicySource) -> Self {
        self.policy_source = Some(source);
        self
    }

    /// Run until `cancel` fires. The first cycle starts immediately.
    ///
    /// Non-fatal cycle errors are logged and the loop keeps going; a fatal one
    /// (audit log or record store unavailable) stops the scheduler.
    pub async fn run(&self, cancel: CancellationToken) -> DomainResult<SchedulerStats> {
        let mut stats = SchedulerStats::default();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.reload_policy(&mut stats);

            let started = Instant::now();
            stats.cycles += 1;
            match self.engine.run_cycle(&cancel).await {
                Ok(report) => info!(
                    cycle = stats.cycles,
                    duration_ms = started.elapsed().as_millis() as u64,
                    failed_providers = report.refresh.failed.len(),
                    "cycle finished"
                ),
                Err(err) if err.is_fatal() => {
                    error!(cycle = stats.cycles, error = %err, "fatal error, stopping scheduler");
                    return Err(err);
                }
                Err(err) => {
                    stats.failed_cycles += 1;
                    warn!(cycle = stats.cycles, error = %err, "cycle failed");
                }
            }
        }

        info!(cycles = stats.cycles, "scheduler stopped");
        Ok(stats)
    }

    fn reload_policy(&self, stats: &mut SchedulerStats) {
        let Some(source) = &self.policy_source else {
            return;
        };
        match source() {
            Ok(policies) => self.engine.reload_policy(policies),
            Err(err) => {
                stats.rejected_reloads += 1;
                error!(error = %err, "policy reload rejected, keeping previous policy");
            }
        }
    }
}
