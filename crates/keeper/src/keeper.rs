use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use tierflow_engine::{MemoryStore, RewardsEngine};
use tierflow_types::{HealthReport, JobRun, PoolDistribution, PoolId, YearMonth};

use crate::config::KeeperConfig;
use crate::error::{KeeperError, KeeperResult};

/// Batch job kinds ticked by [`Keeper::run_until`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Settlement,
    Rollup,
    Reconciliation,
}

/// Runs the engine's batch jobs against a snapshot-backed store
pub struct Keeper {
    engine: RewardsEngine<MemoryStore>,
    config: KeeperConfig,
    iteration: u64,
}

impl Keeper {
    /// Load the snapshot named in `config` (or start empty) and build the engine
    pub fn open(config: KeeperConfig) -> KeeperResult<Self> {
        config.validate()?;
        let store = MemoryStore::load_or_default(&config.snapshot_path)?;
        let engine = RewardsEngine::new(store, config.engine.clone())?;

        info!(snapshot = %config.snapshot_path.display(), "keeper opened");
        Ok(Self { engine, config, iteration: 0 })
    }

    pub fn engine(&self) -> &RewardsEngine<MemoryStore> {
        &self.engine
    }

    pub fn config(&self) -> &KeeperConfig {
        &self.config
    }

    /// Settle due and pending installments, then persist
    pub async fn settle(&self, now: DateTime<Utc>) -> KeeperResult<JobRun> {
        let run = self.engine.run_installment_settlement(now)?;
        self.persist().await?;
        Ok(run)
    }

    /// Recompute monthly eligibility for `period`, then persist
    pub async fn rollup(&self, period: YearMonth, now: DateTime<Utc>) -> KeeperResult<JobRun> {
        let run = self.engine.run_monthly_rollup(period, now)?;
        self.persist().await?;
        Ok(run)
    }

    /// Audit the store, then persist any corrections
    pub async fn reconcile(&self, now: DateTime<Utc>) -> KeeperResult<HealthReport> {
        let report = self.engine.run_reconciliation(now)?;
        self.persist().await?;
        Ok(report)
    }

    /// Close and pay out a pool, then persist
    pub async fn distribute_pool(&self, pool: PoolId, now: DateTime<Utc>) -> KeeperResult<PoolDistribution> {
        let distribution = self.engine.distribute_pool(pool, now);
        // The job record is written even when distribution fails.
        self.persist().await?;
        Ok(distribution?)
    }

    /// Write the snapshot, retrying with backoff
    pub async fn persist(&self) -> KeeperResult<()> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.engine.store().save(&self.config.snapshot_path) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(attempt, delay_ms = delay, error = %e, "snapshot save failed, retrying");
                    time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run one job and persist its effects
    pub async fn tick(&self, job: Job, now: DateTime<Utc>) -> KeeperResult<()> {
        match job {
            Job::Settlement => {
                let run = self.settle(now).await?;
                info!(processed = run.processed, failed = run.failed, status = ?run.status, "settlement tick");
            }
            Job::Rollup => {
                let run = self.rollup(YearMonth::of(now), now).await?;
                info!(processed = run.processed, failed = run.failed, status = ?run.status, "rollup tick");
            }
            Job::Reconciliation => {
                let report = self.reconcile(now).await?;
                info!(score = report.score, findings = report.findings.len(), corrections = report.corrections, "reconciliation tick");
            }
        }
        Ok(())
    }

    /// Tick the batch jobs on their intervals until `shutdown` resolves.
    /// Returns the number of ticks run.
    pub async fn run_until<F>(&mut self, shutdown: F) -> KeeperResult<u64>
    where
        F: Future<Output = ()>,
    {
        let schedule = self.config.schedule.clone();
        let mut settlement = interval_secs(schedule.settlement_interval_secs);
        let mut rollup = interval_secs(schedule.rollup_interval_secs);
        let mut reconciliation = interval_secs(schedule.reconciliation_interval_secs);
        tokio::pin!(shutdown);

        info!(
            settlement_secs = schedule.settlement_interval_secs,
            rollup_secs = schedule.rollup_interval_secs,
            reconciliation_secs = schedule.reconciliation_interval_secs,
            "keeper loop started"
        );

        loop {
            let job = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(iterations = self.iteration, "shutdown requested, stopping keeper loop");
                    break;
                }
                _ = settlement.tick() => Job::Settlement,
                _ = rollup.tick() => Job::Rollup,
                _ = reconciliation.tick() => Job::Reconciliation,
            };

            self.iteration += 1;
            debug!(iteration = self.iteration, ?job, "starting keeper iteration");

            if let Err(e) = self.tick(job, Utc::now()).await {
                // Continue running even if individual iterations fail
                error!(iteration = self.iteration, ?job, error = %e, "keeper iteration failed");
            }

            if self.iteration % schedule.health_log_every == 0 {
                if let Err(e) = self.health_check() {
                    warn!(error = %e, "health check warning");
                }
            }
        }

        Ok(self.iteration)
    }

    /// Report the latest audit score; errors when the last audit left findings uncorrected
    pub fn health_check(&self) -> KeeperResult<()> {
        match self.engine.latest_health_report()? {
            Some(report) => {
                info!(iteration = self.iteration, score = report.score, "keeper health check");
                if report.is_healthy() {
                    Ok(())
                } else {
                    Err(KeeperError::JobFailed {
                        job: "reconciliation".to_string(),
                        reason: format!("score {} with uncorrected findings", report.score),
                    })
                }
            }
            None => {
                info!(iteration = self.iteration, "keeper health check: no audit recorded yet");
                Ok(())
            }
        }
    }
}

fn interval_secs(secs: u64) -> time::Interval {
    let mut interval = time::interval(Duration::from_secs(secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
