//! The single background worker loop: one job at a time,
//! dispatched by type, with retry/fail bookkeeping delegated back to the
//! state store.

use crate::orchestrate::{Destroyer, Provisioner, StaticProvisioner};
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use wpfleet_core::models::JobType;

pub struct Worker {
    store: Arc<Store>,
    provisioner: Arc<Provisioner>,
    static_provisioner: Arc<StaticProvisioner>,
    destroyer: Arc<Destroyer>,
    poll_interval: Duration,
    stuck_job_timeout_minutes: i64,
}

impl Worker {
    pub fn new(
        store: Arc<Store>,
        provisioner: Arc<Provisioner>,
        static_provisioner: Arc<StaticProvisioner>,
        destroyer: Arc<Destroyer>,
        poll_interval: Duration,
        stuck_job_timeout_minutes: i64,
    ) -> Self {
        Self {
            store,
            provisioner,
            static_provisioner,
            destroyer,
            poll_interval,
            stuck_job_timeout_minutes,
        }
    }

    /// Runs forever. Intended to be `tokio::spawn`ed once from `main`.
    pub async fn run(self) {
        let recovered = self
            .store
            .recover_stuck_jobs(self.stuck_job_timeout_minutes)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to recover stuck jobs at startup");
                0
            });
        if recovered > 0 {
            info!(recovered, "recovered jobs stuck in PROCESSING at startup");
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "worker tick failed unexpectedly");
            }
        }
    }

    async fn tick(&self) -> wpfleet_core::Result<()> {
        let Some(job) = self.store.claim_next_job().await? else {
            return Ok(());
        };

        info!(job_id = %job.id, job_type = %job.job_type, site_id = %job.site_id, "dispatching job");

        let result = self.dispatch(&job).await;

        match result {
            Ok(()) => {
                self.store.complete_job(&job.id, &job.site_id, job.job_type).await?;
                info!(job_id = %job.id, "job completed");
            }
            Err(err) => {
                if job.attempts >= job.max_attempts {
                    warn!(job_id = %job.id, attempts = job.attempts, "job permanently failed");
                    self.store.fail_job(&job.id, &err.to_string()).await?;
                } else {
                    warn!(job_id = %job.id, attempts = job.attempts, error = %err, "job failed, will retry");
                    self.store.retry_job(&job.id, &err.to_string()).await?;
                }
            }
        }

        Ok(())
    }

    async fn dispatch(&self, job: &wpfleet_core::models::Job) -> wpfleet_core::Result<()> {
        let site = self.store.get_site(&job.site_id).await?;
        match job.job_type {
            JobType::Provision => self.provisioner.run(&job.site_id, &site.domain).await,
            JobType::StaticProvision => {
                let staged_path = job
                    .payload
                    .as_deref()
                    .ok_or_else(|| {
                        wpfleet_core::Error::InvariantViolation(
                            "static provision job has no staged archive path in its payload".to_string(),
                        )
                    })?;
                self.static_provisioner.run(&job.site_id, &site.domain, staged_path).await
            }
            JobType::Destroy => self.destroyer.run(&job.site_id).await,
        }
    }
}
