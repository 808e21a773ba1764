//! The durable state store: job queue plus site lifecycle
//! rows, with atomic claiming and transition enforcement. Every public
//! method either commits atomically or has no effect.

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use wpfleet_core::lifecycle;
use wpfleet_core::models::{Job, JobStatus, JobType, Site, SiteStatus, DEFAULT_MAX_ATTEMPTS};
use wpfleet_core::{Error, Result};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(dsn: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Build a store around an already-open pool (used in tests with an
    /// in-memory database that must stay on a single connection).
    pub async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // ---- Sites ---------------------------------------------------------

    pub async fn get_site(&self, id: &str) -> Result<Site> {
        let row = sqlx::query(
            "SELECT id, domain, custom_domain, status, job_id, created_at, updated_at \
             FROM sites WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        match row {
            Some(row) => Ok(row_to_site(&row)?),
            None => Err(Error::SiteNotFound(id.to_string())),
        }
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query(
            "SELECT id, domain, custom_domain, status, job_id, created_at, updated_at \
             FROM sites ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        rows.iter().map(row_to_site).collect()
    }

    /// Creates a new site row, or updates the mutable fields of an existing
    /// one whose status is unchanged. A status change must go through
    /// [`Store::transition_site`] instead — this never bypasses the
    /// transition matrix.
    pub async fn upsert_site(
        &self,
        id: &str,
        domain: &str,
        status: SiteStatus,
        job_id: Option<&str>,
    ) -> Result<Site> {
        let existing = sqlx::query("SELECT status FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;

        if let Some(row) = &existing {
            let current: SiteStatus = row.try_get("status").map_err(|e| Error::adapter("store", e))?;
            if current != status {
                return Err(Error::InvariantViolation(format!(
                    "upsert_site called with a status change ({current} -> {status}); use transition_site"
                )));
            }

            sqlx::query("UPDATE sites SET domain = ?, job_id = ?, updated_at = ? WHERE id = ?")
                .bind(domain)
                .bind(job_id)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::adapter("store", e))?;
        } else {
            let now = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO sites (id, domain, custom_domain, status, job_id, created_at, updated_at) \
                 VALUES (?, ?, NULL, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(domain)
            .bind(status)
            .bind(job_id)
            .bind(&now)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        }

        self.get_site(id).await
    }

    /// Atomically reads the current status, checks `can_transition_to`,
    /// and writes the target — all within one transaction so two
    /// concurrent callers can never both observe the same "from" state and
    /// both succeed.
    pub async fn transition_site(&self, id: &str, target: SiteStatus) -> Result<Site> {
        let mut tx = self.pool.begin().await.map_err(|e| Error::adapter("store", e))?;

        let row = sqlx::query("SELECT status FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Error::adapter("store", e))?
            .ok_or_else(|| Error::SiteNotFound(id.to_string()))?;

        let current: SiteStatus = row.try_get("status").map_err(|e| Error::adapter("store", e))?;

        if !lifecycle::can_transition_to(current, target) {
            return Err(Error::InvalidTransition { from: current, to: target });
        }

        sqlx::query("UPDATE sites SET status = ?, updated_at = ? WHERE id = ?")
            .bind(target)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("store", e))?;

        tx.commit().await.map_err(|e| Error::adapter("store", e))?;

        self.get_site(id).await
    }

    pub async fn set_custom_domain(&self, id: &str, domain: Option<&str>) -> Result<Site> {
        sqlx::query("UPDATE sites SET custom_domain = ?, updated_at = ? WHERE id = ?")
            .bind(domain)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        self.get_site(id).await
    }

    pub async fn set_site_job(&self, id: &str, job_id: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE sites SET job_id = ?, updated_at = ? WHERE id = ?")
            .bind(job_id)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        Ok(())
    }

    /// Fails with [`Error::DomainTaken`] if any other, non-destroyed site
    /// currently holds this custom domain.
    pub async fn ensure_domain_available(&self, domain: &str, site_id: &str) -> Result<()> {
        let row = sqlx::query(
            "SELECT id FROM sites WHERE custom_domain = ? AND id != ? AND status != 'DESTROYED'",
        )
        .bind(domain)
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        if row.is_some() {
            return Err(Error::DomainTaken(domain.to_string()));
        }
        Ok(())
    }

    /// Gated on the row currently being `DESTROYED`.
    pub async fn hard_delete_site(&self, id: &str) -> Result<()> {
        let site = self.get_site(id).await?;
        if site.status != SiteStatus::Destroyed {
            return Err(Error::Conflict(format!(
                "site '{id}' is not DESTROYED (currently {})",
                site.status
            )));
        }
        sqlx::query("DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        Ok(())
    }

    // ---- Jobs -----------------------------------------------------------

    pub async fn insert_job(&self, job_type: JobType, site_id: &str, payload: Option<&str>) -> Result<Job> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO jobs (id, job_type, site_id, status, attempts, max_attempts, last_error, payload, created_at, started_at, completed_at) \
             VALUES (?, ?, ?, ?, 0, ?, NULL, ?, ?, NULL, NULL)",
        )
        .bind(&id)
        .bind(job_type)
        .bind(site_id)
        .bind(JobStatus::Pending)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .bind(payload)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        self.get_job(&id).await
    }

    pub async fn get_job(&self, id: &str) -> Result<Job> {
        let row = sqlx::query(
            "SELECT id, job_type, site_id, status, attempts, max_attempts, last_error, payload, created_at, started_at, completed_at \
             FROM jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(Error::JobNotFound(id.to_string())),
        }
    }

    /// Returns true iff the site has a job in `PENDING` or `PROCESSING`.
    pub async fn has_active_job(&self, site_id: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 as present FROM jobs WHERE site_id = ? AND status IN ('PENDING', 'PROCESSING') LIMIT 1",
        )
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        Ok(row.is_some())
    }

    /// Atomically claims the oldest pending, retryable job. Never returns
    /// the same job to two concurrent callers: the whole read-check-write
    /// happens inside one `BEGIN IMMEDIATE` transaction, which takes
    /// SQLite's write lock up front rather than at first write, so a
    /// second concurrent claim blocks until the first commits and then
    /// observes the already-claimed row.
    pub async fn claim_next_job(&self) -> Result<Option<Job>> {
        let mut conn = self.pool.acquire().await.map_err(|e| Error::adapter("store", e))?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::adapter("store", e))?;

        let row = sqlx::query(
            "SELECT id FROM jobs WHERE status = 'PENDING' AND attempts < max_attempts \
             ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        let Some(row) = row else {
            sqlx::query("COMMIT").execute(&mut *conn).await.ok();
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(|e| Error::adapter("store", e))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE jobs SET status = 'PROCESSING', attempts = attempts + 1, \
             started_at = COALESCE(started_at, ?) WHERE id = ?",
        )
        .bind(&now)
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        sqlx::query("COMMIT").execute(&mut *conn).await.map_err(|e| Error::adapter("store", e))?;
        drop(conn);

        Ok(Some(self.get_job(&id).await?))
    }

    /// Completes a job and advances the site to the terminal state for its
    /// job type (`ACTIVE` for provision/static-provision, `DESTROYED` for
    /// destroy).
    pub async fn complete_job(&self, id: &str, site_id: &str, job_type: JobType) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'COMPLETED', last_error = NULL, completed_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        let target = match job_type {
            JobType::Provision | JobType::StaticProvision => SiteStatus::Active,
            JobType::Destroy => SiteStatus::Destroyed,
        };
        self.transition_site(site_id, target).await?;
        self.set_site_job(site_id, None).await?;
        Ok(())
    }

    /// Marks a job permanently `FAILED`. The site is left in its current
    /// non-terminal state so an operator can inspect it.
    pub async fn fail_job(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'FAILED', last_error = ?, completed_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;
        Ok(())
    }

    /// Resets a job to `PENDING` for the next poll. `attempts` is not
    /// reset — it was already incremented on claim.
    pub async fn retry_job(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = 'PENDING', last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        Ok(())
    }

    /// Resets any `PROCESSING` job whose `started_at` predates `timeout`
    /// back to `PENDING`, marking it recovered. Returns the count reset.
    /// Idempotent: a second call immediately after recovers zero jobs.
    pub async fn recover_stuck_jobs(&self, timeout_minutes: i64) -> Result<u64> {
        let cutoff = Utc::now() - chrono::Duration::minutes(timeout_minutes);
        let result = sqlx::query(
            "UPDATE jobs SET status = 'PENDING', last_error = 'recovered: was stuck in PROCESSING' \
             WHERE status = 'PROCESSING' AND started_at IS NOT NULL AND started_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::adapter("store", e))?;

        Ok(result.rows_affected())
    }

    /// Gated on the job not currently being `PENDING` or `PROCESSING`.
    pub async fn hard_delete_job(&self, id: &str) -> Result<()> {
        let job = self.get_job(id).await?;
        if matches!(job.status, JobStatus::Pending | JobStatus::Processing) {
            return Err(Error::Conflict(format!(
                "job '{id}' is still {:?}; cannot hard-delete an active job",
                job.status
            )));
        }
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::adapter("store", e))?;
        Ok(())
    }
}

fn row_to_site(row: &sqlx::sqlite::SqliteRow) -> Result<Site> {
    Ok(Site {
        id: row.try_get("id").map_err(|e| Error::adapter("store", e))?,
        domain: row.try_get("domain").map_err(|e| Error::adapter("store", e))?,
        custom_domain: row.try_get("custom_domain").map_err(|e| Error::adapter("store", e))?,
        status: row.try_get("status").map_err(|e| Error::adapter("store", e))?,
        job_id: row.try_get("job_id").map_err(|e| Error::adapter("store", e))?,
        created_at: parse_ts(row.try_get("created_at").map_err(|e| Error::adapter("store", e))?)?,
        updated_at: parse_ts(row.try_get("updated_at").map_err(|e| Error::adapter("store", e))?)?,
    })
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let started_at: Option<String> = row.try_get("started_at").map_err(|e| Error::adapter("store", e))?;
    let completed_at: Option<String> =
        row.try_get("completed_at").map_err(|e| Error::adapter("store", e))?;

    Ok(Job {
        id: row.try_get("id").map_err(|e| Error::adapter("store", e))?,
        job_type: row.try_get("job_type").map_err(|e| Error::adapter("store", e))?,
        site_id: row.try_get("site_id").map_err(|e| Error::adapter("store", e))?,
        status: row.try_get("status").map_err(|e| Error::adapter("store", e))?,
        attempts: row.try_get("attempts").map_err(|e| Error::adapter("store", e))?,
        max_attempts: row.try_get("max_attempts").map_err(|e| Error::adapter("store", e))?,
        last_error: row.try_get("last_error").map_err(|e| Error::adapter("store", e))?,
        payload: row.try_get("payload").map_err(|e| Error::adapter("store", e))?,
        created_at: parse_ts(row.try_get("created_at").map_err(|e| Error::adapter("store", e))?)?,
        started_at: started_at.map(|s| parse_ts(s)).transpose()?,
        completed_at: completed_at.map(|s| parse_ts(s)).transpose()?,
    })
}

fn parse_ts(s: String) -> Result<chrono::DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvariantViolation(format!("corrupt timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Store::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn insert_job_starts_pending_with_zero_attempts() {
        let store = test_store().await;
        store.upsert_site("mysite", "mysite.fleet.test", SiteStatus::Created, None).await.unwrap();
        let job = store.insert_job(JobType::Provision, "mysite", None).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn transition_site_rejects_illegal_edges() {
        let store = test_store().await;
        store.upsert_site("mysite", "mysite.fleet.test", SiteStatus::Created, None).await.unwrap();
        let err = store.transition_site("mysite", SiteStatus::Active).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn transition_site_applies_legal_edges() {
        let store = test_store().await;
        store.upsert_site("mysite", "mysite.fleet.test", SiteStatus::Created, None).await.unwrap();
        let site = store.transition_site("mysite", SiteStatus::Provisioning).await.unwrap();
        assert_eq!(site.status, SiteStatus::Provisioning);
    }

    #[tokio::test]
    async fn upsert_site_refuses_to_silently_change_status() {
        let store = test_store().await;
        store.upsert_site("mysite", "mysite.fleet.test", SiteStatus::Created, None).await.unwrap();
        let err = store
            .upsert_site("mysite", "mysite.fleet.test", SiteStatus::Active, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn claim_next_job_returns_oldest_pending_job_once() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.upsert_site("b", "b.fleet.test", SiteStatus::Created, None).await.unwrap();
        let first = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        let _second = store.insert_job(JobType::Provision, "b", None).await.unwrap();

        let claimed = store.claim_next_job().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Processing);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn claim_next_job_skips_jobs_at_max_attempts() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        for _ in 0..DEFAULT_MAX_ATTEMPTS {
            let claimed = store.claim_next_job().await.unwrap().unwrap();
            assert_eq!(claimed.id, job.id);
            store.retry_job(&job.id, "transient").await.unwrap();
        }
        assert!(store.claim_next_job().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_job_transitions_site_per_job_type() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.transition_site("a", SiteStatus::Provisioning).await.unwrap();
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        store.claim_next_job().await.unwrap();
        store.complete_job(&job.id, "a", JobType::Provision).await.unwrap();

        let site = store.get_site("a").await.unwrap();
        assert_eq!(site.status, SiteStatus::Active);
        let job = store.get_job(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn fail_job_leaves_site_in_its_non_terminal_state() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.transition_site("a", SiteStatus::Provisioning).await.unwrap();
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        store.claim_next_job().await.unwrap();
        store.fail_job(&job.id, "boom").await.unwrap();

        let site = store.get_site("a").await.unwrap();
        assert_eq!(site.status, SiteStatus::Provisioning);
        let job = store.get_job(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn has_active_job_reflects_pending_and_processing_only() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        assert!(!store.has_active_job("a").await.unwrap());
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        assert!(store.has_active_job("a").await.unwrap());
        store.claim_next_job().await.unwrap();
        assert!(store.has_active_job("a").await.unwrap());
        store.transition_site("a", SiteStatus::Provisioning).await.unwrap();
        store.complete_job(&job.id, "a", JobType::Provision).await.unwrap();
        assert!(!store.has_active_job("a").await.unwrap());
    }

    #[tokio::test]
    async fn ensure_domain_available_detects_cross_site_conflicts() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.upsert_site("b", "b.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.set_custom_domain("a", Some("example.com")).await.unwrap();

        let err = store.ensure_domain_available("example.com", "b").await.unwrap_err();
        assert!(matches!(err, Error::DomainTaken(_)));
        assert!(store.ensure_domain_available("example.com", "a").await.is_ok());
    }

    #[tokio::test]
    async fn hard_delete_site_requires_destroyed_status() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        store.transition_site("a", SiteStatus::Provisioning).await.unwrap();
        store.transition_site("a", SiteStatus::Active).await.unwrap();

        let err = store.hard_delete_site("a").await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        store.transition_site("a", SiteStatus::Destroying).await.unwrap();
        store.transition_site("a", SiteStatus::Destroyed).await.unwrap();
        store.hard_delete_site("a").await.unwrap();
        assert!(store.get_site("a").await.is_err());
    }

    #[tokio::test]
    async fn recover_stuck_jobs_is_idempotent() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        store.claim_next_job().await.unwrap();

        // Backdate started_at to simulate a crash 20 minutes ago.
        sqlx::query("UPDATE jobs SET started_at = ? WHERE id = ?")
            .bind((Utc::now() - chrono::Duration::minutes(20)).to_rfc3339())
            .bind(&job.id)
            .execute(&store.pool)
            .await
            .unwrap();

        let recovered = store.recover_stuck_jobs(10).await.unwrap();
        assert_eq!(recovered, 1);
        let job = store.get_job(&job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.last_error.as_deref(), Some("recovered: was stuck in PROCESSING"));

        let recovered_again = store.recover_stuck_jobs(10).await.unwrap();
        assert_eq!(recovered_again, 0);
    }

    #[tokio::test]
    async fn hard_delete_job_refuses_active_jobs() {
        let store = test_store().await;
        store.upsert_site("a", "a.fleet.test", SiteStatus::Created, None).await.unwrap();
        let job = store.insert_job(JobType::Provision, "a", None).await.unwrap();
        let err = store.hard_delete_job(&job.id).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        store.claim_next_job().await.unwrap();
        store.fail_job(&job.id, "boom").await.unwrap();
        store.hard_delete_job(&job.id).await.unwrap();
    }
}
