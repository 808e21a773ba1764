//! `AppDbOps` — the capability that provisions and tears down the
//! per-site MariaDB database and user inside the shared application
//! database server.

use async_trait::async_trait;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;
use wpfleet_core::{Error, Result};

#[async_trait]
pub trait AppDbOps: Send + Sync {
    async fn create_database_and_user(
        &self,
        db_name: &str,
        db_user: &str,
        db_password: &str,
        from_host: &str,
    ) -> Result<()>;
    async fn drop_database_and_user(&self, db_name: &str, db_user: &str, from_host: &str) -> Result<()>;

    /// Idempotent update of the application-level URL records (e.g.
    /// `wp_options.siteurl`/`home`). Failures here are non-fatal warnings
    /// per the domain-attach contract, never a rollback trigger.
    async fn update_site_urls(&self, db_name: &str, url: &str) -> Result<()>;
}

/// Real implementation, speaking to the shared MariaDB server over a
/// single administrative connection pool. Every statement here is DDL,
/// which MariaDB does not let us parameterize positionally, so table,
/// database, and user identifiers are validated by callers (see
/// [`wpfleet_core::lifecycle::is_valid_site_name`]) before they ever reach
/// this adapter and are quoted with backticks before being interpolated.
pub struct MariaDbAdmin {
    pool: Pool<MySql>,
}

impl MariaDbAdmin {
    pub async fn connect(admin_dsn: &str) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(admin_dsn)
            .await?;
        Ok(Self { pool })
    }

    fn quote_ident(ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }
}

#[async_trait]
impl AppDbOps for MariaDbAdmin {
    async fn create_database_and_user(
        &self,
        db_name: &str,
        db_user: &str,
        db_password: &str,
        from_host: &str,
    ) -> Result<()> {
        let db = Self::quote_ident(db_name);
        let mut tx = self.pool.begin().await.map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query(&format!(
            "CREATE DATABASE IF NOT EXISTS {db} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci"
        ))
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query(&format!("CREATE USER IF NOT EXISTS ?@'{from_host}' IDENTIFIED BY ?"))
            .bind(db_user)
            .bind(db_password)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query(&format!("GRANT ALL PRIVILEGES ON {db}.* TO ?@'{from_host}'"))
            .bind(db_user)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query("FLUSH PRIVILEGES")
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        tx.commit().await.map_err(|e| Error::adapter("appdb", e))?;
        info!(db_name, db_user, from_host, "application database and user created");
        Ok(())
    }

    async fn drop_database_and_user(&self, db_name: &str, db_user: &str, from_host: &str) -> Result<()> {
        let db = Self::quote_ident(db_name);
        let mut tx = self.pool.begin().await.map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query(&format!("DROP DATABASE IF EXISTS {db}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query(&format!("DROP USER IF EXISTS ?@'{from_host}'"))
            .bind(db_user)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        sqlx::query("FLUSH PRIVILEGES")
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::adapter("appdb", e))?;

        tx.commit().await.map_err(|e| Error::adapter("appdb", e))?;
        info!(db_name, db_user, from_host, "application database and user dropped");
        Ok(())
    }

    async fn update_site_urls(&self, db_name: &str, url: &str) -> Result<()> {
        let db = Self::quote_ident(db_name);
        let options_table = format!("{db}.wp_options");

        sqlx::query(&format!(
            "UPDATE {options_table} SET option_value = ? WHERE option_name IN ('siteurl', 'home')"
        ))
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::adapter("appdb", e))?;

        info!(db_name, url, "application URL records updated");
        Ok(())
    }
}

/// In-memory fake used by orchestrator unit tests.
#[derive(Default)]
pub struct FakeAppDb {
    pub databases: Mutex<HashMap<String, String>>,
    pub urls: Mutex<HashMap<String, String>>,
    pub fail_step: Mutex<Option<String>>,
}

impl FakeAppDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, step: &str) {
        *self.fail_step.lock().unwrap() = Some(step.to_string());
    }

    fn maybe_fail(&self, step: &str) -> Result<()> {
        let mut guard = self.fail_step.lock().unwrap();
        if guard.as_deref() == Some(step) {
            *guard = None;
            return Err(Error::adapter("appdb", format!("forced failure at {step}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AppDbOps for FakeAppDb {
    async fn create_database_and_user(
        &self,
        db_name: &str,
        db_user: &str,
        _db_password: &str,
        _from_host: &str,
    ) -> Result<()> {
        self.maybe_fail("create_database_and_user")?;
        self.databases.lock().unwrap().insert(db_name.to_string(), db_user.to_string());
        Ok(())
    }

    async fn drop_database_and_user(&self, db_name: &str, _db_user: &str, _from_host: &str) -> Result<()> {
        self.maybe_fail("drop_database_and_user")?;
        self.databases.lock().unwrap().remove(db_name);
        Ok(())
    }

    async fn update_site_urls(&self, db_name: &str, url: &str) -> Result<()> {
        self.maybe_fail("update_site_urls")?;
        self.urls.lock().unwrap().insert(db_name.to_string(), url.to_string());
        Ok(())
    }
}
