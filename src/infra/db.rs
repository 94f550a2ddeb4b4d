use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a transaction for writes that must land together.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// True when `err` is a Postgres unique violation on `constraint`.
pub fn is_unique_violation(err: &anyhow::Error, constraint: &str) -> bool {
    violates(err, "23505", constraint)
}

/// True when `err` is a Postgres foreign key violation on `constraint`.
pub fn is_foreign_key_violation(err: &anyhow::Error, constraint: &str) -> bool {
    violates(err, "23503", constraint)
}

fn violates(err: &anyhow::Error, sqlstate: &str, constraint: &str) -> bool {
    let Some(sqlx_err) = err.downcast_ref::<sqlx::Error>() else {
        return false;
    };
    let Some(db_err) = sqlx_err.as_database_error() else {
        return false;
    };
    db_err.code().as_deref() == Some(sqlstate)
        && db_err.constraint().unwrap_or_default().contains(constraint)
}
