use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use sqlx::{
    mysql::{MySqlConnectOptions, MySqlPoolOptions},
    MySqlPool,
};
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::{
    config::{Config, DatabaseConfig},
    error::QueryError,
};

/// Shared handle to the database. Every read goes through [`Database::timed`]
/// or [`Database::timed_scan`] so that a stuck query surfaces as a timeout
/// instead of a hung request.
#[derive(Debug, Clone)]
pub struct Database {
    pool: MySqlPool,
    timeout: Duration,
    scan_timeout: Duration,
}

impl Database {
    /// Connects to the database, retrying a few times since the database
    /// container is usually still starting when the server comes up.
    pub async fn connect(config: &Config) -> Result<Self> {
        let db = &config.database;
        let mut attempt = 1;
        let pool = loop {
            match pool_options(db).connect_with(connect_options(db)).await {
                Ok(pool) => break pool,
                Err(e) if attempt < config.connect_retries => {
                    warn!(attempt, error = %e, "failed to connect to database, retrying");
                    sleep(config.connect_retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to connect to database {} on {}", db.name, db.host)
                    })
                }
            }
        };
        info!(database = %db.name, host = %db.host, "database connected");

        Ok(Self::new(
            pool,
            config.query_timeout(),
            config.scan_timeout(),
        ))
    }

    /// A pool that only connects once a query runs.
    pub fn connect_lazy(
        config: &DatabaseConfig,
        timeout: Duration,
        scan_timeout: Duration,
    ) -> Self {
        Self::new(
            pool_options(config).connect_lazy_with(connect_options(config)),
            timeout,
            scan_timeout,
        )
    }

    pub fn new(pool: MySqlPool, timeout: Duration, scan_timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            scan_timeout,
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub async fn timed<T>(
        &self,
        query: impl Future<Output = sqlx::Result<T>>,
    ) -> Result<T, QueryError> {
        bounded(self.timeout, query).await
    }

    /// Like [`Database::timed`], with the longer bound for full table reads.
    pub async fn timed_scan<T>(
        &self,
        query: impl Future<Output = sqlx::Result<T>>,
    ) -> Result<T, QueryError> {
        bounded(self.scan_timeout, query).await
    }
}

async fn bounded<T>(
    limit: Duration,
    query: impl Future<Output = sqlx::Result<T>>,
) -> Result<T, QueryError> {
    match timeout(limit, query).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(QueryError::Timeout),
    }
}

fn pool_options(config: &DatabaseConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new().max_connections(config.max_connections)
}

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.name)
}
