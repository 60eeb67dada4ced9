use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

/// PostgreSQL client with connection pooling.
///
/// Provides async database operations for the transaction log, aggregate
/// tables, spot prices, checkpoints and the pool/token registry. Uses
/// `deadpool-postgres` for connection management.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL");

        let max_retries = 3;
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=max_retries {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr_config = ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            };

            let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            // Test the connection
            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self {
                        pool,
                    });
                },
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("{}", e));

                    if attempt < max_retries {
                        let delay = std::time::Duration::from_millis(100 * 2_u64.pow(attempt));
                        log::warn!(
                            "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                            attempt,
                            max_retries,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        Err(anyhow::anyhow!(
            "Failed to connect to PostgreSQL after {} attempts: {}",
            max_retries,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        ))
    }

    /// Health check - verify connection is still alive
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string("schema/postgres.sql")
            .await
            .context("Failed to read schema/postgres.sql")?;

        // batch_execute runs the whole file over the simple query protocol,
        // which handles multi-statement scripts and $$-quoted blocks
        client
            .batch_execute(&schema)
            .await
            .context("Failed to apply schema/postgres.sql")?;

        info!("PostgreSQL schema applied successfully");

        // Optional registry seed (tokens and pools), applied when present
        if let Ok(seed) = tokio::fs::read_to_string("schema/seed.sql").await {
            info!("Seeding registry tables");
            client
                .batch_execute(&seed)
                .await
                .context("Failed to apply schema/seed.sql")?;
        }

        info!("PostgreSQL migrations completed successfully");
        Ok(())
    }
}
