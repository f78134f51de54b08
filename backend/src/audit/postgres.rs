use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::types::Json;
use std::str::FromStr;

use super::{AuditError, AuditStore, AuditTable};
use crate::config::DatabaseConfig;

/// Postgres-backed audit store. Each table has `ip text, payload jsonb`.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Builds a pool that connects on first use, so an unreachable database
    /// does not block startup.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(options);
        log::info!(
            "Audit store configured for {}:{}/{}",
            config.host,
            config.port,
            config.name
        );
        Self::new(pool)
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert_json(&self, table: &str, client_ip: &str, payload: &Value) -> Result<(), AuditError> {
        let table = AuditTable::from_str(table)?;
        // Identifiers cannot be bound; the name comes from the allow-set only.
        let statement = format!("INSERT INTO {} (ip, payload) VALUES ($1, $2)", table.as_str());
        sqlx::query(&statement)
            .bind(client_ip)
            .bind(Json(payload))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn check_ready(&self) -> bool {
        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Audit store readiness check failed: {}", e);
                false
            }
        }
    }
}
