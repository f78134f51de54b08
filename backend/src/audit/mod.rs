//! Best-effort audit trail of requests, predictions and failures.
//!
//! Records go to one of three append-only tables. Callers use [`AuditSink`],
//! which never reports a failure back; the storage backend sits behind
//! [`AuditStore`] so tests can substitute an in-memory or no-op store.

pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use postgres::PgAuditStore;

/// The allow-set of audit destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditTable {
    User,
    Error,
    Access,
}

impl AuditTable {
    pub const ALL: [AuditTable; 3] = [AuditTable::User, AuditTable::Error, AuditTable::Access];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditTable::User => "logs_user",
            AuditTable::Error => "logs_error",
            AuditTable::Access => "logs_access",
        }
    }
}

impl fmt::Display for AuditTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditTable {
    type Err = AuditError;

    fn from_str(table: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == table)
            .ok_or_else(|| AuditError::InvalidTable(table.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("invalid table: {0}")]
    InvalidTable(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("audit store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Append-only storage for audit records.
///
/// Implementations must reject a `table` outside the allow-set before doing
/// any I/O.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_json(&self, table: &str, client_ip: &str, payload: &Value) -> Result<(), AuditError>;

    async fn check_ready(&self) -> bool;
}

/// Accepts valid records and discards them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditStore;

#[async_trait]
impl AuditStore for NoopAuditStore {
    async fn insert_json(&self, table: &str, _client_ip: &str, _payload: &Value) -> Result<(), AuditError> {
        AuditTable::from_str(table)?;
        Ok(())
    }

    async fn check_ready(&self) -> bool {
        true
    }
}

/// Fire-and-forget handle used on the request path.
#[derive(Clone)]
pub struct AuditSink {
    store: Arc<dyn AuditStore>,
    timeout: Duration,
}

impl AuditSink {
    pub fn new(store: Arc<dyn AuditStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopAuditStore), Duration::from_secs(1))
    }

    /// Queues one record on a background task and returns immediately.
    /// Must be called from within a tokio runtime.
    pub fn record(&self, table: AuditTable, client_ip: &str, payload: Value) {
        let sink = self.clone();
        let client_ip = client_ip.to_string();
        tokio::spawn(async move {
            sink.write(table, &client_ip, payload).await;
        });
    }

    /// Writes one record, bounded by the sink timeout. Failures are logged
    /// and dropped.
    pub async fn write(&self, table: AuditTable, client_ip: &str, payload: Value) {
        let insert = self.store.insert_json(table.as_str(), client_ip, &payload);
        let result = match tokio::time::timeout(self.timeout, insert).await {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout(self.timeout)),
        };
        match result {
            Ok(()) => log::debug!("Audit record written to {}", table),
            Err(e) => log::warn!("Dropping audit record for {}: {}", table, e),
        }
    }

    pub async fn check_ready(&self) -> bool {
        tokio::time::timeout(self.timeout, self.store.check_ready())
            .await
            .unwrap_or(false)
    }
}
