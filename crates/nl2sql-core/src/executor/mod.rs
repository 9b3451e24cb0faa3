use crate::errors::ExecutionError;
use crate::table::ResultTable;
use async_trait::async_trait;
use std::time::Duration;

pub mod sqlite;
pub mod warehouse;

pub use sqlite::SqliteStore;

/// Read-only access to the data store that generated SQL runs against.
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultTable, ExecutionError>;

    /// Cheap reachability check used before a run starts.
    async fn probe(&self) -> anyhow::Result<()> {
        self.execute("SELECT 1", Duration::from_secs(5))
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("config error: data store unreachable: {}", e))
    }
}
