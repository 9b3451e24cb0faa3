use super::QueryStore;
use crate::errors::{ExecutionError, ExecutionErrorKind};
use crate::table::{Cell, ResultTable};
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, InterruptHandle, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// SQLite warehouse opened read-only. Statements run on the blocking pool and
/// are interrupted when they exceed their timeout.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteStore {
    pub fn open_read_only(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!(
                "config error: database {} does not exist (run `nl2sql init-db`)",
                path.display()
            );
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// Wraps an existing connection and switches it to query-only mode.
    pub fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA query_only = ON;")
            .context("failed to enable query_only")?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// In-memory warehouse with schema and demo rows, for tests and dry runs.
    pub fn demo() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        super::warehouse::init_schema(&conn)?;
        super::warehouse::seed_demo(&conn)?;
        Self::from_connection(conn)
    }
}

#[async_trait]
impl QueryStore for SqliteStore {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultTable, ExecutionError> {
        let conn = self.conn.clone();
        let sql = sql.to_string();
        let mut task = tokio::task::spawn_blocking(move || run_query(&conn, &sql));

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| {
                ExecutionError::new(ExecutionErrorKind::Unknown, format!("query task failed: {}", e))
            })?,
            Err(_) => {
                self.interrupt.interrupt();
                let _ = task.await;
                tracing::warn!(
                    event = "nl2sql.executor.timeout",
                    timeout_ms = timeout.as_millis() as u64,
                    "query interrupted"
                );
                Err(ExecutionError::new(
                    ExecutionErrorKind::Timeout,
                    format!("query exceeded {} ms", timeout.as_millis()),
                ))
            }
        }
    }
}

fn run_query(conn: &Mutex<Connection>, sql: &str) -> Result<ResultTable, ExecutionError> {
    let conn = conn
        .lock()
        .map_err(|_| ExecutionError::new(ExecutionErrorKind::Unknown, "connection lock poisoned"))?;
    let mut stmt = conn.prepare(sql).map_err(from_sqlite)?;
    if !stmt.readonly() {
        return Err(ExecutionError::new(
            ExecutionErrorKind::Permission,
            "statement would modify the database",
        ));
    }

    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = names.len();
    let mut table = ResultTable::new(names);

    let mut rows = stmt.query([]).map_err(from_sqlite)?;
    while let Some(row) = rows.next().map_err(from_sqlite)? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(to_cell(row.get_ref(i).map_err(from_sqlite)?));
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn to_cell(v: ValueRef<'_>) -> Cell {
    match v {
        ValueRef::Null => Cell::Null,
        ValueRef::Integer(i) => Cell::Integer(i),
        ValueRef::Real(r) => Cell::Real(r),
        ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
    }
}

fn from_sqlite(e: rusqlite::Error) -> ExecutionError {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        match f.code {
            ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied
            | ErrorCode::AuthorizationForStatementDenied => {
                return ExecutionError::new(ExecutionErrorKind::Permission, e.to_string())
            }
            ErrorCode::OperationInterrupted => {
                return ExecutionError::new(ExecutionErrorKind::Timeout, e.to_string())
            }
            _ => {}
        }
    }
    ExecutionError::classify(&e.to_string())
}
