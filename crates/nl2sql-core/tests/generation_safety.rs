use async_trait::async_trait;
use nl2sql_core::errors::ExecutionError;
use nl2sql_core::executor::{QueryStore, SqliteStore};
use nl2sql_core::fewshot::{PromptBuilder, SCHEMA_DESCRIPTION};
use nl2sql_core::generator::{GeneratorSettings, SqlGenerator};
use nl2sql_core::model::FailureKind;
use nl2sql_core::providers::llm::FakeClient;
use nl2sql_core::table::ResultTable;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps the demo warehouse and counts executed statements.
struct CountingStore {
    inner: SqliteStore,
    calls: AtomicUsize,
}

#[async_trait]
impl QueryStore for CountingStore {
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<ResultTable, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql, timeout).await
    }
}

fn counting_store() -> anyhow::Result<Arc<CountingStore>> {
    Ok(Arc::new(CountingStore {
        inner: SqliteStore::demo()?,
        calls: AtomicUsize::new(0),
    }))
}

fn generator(client: FakeClient, store: Arc<CountingStore>) -> SqlGenerator {
    SqlGenerator::new(
        Arc::new(client),
        store,
        PromptBuilder::new(SCHEMA_DESCRIPTION),
        GeneratorSettings::default(),
    )
}

#[tokio::test]
async fn destructive_statements_never_reach_the_store() -> anyhow::Result<()> {
    let store = counting_store()?;
    let g = generator(FakeClient::always("DROP TABLE financial_fact"), store.clone());

    let out = g.generate("Remove all facts", &[]).await;
    assert_eq!(out.failure, Some(FailureKind::Policy));
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    let still_there = store
        .inner
        .execute("SELECT COUNT(*) FROM financial_fact", Duration::from_secs(5))
        .await;
    assert!(still_there.is_ok());
    Ok(())
}

#[tokio::test]
async fn lowercase_destructive_statement_is_a_policy_failure() -> anyhow::Result<()> {
    let store = counting_store()?;
    let g = generator(
        FakeClient::always("-- remove stale data\ndelete from financial_fact;"),
        store.clone(),
    );

    let out = g.generate("Remove all facts", &[]).await;
    assert_eq!(out.failure, Some(FailureKind::Policy));
    assert_eq!(out.attempts.len(), 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    assert_eq!(out.sql, None);
    assert_eq!(
        out.summary().generated_sql.as_deref(),
        Some("delete from financial_fact")
    );
    Ok(())
}

#[tokio::test]
async fn schema_error_is_repaired_on_the_next_attempt() -> anyhow::Result<()> {
    let store = counting_store()?;
    let client = FakeClient::texts([
        "SELECT fp.year FROM fiscal_period fp",
        "SELECT fp.fiscal_year FROM fiscal_period fp",
    ]);
    let g = generator(client, store.clone());

    let out = g.generate("Which fiscal years are covered?", &[]).await;
    assert!(out.succeeded());
    assert_eq!(out.attempts.len(), 2);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    assert_eq!(out.sql.as_deref(), Some("SELECT fp.fiscal_year FROM fiscal_period fp"));
    Ok(())
}

#[tokio::test]
async fn persistent_errors_stop_at_the_attempt_limit() -> anyhow::Result<()> {
    let store = counting_store()?;
    let g = generator(FakeClient::always("SELECT nope FROM fiscal_period"), store.clone());

    let out = g.generate("Anything", &[]).await;
    assert_eq!(out.failure, Some(FailureKind::Execution));
    assert_eq!(out.attempts.len(), 3);
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    assert!(out.error.as_deref().unwrap_or("").contains("nope"));
    Ok(())
}

#[tokio::test]
async fn query_only_connection_rejects_writes() -> anyhow::Result<()> {
    let store = SqliteStore::demo()?;
    let err = store
        .execute("DELETE FROM financial_fact", Duration::from_secs(5))
        .await
        .err();
    assert!(err.is_some());
    Ok(())
}
