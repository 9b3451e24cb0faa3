use crate::executor::QueryStore;
use crate::fewshot::PromptBuilder;
use crate::model::{AttemptOutcome, Example, FailureKind, GenerationAttempt, GenerationSummary};
use crate::providers::llm::LlmClient;
use crate::sql::{check_read_only, extract_sql};
use crate::table::ResultTable;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub max_attempts: u32,
    pub retry_extraction_failures: bool,
    pub execution_timeout: Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_extraction_failures: true,
            execution_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of the generate / validate / repair loop for one question.
#[derive(Debug, Clone)]
pub struct Generation {
    /// The statement that executed; `None` unless the generation succeeded.
    pub sql: Option<String>,
    /// Last extracted statement, kept for the record even when it failed.
    pub last_sql: Option<String>,
    pub attempts: Vec<GenerationAttempt>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub result: Option<ResultTable>,
    /// Seconds spent executing the final statement.
    pub execution_time: f64,
    pub examples_used: usize,
}

impl Generation {
    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }

    pub fn summary(&self) -> GenerationSummary {
        GenerationSummary {
            generated_sql: self.last_sql.clone(),
            execution_success: self.succeeded(),
            execution_time: self.execution_time,
            attempts: self.attempts.len() as u32,
            failure: self.failure,
            error: self.error.clone(),
        }
    }
}

pub struct SqlGenerator {
    client: Arc<dyn LlmClient>,
    store: Arc<dyn QueryStore>,
    prompts: PromptBuilder,
    settings: GeneratorSettings,
}

impl SqlGenerator {
    pub fn new(
        client: Arc<dyn LlmClient>,
        store: Arc<dyn QueryStore>,
        prompts: PromptBuilder,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            client,
            store,
            prompts,
            settings,
        }
    }

    pub fn client(&self) -> &Arc<dyn LlmClient> {
        &self.client
    }

    pub async fn generate(&self, question: &str, examples: &[Example]) -> Generation {
        let built = self.prompts.build(question, examples);
        let max_attempts = self.settings.max_attempts.max(1);

        let mut gen = Generation {
            sql: None,
            last_sql: None,
            attempts: Vec::new(),
            error: None,
            failure: None,
            result: None,
            execution_time: 0.0,
            examples_used: built.examples_used,
        };
        let mut prompt = built.text;
        let mut extraction_retried = false;

        for attempt_number in 1..=max_attempts {
            let started = Instant::now();
            let mut attempt = GenerationAttempt {
                attempt_number,
                prompt: prompt.clone(),
                raw_completion: String::new(),
                extracted_sql: None,
                outcome: AttemptOutcome::ProviderError,
                error: None,
                duration_ms: 0,
            };

            let completion = match self.client.complete(&prompt).await {
                Ok(resp) => resp.text,
                Err(e) => {
                    let msg = format!("{:#}", e);
                    tracing::warn!(event = "nl2sql.generate.provider_failed", attempt = attempt_number, error = %msg);
                    attempt.error = Some(msg.clone());
                    attempt.duration_ms = elapsed_ms(started);
                    gen.attempts.push(attempt);
                    return gen.fail(FailureKind::Provider, msg);
                }
            };
            attempt.raw_completion = completion;

            let Some(sql) = extract_sql(&attempt.raw_completion) else {
                attempt.outcome = AttemptOutcome::ExtractionFailed;
                attempt.error = Some("no SQL statement found in completion".to_string());
                attempt.duration_ms = elapsed_ms(started);
                gen.attempts.push(attempt);
                if self.settings.retry_extraction_failures
                    && !extraction_retried
                    && attempt_number < max_attempts
                {
                    extraction_retried = true;
                    prompt = self.prompts.build_extraction_retry(&prompt);
                    continue;
                }
                return gen.fail(FailureKind::Extraction, "no SQL statement found in completion");
            };
            attempt.extracted_sql = Some(sql.clone());
            gen.last_sql = Some(sql.clone());

            if let Err(v) = check_read_only(&sql) {
                tracing::warn!(event = "nl2sql.generate.policy_violation", reason = %v.reason);
                attempt.outcome = AttemptOutcome::PolicyViolation;
                attempt.error = Some(v.to_string());
                attempt.duration_ms = elapsed_ms(started);
                gen.attempts.push(attempt);
                return gen.fail(FailureKind::Policy, v.to_string());
            }

            let exec_started = Instant::now();
            let outcome = self
                .store
                .execute(&sql, self.settings.execution_timeout)
                .await;
            gen.execution_time = exec_started.elapsed().as_secs_f64();
            attempt.duration_ms = elapsed_ms(started);

            match outcome {
                Ok(table) => {
                    attempt.outcome = AttemptOutcome::ExecutedOk;
                    gen.attempts.push(attempt);
                    gen.result = Some(table);
                    gen.sql = Some(sql);
                    gen.error = None;
                    gen.failure = None;
                    return gen;
                }
                Err(e) => {
                    tracing::debug!(
                        event = "nl2sql.generate.execution_failed",
                        attempt = attempt_number,
                        kind = %e.kind,
                        error = %e.message
                    );
                    attempt.outcome = AttemptOutcome::ExecutionError;
                    attempt.error = Some(e.to_string());
                    gen.attempts.push(attempt);
                    gen.error = Some(e.to_string());
                    prompt = self.prompts.build_repair(question, &sql, &e.message);
                }
            }
        }

        let msg = gen
            .error
            .clone()
            .unwrap_or_else(|| "attempts exhausted".to_string());
        gen.fail(FailureKind::Execution, msg)
    }
}

impl Generation {
    fn fail(mut self, kind: FailureKind, msg: impl Into<String>) -> Self {
        self.failure = Some(kind);
        self.error = Some(msg.into());
        self.result = None;
        self.sql = None;
        self
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ProviderError, ProviderErrorKind};
    use crate::executor::testing::FailingStore;
    use crate::executor::SqliteStore;
    use crate::fewshot::{default_pool, SCHEMA_DESCRIPTION};
    use crate::providers::llm::fake::Reply;
    use crate::providers::llm::FakeClient;
    use std::sync::atomic::Ordering;

    fn generator(
        client: Arc<FakeClient>,
        store: Arc<dyn QueryStore>,
        settings: GeneratorSettings,
    ) -> SqlGenerator {
        SqlGenerator::new(client, store, PromptBuilder::new(SCHEMA_DESCRIPTION), settings)
    }

    #[tokio::test]
    async fn failing_store_exhausts_attempts_with_repair_prompts() {
        let client = Arc::new(FakeClient::always("SELECT fp.year FROM fiscal_period fp"));
        let store = Arc::new(FailingStore::default());
        let g = generator(client.clone(), store.clone(), GeneratorSettings::default());

        let out = g.generate("Revenue by year?", &default_pool()[..2]).await;
        assert_eq!(out.attempts.len(), 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.calls(), 3);
        assert_eq!(out.failure, Some(FailureKind::Execution));
        assert!(!out.succeeded());
        assert!(out
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::ExecutionError));

        let prompts = client.prompts();
        assert!(prompts[0].contains("Examples:"));
        assert!(prompts[1].contains("no such column: fp.year"));
        assert!(!prompts[1].contains("Examples:"));
        assert_eq!(out.attempts[2].attempt_number, 3);
    }

    #[tokio::test]
    async fn mutating_statement_never_reaches_store() {
        let client = Arc::new(FakeClient::always("DELETE FROM company"));
        let store = Arc::new(FailingStore::default());
        let g = generator(client, store.clone(), GeneratorSettings::default());

        let out = g.generate("Remove all companies", &[]).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(out.failure, Some(FailureKind::Policy));
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(out.attempts[0].outcome, AttemptOutcome::PolicyViolation);
        assert_eq!(out.sql, None);
        assert_eq!(out.last_sql.as_deref(), Some("DELETE FROM company"));
        assert_eq!(
            out.summary().generated_sql.as_deref(),
            Some("DELETE FROM company")
        );
    }

    #[tokio::test]
    async fn lowercase_and_commented_mutations_are_policy_failures() {
        for completion in [
            "delete from company",
            "drop table company",
            "/* c */ DELETE FROM company",
            "-- tidy up\nupdate company set name = 'x';",
        ] {
            let client = Arc::new(FakeClient::always(completion));
            let store = Arc::new(FailingStore::default());
            let g = generator(client.clone(), store.clone(), GeneratorSettings::default());

            let out = g.generate("Clean up the companies", &[]).await;
            assert_eq!(out.failure, Some(FailureKind::Policy), "{}", completion);
            assert_eq!(out.attempts.len(), 1, "{}", completion);
            assert_eq!(client.calls(), 1, "{}", completion);
            assert_eq!(store.calls.load(Ordering::SeqCst), 0, "{}", completion);
        }
    }

    #[tokio::test]
    async fn failed_generation_keeps_statement_only_for_the_record() {
        let client = Arc::new(FakeClient::always("SELECT fp.year FROM fiscal_period fp"));
        let g = generator(client, Arc::new(FailingStore::default()), GeneratorSettings::default());

        let out = g.generate("Revenue by year?", &[]).await;
        assert_eq!(out.failure, Some(FailureKind::Execution));
        assert_eq!(out.sql, None);
        let summary = out.summary();
        assert!(!summary.execution_success);
        assert_eq!(
            summary.generated_sql.as_deref(),
            Some("SELECT fp.year FROM fiscal_period fp")
        );
    }

    #[tokio::test]
    async fn extraction_failure_is_retried_once() -> anyhow::Result<()> {
        let client = Arc::new(FakeClient::texts([
            "I am not sure what you mean.",
            "```sql\nSELECT COUNT(*) AS n FROM company\n```",
        ]));
        let g = generator(client.clone(), Arc::new(SqliteStore::demo()?), GeneratorSettings::default());

        let out = g.generate("How many companies?", &[]).await;
        assert!(out.succeeded());
        assert_eq!(out.attempts.len(), 2);
        assert_eq!(out.attempts[0].outcome, AttemptOutcome::ExtractionFailed);
        assert!(client.prompts()[1].contains("did not contain a SQL statement"));
        Ok(())
    }

    #[tokio::test]
    async fn extraction_failure_without_retry_fails() -> anyhow::Result<()> {
        let client = Arc::new(FakeClient::always("no idea"));
        let settings = GeneratorSettings {
            retry_extraction_failures: false,
            ..GeneratorSettings::default()
        };
        let g = generator(client.clone(), Arc::new(SqliteStore::demo()?), settings);

        let out = g.generate("How many companies?", &[]).await;
        assert_eq!(out.failure, Some(FailureKind::Extraction));
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(client.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn second_extraction_failure_is_final() -> anyhow::Result<()> {
        let client = Arc::new(FakeClient::always("no idea"));
        let g = generator(client.clone(), Arc::new(SqliteStore::demo()?), GeneratorSettings::default());
        let out = g.generate("How many companies?", &[]).await;
        assert_eq!(out.failure, Some(FailureKind::Extraction));
        assert_eq!(client.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn provider_failure_does_not_consume_repairs() {
        let client = Arc::new(FakeClient::scripted(vec![Reply::Fail(ProviderError::new(
            ProviderErrorKind::RateLimited,
            "429 too many requests",
        ))]));
        let store = Arc::new(FailingStore::default());
        let g = generator(client.clone(), store.clone(), GeneratorSettings::default());

        let out = g.generate("Revenue?", &[]).await;
        assert_eq!(out.failure, Some(FailureKind::Provider));
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(client.calls(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert!(out.error.unwrap_or_default().contains("429"));
    }

    #[tokio::test]
    async fn zero_shot_still_generates() -> anyhow::Result<()> {
        let client = Arc::new(FakeClient::always("SELECT 1 AS one"));
        let g = generator(client.clone(), Arc::new(SqliteStore::demo()?), GeneratorSettings::default());
        let out = g.generate("Anything?", &[]).await;
        assert!(out.succeeded());
        assert_eq!(out.sql.as_deref(), Some("SELECT 1 AS one"));
        assert_eq!(out.examples_used, 0);
        assert_eq!(client.calls(), 1);
        let summary = out.summary();
        assert!(summary.execution_success);
        assert_eq!(summary.attempts, 1);
        Ok(())
    }
}
