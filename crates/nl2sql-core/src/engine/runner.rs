use crate::errors::ConfigError;
use crate::executor::QueryStore;
use crate::fewshot::{ExampleSelector, PromptBuilder};
use crate::generator::{GeneratorSettings, SqlGenerator};
use crate::metrics_api::{EvalInput, Evaluator};
use crate::model::{
    Configuration, EvalScores, EvaluationRecord, FailureKind, GenerationSummary, Question,
    RowOrder, SelectionStrategy,
};
use crate::on_error::{log_fail_safe, ErrorPolicy, ErrorPolicyResult};
use crate::providers::llm::LlmClient;
use crate::report::{summarize, write_summary, RunSummary};
use crate::storage::{ResultsSink, ResumeState};
use crate::table::ResultTable;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunPolicy {
    pub experiment_name: String,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
    pub resume: bool,
    pub row_order: RowOrder,
    pub on_embedding_error: ErrorPolicy,
    pub generator: GeneratorSettings,
}

impl RunPolicy {
    /// `<output_dir>/<experiment>.csv` and `<output_dir>/<experiment>_summary.json`.
    pub fn in_dir(experiment_name: &str, output_dir: &std::path::Path) -> Self {
        Self {
            experiment_name: experiment_name.to_string(),
            results_path: output_dir.join(format!("{}.csv", experiment_name)),
            summary_path: output_dir.join(format!("{}_summary.json", experiment_name)),
            resume: false,
            row_order: RowOrder::Auto,
            on_embedding_error: ErrorPolicy::Block,
            generator: GeneratorSettings::default(),
        }
    }
}

/// What a run produced. `records` includes rows carried over from a resumed file.
#[derive(Debug, Clone)]
pub struct ExperimentRun {
    pub experiment: String,
    pub records: Vec<EvaluationRecord>,
    pub processed: usize,
    pub skipped: usize,
    pub interrupted: bool,
    pub results_path: PathBuf,
    pub summary_path: PathBuf,
    pub summary: RunSummary,
}

pub struct ExperimentRunner {
    selector: Arc<ExampleSelector>,
    store: Arc<dyn QueryStore>,
    prompts: PromptBuilder,
    evaluator: Arc<dyn Evaluator>,
    clients: BTreeMap<String, Arc<dyn LlmClient>>,
    policy: RunPolicy,
    stop: Arc<AtomicBool>,
}

impl ExperimentRunner {
    pub fn new(
        selector: Arc<ExampleSelector>,
        store: Arc<dyn QueryStore>,
        prompts: PromptBuilder,
        evaluator: Arc<dyn Evaluator>,
        policy: RunPolicy,
    ) -> Self {
        Self {
            selector,
            store,
            prompts,
            evaluator,
            clients: BTreeMap::new(),
            policy,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers the client that serves configurations naming `model`.
    pub fn with_client(mut self, model: &str, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(model.to_string(), client);
        self
    }

    /// Setting the flag stops the run after the question in flight.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    async fn validate(&self, questions: &[Question], configs: &[Configuration]) -> anyhow::Result<()> {
        self.store.probe().await?;
        if questions.is_empty() {
            return Err(ConfigError("no questions selected".into()).into());
        }
        if configs.is_empty() {
            return Err(ConfigError("no configurations to run".into()).into());
        }
        if configs.iter().any(|c| c.num_few_shot_examples > 0) && self.selector.pool().is_empty() {
            return Err(ConfigError("few-shot examples requested but the example pool is empty".into()).into());
        }
        if configs
            .iter()
            .any(|c| c.strategy == SelectionStrategy::Similarity && c.num_few_shot_examples > 0)
            && !self.selector.has_embedder()
        {
            return Err(ConfigError("similarity selection needs an embedder".into()).into());
        }
        for c in configs {
            if !self.clients.contains_key(&c.model_name) {
                return Err(ConfigError(format!("no client configured for model {}", c.model_name)).into());
            }
        }
        Ok(())
    }

    /// Runs every configuration over every question, configurations outer.
    /// Each processed question is appended to the results file and the
    /// summary is rewritten before the next one starts.
    pub async fn run(
        &self,
        questions: &[Question],
        configs: &[Configuration],
    ) -> anyhow::Result<ExperimentRun> {
        self.validate(questions, configs).await?;

        let (mut sink, prior) = if self.policy.resume {
            ResultsSink::open_resume(&self.policy.results_path)?
        } else {
            (ResultsSink::create(&self.policy.results_path)?, ResumeState::default())
        };
        let done = prior.completed();
        let mut records = prior.records;
        if !done.is_empty() {
            tracing::info!(
                event = "nl2sql.run.resumed",
                completed = done.len(),
                path = %self.policy.results_path.display()
            );
        }

        let name = &self.policy.experiment_name;
        let mut ground_truth: HashMap<String, Option<ResultTable>> = HashMap::new();
        let (mut processed, mut skipped, mut interrupted) = (0usize, 0usize, false);

        'configs: for cfg in configs {
            let generator = self.generator_for(cfg)?;
            let label = cfg.label();
            tracing::info!(event = "nl2sql.config.start", configuration = %label);

            for q in questions {
                if self.stop.load(Ordering::SeqCst) {
                    interrupted = true;
                    break 'configs;
                }
                if done.contains(&(label.clone(), q.id.clone())) {
                    skipped += 1;
                    continue;
                }

                let rec = self.process(&generator, cfg, q, &mut ground_truth).await;
                tracing::info!(
                    event = "nl2sql.question.done",
                    configuration = %label,
                    question_id = %q.id,
                    executed = rec.execution_success,
                    correct = rec.results_match,
                    attempts = rec.attempts
                );
                sink.append(&rec)?;
                records.push(rec);
                processed += 1;
                write_summary(&self.policy.summary_path, &summarize(name, &records))?;
            }
        }

        if interrupted {
            tracing::warn!(event = "nl2sql.run.interrupted", processed, "stopped after current question");
        }
        tracing::info!(
            event = "nl2sql.run.done",
            rows = sink.written(),
            path = %sink.path().display()
        );
        let summary = summarize(name, &records);
        write_summary(&self.policy.summary_path, &summary)?;

        Ok(ExperimentRun {
            experiment: name.clone(),
            records,
            processed,
            skipped,
            interrupted,
            results_path: self.policy.results_path.clone(),
            summary_path: self.policy.summary_path.clone(),
            summary,
        })
    }

    fn generator_for(&self, cfg: &Configuration) -> anyhow::Result<SqlGenerator> {
        let client = self
            .clients
            .get(&cfg.model_name)
            .cloned()
            .ok_or_else(|| ConfigError(format!("no client configured for model {}", cfg.model_name)))?;
        Ok(SqlGenerator::new(
            client,
            self.store.clone(),
            self.prompts.clone(),
            self.policy.generator.clone(),
        ))
    }

    async fn process(
        &self,
        generator: &SqlGenerator,
        cfg: &Configuration,
        q: &Question,
        ground_truth: &mut HashMap<String, Option<ResultTable>>,
    ) -> EvaluationRecord {
        let name = &self.policy.experiment_name;
        let k = cfg.num_few_shot_examples;

        let examples = match self.selector.select(&q.question, k, cfg.strategy).await {
            Ok(ex) => ex,
            Err(e) => match self.policy.on_embedding_error.apply_to_error(&e) {
                ErrorPolicyResult::Blocked { reason } => {
                    tracing::warn!(event = "nl2sql.selection.failed", question_id = %q.id, error = %e);
                    let gen = GenerationSummary {
                        failure: Some(FailureKind::Selection),
                        error: Some(reason),
                        ..GenerationSummary::default()
                    };
                    return EvaluationRecord::assemble(name, cfg, q, gen, EvalScores::default());
                }
                ErrorPolicyResult::Allowed { warning } => {
                    log_fail_safe(&warning, &q.id);
                    self.selector
                        .select(&q.question, k, SelectionStrategy::FirstN)
                        .await
                        .unwrap_or_default()
                }
            },
        };

        let generation = generator.generate(&q.question, &examples).await;
        let expected = self.ground_truth(q, ground_truth).await;

        let input = EvalInput {
            generated_sql: generation.last_sql.as_deref(),
            ground_truth_sql: &q.ground_truth_sql,
            generated: generation.result.as_ref(),
            expected: expected.as_ref(),
            row_order: self.policy.row_order,
        };
        let scores = self.evaluator.evaluate(&input);
        EvaluationRecord::assemble(name, cfg, q, generation.summary(), scores)
    }

    /// Ground-truth results are executed once per question and reused across
    /// configurations.
    async fn ground_truth(
        &self,
        q: &Question,
        cache: &mut HashMap<String, Option<ResultTable>>,
    ) -> Option<ResultTable> {
        if let Some(hit) = cache.get(&q.id) {
            return hit.clone();
        }
        let timeout = self.policy.generator.execution_timeout.max(Duration::from_secs(1));
        let result = match self.store.execute(&q.ground_truth_sql, timeout).await {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(
                    event = "nl2sql.ground_truth.failed",
                    question_id = %q.id,
                    error = %e
                );
                None
            }
        };
        cache.insert(q.id.clone(), result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::FailingStore;
    use crate::executor::SqliteStore;
    use crate::fewshot::{default_pool, SCHEMA_DESCRIPTION};
    use crate::providers::embedder::Embedder;
    use crate::providers::llm::FakeClient;
    use async_trait::async_trait;

    struct FixedEvaluator;

    impl Evaluator for FixedEvaluator {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn evaluate(&self, input: &EvalInput<'_>) -> EvalScores {
            let same = input.generated_sql == Some(input.ground_truth_sql);
            EvalScores {
                exact_match: same,
                sql_similarity: if same { 1.0 } else { 0.0 },
                results_match: same,
                data_similarity: if same { 1.0 } else { 0.0 },
                ..EvalScores::default()
            }
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("connection refused")
        }
        fn model_id(&self) -> String {
            "down".into()
        }
    }

    fn questions() -> Vec<Question> {
        (1..=3)
            .map(|i| Question {
                id: i.to_string(),
                category: "c".into(),
                complexity: "simple".into(),
                question: format!("How many companies, take {}?", i),
                ground_truth_sql: "SELECT COUNT(*) AS n FROM company".into(),
                sql_pattern: "AGGREGATION".into(),
                expected_columns: Vec::new(),
            })
            .collect()
    }

    fn runner(
        dir: &std::path::Path,
        store: Arc<dyn QueryStore>,
        client: Arc<dyn LlmClient>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> ExperimentRunner {
        ExperimentRunner::new(
            Arc::new(ExampleSelector::new(default_pool(), embedder)),
            store,
            PromptBuilder::new(SCHEMA_DESCRIPTION),
            Arc::new(FixedEvaluator),
            RunPolicy::in_dir("exp", dir),
        )
        .with_client("fake", client)
    }

    #[tokio::test]
    async fn one_record_per_question_and_configuration() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = Arc::new(FakeClient::always("SELECT COUNT(*) AS n FROM company"));
        let r = runner(dir.path(), Arc::new(SqliteStore::demo()?), client.clone(), None);
        let configs = vec![
            Configuration::new(0, SelectionStrategy::FirstN, "fake"),
            Configuration::new(2, SelectionStrategy::FirstN, "fake"),
        ];
        let run = r.run(&questions(), &configs).await?;
        assert_eq!(run.records.len(), 6);
        assert_eq!(run.processed, 6);
        assert_eq!(run.records[0].configuration, "first_n-0shot@fake");
        assert_eq!(run.records[3].configuration, "first_n-2shot@fake");
        assert!(run.records.iter().all(|r| r.execution_success && r.results_match));
        assert_eq!(run.summary.overall.execution_accuracy, 100.0);
        assert!(run.summary_path.exists());
        assert_eq!(crate::storage::results::read_records(&run.results_path)?.len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn stop_flag_halts_before_next_question() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = Arc::new(FakeClient::always("SELECT 1"));
        let r = runner(dir.path(), Arc::new(SqliteStore::demo()?), client, None);
        r.stop_handle().store(true, Ordering::SeqCst);
        let run = r
            .run(&questions(), &[Configuration::new(0, SelectionStrategy::FirstN, "fake")])
            .await?;
        assert!(run.interrupted);
        assert_eq!(run.processed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_store_is_a_setup_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let client = Arc::new(FakeClient::always("SELECT 1"));
        let r = runner(dir.path(), Arc::new(FailingStore::default()), client.clone(), None);
        let err = r
            .run(&questions(), &[Configuration::new(0, SelectionStrategy::FirstN, "fake")])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("config error"));
        assert_eq!(client.calls(), 0);
        assert!(!dir.path().join("exp.csv").exists());
        Ok(())
    }

    #[tokio::test]
    async fn similarity_without_embedder_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let r = runner(
            dir.path(),
            Arc::new(SqliteStore::demo()?),
            Arc::new(FakeClient::always("SELECT 1")),
            None,
        );
        let err = r
            .run(&questions(), &[Configuration::new(3, SelectionStrategy::Similarity, "fake")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("needs an embedder"));
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failure_blocks_or_falls_back() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let configs = [Configuration::new(3, SelectionStrategy::Similarity, "fake")];
        let client = Arc::new(FakeClient::always("SELECT COUNT(*) AS n FROM company"));

        let blocked = runner(
            dir.path(),
            Arc::new(SqliteStore::demo()?),
            client.clone(),
            Some(Arc::new(DownEmbedder)),
        );
        let run = blocked.run(&questions(), &configs).await?;
        assert!(run
            .records
            .iter()
            .all(|r| r.failure_kind == Some(FailureKind::Selection) && !r.execution_success));
        assert_eq!(client.calls(), 0);

        let mut policy = RunPolicy::in_dir("fallback", dir.path());
        policy.on_embedding_error = ErrorPolicy::Allow;
        let allowed = ExperimentRunner::new(
            Arc::new(ExampleSelector::new(default_pool(), Some(Arc::new(DownEmbedder)))),
            Arc::new(SqliteStore::demo()?),
            PromptBuilder::new(SCHEMA_DESCRIPTION),
            Arc::new(FixedEvaluator),
            policy,
        )
        .with_client("fake", client.clone());
        let run = allowed.run(&questions(), &configs).await?;
        assert!(run.records.iter().all(|r| r.execution_success));
        assert!(client.prompts()[0].contains(&default_pool()[0].question));
        Ok(())
    }
}
