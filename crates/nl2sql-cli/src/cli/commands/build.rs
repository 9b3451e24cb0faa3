use nl2sql_core::config::{EmbedderKind, ExperimentConfig, ProviderKind};
use nl2sql_core::engine::{ExperimentRunner, RunPolicy};
use nl2sql_core::executor::{QueryStore, SqliteStore};
use nl2sql_core::fewshot::{default_pool, load_pool, ExampleSelector, PromptBuilder, TokenCounter};
use nl2sql_core::fewshot::SCHEMA_DESCRIPTION;
use nl2sql_core::generator::GeneratorSettings;
use nl2sql_core::model::{Configuration, Example, Question};
use nl2sql_core::providers::embedder::{Embedder, HashingEmbedder, OpenAIEmbedder};
use nl2sql_core::providers::llm::{
    CachedClient, FakeClient, HuggingFaceClient, LlmClient, OpenAIClient, PacedClient,
};
use nl2sql_core::retry::{Backoff, RetryPolicy};
use nl2sql_core::storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Question text to ground truth, served by the fake provider.
pub fn oracle_answers(questions: &[Question]) -> HashMap<String, String> {
    questions
        .iter()
        .map(|q| (q.question.trim().to_string(), q.ground_truth_sql.clone()))
        .collect()
}

pub fn build_client(
    cfg: &ExperimentConfig,
    model: &str,
    oracle: &HashMap<String, String>,
    cache: Option<&Store>,
    refresh_cache: bool,
) -> anyhow::Result<Arc<dyn LlmClient>> {
    let s = &cfg.settings;
    let key = cfg.provider.api_key()?.unwrap_or_default();
    let raw: Arc<dyn LlmClient> = match cfg.provider {
        ProviderKind::Fake => Arc::new(FakeClient::oracle(oracle.clone())),
        ProviderKind::OpenAI => match &cfg.base_url {
            Some(url) => Arc::new(OpenAIClient::with_base_url(
                "openai",
                url,
                model.to_string(),
                key,
                s.max_tokens,
            )),
            None => Arc::new(OpenAIClient::new(model.to_string(), key, s.max_tokens)),
        },
        ProviderKind::Groq => Arc::new(OpenAIClient::groq(model.to_string(), key, s.max_tokens)),
        ProviderKind::HuggingFace => {
            Arc::new(HuggingFaceClient::new(model.to_string(), key, s.max_tokens))
        }
    };

    let retry = RetryPolicy {
        max_retries: s.rate_limit_retries,
        backoff: Backoff::Fixed(Duration::from_secs(s.rate_limit_wait_seconds)),
    };
    let paced: Arc<dyn LlmClient> = Arc::new(PacedClient::new(
        raw,
        Duration::from_millis(s.min_request_interval_ms),
        retry,
        Duration::from_secs(s.timeout_seconds.max(1)),
    ));

    let client: Arc<dyn LlmClient> = match cache {
        Some(store) if s.cache => Arc::new(CachedClient::new(paced, store.clone(), refresh_cache)),
        _ => paced,
    };
    Ok(client)
}

pub fn build_embedder(cfg: &ExperimentConfig) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
    let embedder: Arc<dyn Embedder> = match cfg.embedder {
        EmbedderKind::None => return Ok(None),
        EmbedderKind::Hashing => Arc::new(HashingEmbedder::default()),
        EmbedderKind::OpenAI => {
            let key = ProviderKind::OpenAI.api_key()?.unwrap_or_default();
            Arc::new(OpenAIEmbedder::new(cfg.embedding_model.clone(), key))
        }
    };
    Ok(Some(embedder))
}

pub fn build_pool(cfg: &ExperimentConfig) -> anyhow::Result<Vec<Example>> {
    match &cfg.pool {
        Some(path) => load_pool(path),
        None => Ok(default_pool()),
    }
}

pub fn build_selector(
    cfg: &ExperimentConfig,
    cache: Option<&Store>,
) -> anyhow::Result<ExampleSelector> {
    let mut selector = ExampleSelector::new(build_pool(cfg)?, build_embedder(cfg)?)
        .with_seed(cfg.settings.seed);
    if let Some(store) = cache {
        selector = selector.with_store(store.clone());
    }
    Ok(selector)
}

pub fn build_prompts(cfg: &ExperimentConfig) -> anyhow::Result<PromptBuilder> {
    let builder = PromptBuilder::new(SCHEMA_DESCRIPTION);
    Ok(match cfg.settings.token_budget {
        Some(budget) => builder.with_budget(Arc::new(TokenCounter::cl100k()?), budget),
        None => builder,
    })
}

pub fn generator_settings(cfg: &ExperimentConfig) -> GeneratorSettings {
    GeneratorSettings {
        max_attempts: cfg.settings.max_attempts,
        retry_extraction_failures: cfg.settings.retry_extraction_failures,
        execution_timeout: Duration::from_millis(cfg.settings.execution_timeout_ms),
    }
}

pub fn open_store(cfg: &ExperimentConfig) -> anyhow::Result<Arc<dyn QueryStore>> {
    Ok(Arc::new(SqliteStore::open_read_only(&cfg.database)?))
}

pub fn open_cache(cfg: &ExperimentConfig) -> anyhow::Result<Option<Store>> {
    if !cfg.settings.cache {
        return Ok(None);
    }
    Ok(Some(Store::open(&cfg.cache_path())?))
}

pub fn build_runner(
    cfg: &ExperimentConfig,
    questions: &[Question],
    configs: &[Configuration],
    resume: bool,
    refresh_cache: bool,
) -> anyhow::Result<ExperimentRunner> {
    let cache = open_cache(cfg)?;
    let store = open_store(cfg)?;
    let selector = Arc::new(build_selector(cfg, cache.as_ref())?);

    let mut policy = RunPolicy::in_dir(&cfg.experiment, &cfg.output_dir);
    policy.resume = resume;
    policy.row_order = cfg.settings.row_order;
    policy.on_embedding_error = cfg.settings.on_embedding_error;
    policy.generator = generator_settings(cfg);

    let mut runner = ExperimentRunner::new(
        selector,
        store,
        build_prompts(cfg)?,
        nl2sql_metrics::default_evaluator(),
        policy,
    );

    let oracle = oracle_answers(questions);
    let mut models: Vec<&str> = configs.iter().map(|c| c.model_name.as_str()).collect();
    models.dedup();
    for model in models {
        let client = build_client(cfg, model, &oracle, cache.as_ref(), refresh_cache)?;
        runner = runner.with_client(model, client);
    }
    Ok(runner)
}
