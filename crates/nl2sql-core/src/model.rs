use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternTag {
    SimpleSelect,
    Join,
    Aggregation,
    WindowFunction,
    Cte,
    Case,
    Subquery,
}

impl PatternTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternTag::SimpleSelect => "SIMPLE_SELECT",
            PatternTag::Join => "JOIN",
            PatternTag::Aggregation => "AGGREGATION",
            PatternTag::WindowFunction => "WINDOW_FUNCTION",
            PatternTag::Cte => "CTE",
            PatternTag::Case => "CASE",
            PatternTag::Subquery => "SUBQUERY",
        }
    }
}

impl fmt::Display for PatternTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A curated question/SQL pair shown to the model as a demonstration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub question: String,
    pub sql: String,
    pub pattern: PatternTag,
}

/// A benchmark question with its reference query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "id", alias = "question_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub complexity: String,
    pub question: String,
    pub ground_truth_sql: String,
    #[serde(default)]
    pub sql_pattern: String,
    #[serde(default)]
    pub expected_columns: Vec<String>,
}

fn string_or_number<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        S(String),
        I(i64),
    }
    Ok(match Repr::deserialize(d)? {
        Repr::S(s) => s,
        Repr::I(i) => i.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    #[serde(alias = "similarity_based", alias = "semantic")]
    Similarity,
    /// Pool order, no embeddings involved.
    #[serde(alias = "fixed", alias = "first")]
    FirstN,
    Random,
    #[serde(alias = "pattern")]
    PatternBased,
}

impl SelectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionStrategy::Similarity => "similarity",
            SelectionStrategy::FirstN => "first_n",
            SelectionStrategy::Random => "random",
            SelectionStrategy::PatternBased => "pattern_based",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "similarity" | "similarity_based" | "semantic" => Some(Self::Similarity),
            "first_n" | "fixed" | "first" => Some(Self::FirstN),
            "random" => Some(Self::Random),
            "pattern_based" | "pattern" => Some(Self::PatternBased),
            _ => None,
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of the experiment grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    pub num_few_shot_examples: usize,
    pub strategy: SelectionStrategy,
    pub model_name: String,
}

impl Configuration {
    pub fn new(num_few_shot_examples: usize, strategy: SelectionStrategy, model_name: &str) -> Self {
        Self {
            num_few_shot_examples,
            strategy,
            model_name: model_name.to_string(),
        }
    }

    /// Stable identifier, used as the resume key together with the question id.
    pub fn label(&self) -> String {
        format!(
            "{}-{}shot@{}",
            self.strategy, self.num_few_shot_examples, self.model_name
        )
    }
}

/// How result rows are compared against ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowOrder {
    /// Order-sensitive only when the reference query has a top-level ORDER BY.
    #[default]
    Auto,
    Strict,
    Unordered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptOutcome {
    ExecutedOk,
    ExecutionError,
    ExtractionFailed,
    PolicyViolation,
    ProviderError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub prompt: String,
    pub raw_completion: String,
    pub extracted_sql: Option<String>,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Why a question produced no usable SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Execution,
    Extraction,
    Policy,
    Provider,
    Selection,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Execution => "execution",
            FailureKind::Extraction => "extraction",
            FailureKind::Policy => "policy",
            FailureKind::Provider => "provider",
            FailureKind::Selection => "selection",
        }
    }
}

/// Per-question metric scores as produced by an [`crate::metrics_api::Evaluator`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalScores {
    pub exact_match: bool,
    pub sql_similarity: f64,
    pub bleu: f64,
    pub results_match: bool,
    pub row_count_match: bool,
    pub column_count_match: bool,
    pub data_similarity: f64,
    pub missing_components: Vec<String>,
    pub extra_components: Vec<String>,
}

/// What the generator produced for one question, flattened for persistence.
#[derive(Debug, Clone, Default)]
pub struct GenerationSummary {
    pub generated_sql: Option<String>,
    pub execution_success: bool,
    pub execution_time: f64,
    pub attempts: u32,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

/// One row of an experiment run. Column names match the results CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub experiment_name: String,
    pub configuration: String,
    pub question_id: String,
    pub question: String,
    pub category: String,
    pub complexity: String,
    pub sql_pattern: String,
    pub generated_sql: String,
    pub ground_truth_sql: String,
    pub execution_success: bool,
    pub execution_time: f64,
    pub sql_similarity_score: f64,
    pub exact_match: bool,
    pub bleu_score: f64,
    pub results_match: bool,
    pub row_count_match: bool,
    pub column_count_match: bool,
    pub data_similarity_score: f64,
    pub num_few_shot_examples: usize,
    pub selection_strategy: String,
    pub model_name: String,
    pub attempts: u32,
    pub failure_kind: Option<FailureKind>,
    pub execution_error: Option<String>,
    pub missing_components: String,
    pub extra_components: String,
    pub timestamp: String,
}

impl EvaluationRecord {
    /// The only way records are built; result-level scores are zeroed whenever
    /// the generated SQL did not execute.
    pub fn assemble(
        experiment_name: &str,
        cfg: &Configuration,
        q: &Question,
        gen: GenerationSummary,
        scores: EvalScores,
    ) -> Self {
        let executed = gen.execution_success;
        Self {
            experiment_name: experiment_name.to_string(),
            configuration: cfg.label(),
            question_id: q.id.clone(),
            question: q.question.clone(),
            category: q.category.clone(),
            complexity: q.complexity.clone(),
            sql_pattern: q.sql_pattern.clone(),
            generated_sql: gen.generated_sql.unwrap_or_default(),
            ground_truth_sql: q.ground_truth_sql.clone(),
            execution_success: executed,
            execution_time: gen.execution_time,
            sql_similarity_score: scores.sql_similarity,
            exact_match: scores.exact_match,
            bleu_score: scores.bleu,
            results_match: executed && scores.results_match,
            row_count_match: executed && scores.row_count_match,
            column_count_match: executed && scores.column_count_match,
            data_similarity_score: if executed { scores.data_similarity } else { 0.0 },
            num_few_shot_examples: cfg.num_few_shot_examples,
            selection_strategy: cfg.strategy.to_string(),
            model_name: cfg.model_name.clone(),
            attempts: gen.attempts,
            failure_kind: gen.failure,
            execution_error: gen.error,
            missing_components: scores.missing_components.join(";"),
            extra_components: scores.extra_components.join(";"),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn resume_key(&self) -> (String, String) {
        (self.configuration.clone(), self.question_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> Question {
        Question {
            id: "q1".into(),
            category: "revenue".into(),
            complexity: "simple".into(),
            question: "What was revenue in FY2024?".into(),
            ground_truth_sql: "SELECT 1".into(),
            sql_pattern: "SIMPLE_SELECT".into(),
            expected_columns: vec![],
        }
    }

    #[test]
    fn failed_execution_zeroes_result_scores() {
        let cfg = Configuration::new(5, SelectionStrategy::Similarity, "m");
        let scores = EvalScores {
            results_match: true,
            row_count_match: true,
            column_count_match: true,
            data_similarity: 0.9,
            sql_similarity: 0.4,
            ..Default::default()
        };
        let gen = GenerationSummary {
            generated_sql: Some("SELECT x".into()),
            execution_success: false,
            attempts: 3,
            failure: Some(FailureKind::Execution),
            ..Default::default()
        };
        let rec = EvaluationRecord::assemble("exp", &cfg, &question(), gen, scores);
        assert!(!rec.results_match);
        assert_eq!(rec.data_similarity_score, 0.0);
        assert!((rec.sql_similarity_score - 0.4).abs() < 1e-9);
        assert_eq!(rec.configuration, "similarity-5shot@m");
    }

    #[test]
    fn question_id_accepts_numbers() {
        let q: Question = serde_json::from_str(
            r#"{"id": 7, "question": "q", "ground_truth_sql": "SELECT 1"}"#,
        )
        .unwrap();
        assert_eq!(q.id, "7");
        let q: Question = serde_json::from_str(
            r#"{"question_id": "Q7", "question": "q", "ground_truth_sql": "SELECT 1"}"#,
        )
        .unwrap();
        assert_eq!(q.id, "Q7");
    }

    #[test]
    fn strategy_aliases() {
        let s: SelectionStrategy = serde_yaml::from_str("similarity_based").unwrap();
        assert_eq!(s, SelectionStrategy::Similarity);
        assert_eq!(SelectionStrategy::parse("pattern"), Some(SelectionStrategy::PatternBased));
        assert_eq!(SelectionStrategy::parse("nope"), None);
    }
}
