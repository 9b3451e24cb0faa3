use crate::model::EvaluationRecord;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const EXECUTION_WEIGHT: f64 = 0.4;
const SEMANTIC_WEIGHT: f64 = 0.4;
const SIMILARITY_WEIGHT: f64 = 0.2;

/// Aggregate scores over a group of records. The denominator always counts
/// every record, failures included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub total: usize,
    pub executed: usize,
    pub correct: usize,
    /// Percent of records whose SQL executed.
    pub execution_accuracy: f64,
    /// Percent of records whose results matched the ground truth.
    pub semantic_correctness: f64,
    pub overall_score: f64,
    pub avg_sql_similarity: f64,
    pub avg_bleu: f64,
    pub avg_data_similarity: f64,
    pub exact_match_rate: f64,
    pub avg_execution_time: f64,
    pub avg_attempts: f64,
}

impl Aggregate {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a EvaluationRecord>,
    {
        let mut a = Aggregate::default();
        let (mut sim, mut bleu, mut data, mut exact, mut time, mut attempts) =
            (0.0, 0.0, 0.0, 0usize, 0.0, 0u64);
        for r in records {
            a.total += 1;
            a.executed += r.execution_success as usize;
            a.correct += r.results_match as usize;
            sim += r.sql_similarity_score;
            bleu += r.bleu_score;
            data += r.data_similarity_score;
            exact += r.exact_match as usize;
            time += r.execution_time;
            attempts += r.attempts as u64;
        }
        if a.total == 0 {
            return a;
        }
        let n = a.total as f64;
        a.execution_accuracy = a.executed as f64 / n * 100.0;
        a.semantic_correctness = a.correct as f64 / n * 100.0;
        a.avg_sql_similarity = sim / n;
        a.avg_bleu = bleu / n;
        a.avg_data_similarity = data / n;
        a.exact_match_rate = exact as f64 / n * 100.0;
        a.avg_execution_time = time / n;
        a.avg_attempts = attempts as f64 / n;
        a.overall_score = EXECUTION_WEIGHT * a.execution_accuracy
            + SEMANTIC_WEIGHT * a.semantic_correctness
            + SIMILARITY_WEIGHT * a.avg_sql_similarity * 100.0;
        a
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub experiment: String,
    pub generated_at: String,
    pub overall: Aggregate,
    /// Keyed by configuration label, in the order configurations ran.
    pub by_configuration: Vec<(String, Aggregate)>,
    pub by_pattern: BTreeMap<String, Aggregate>,
    pub by_category: BTreeMap<String, Aggregate>,
    pub by_complexity: BTreeMap<String, Aggregate>,
    pub by_num_examples: BTreeMap<usize, Aggregate>,
    pub failures: BTreeMap<String, usize>,
}

fn group_by<'a, K, F>(records: &'a [EvaluationRecord], key: F) -> BTreeMap<K, Aggregate>
where
    K: Ord,
    F: Fn(&'a EvaluationRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&EvaluationRecord>> = BTreeMap::new();
    for r in records {
        groups.entry(key(r)).or_default().push(r);
    }
    groups
        .into_iter()
        .map(|(k, v)| (k, Aggregate::from_records(v)))
        .collect()
}

fn label_or_unknown(s: &str) -> String {
    if s.trim().is_empty() {
        "unknown".to_string()
    } else {
        s.to_string()
    }
}

pub fn summarize(experiment: &str, records: &[EvaluationRecord]) -> RunSummary {
    let mut config_order: Vec<String> = Vec::new();
    for r in records {
        if !config_order.contains(&r.configuration) {
            config_order.push(r.configuration.clone());
        }
    }
    let by_configuration = config_order
        .into_iter()
        .map(|label| {
            let agg = Aggregate::from_records(records.iter().filter(|r| r.configuration == label));
            (label, agg)
        })
        .collect();

    let mut failures = BTreeMap::new();
    for r in records {
        if let Some(kind) = r.failure_kind {
            *failures.entry(kind.as_str().to_string()).or_insert(0) += 1;
        }
    }

    RunSummary {
        experiment: experiment.to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        overall: Aggregate::from_records(records),
        by_configuration,
        by_pattern: group_by(records, |r| label_or_unknown(&r.sql_pattern)),
        by_category: group_by(records, |r| label_or_unknown(&r.category)),
        by_complexity: group_by(records, |r| label_or_unknown(&r.complexity)),
        by_num_examples: group_by(records, |r| r.num_few_shot_examples),
        failures,
    }
}

/// Writes the summary next to the results, replacing the previous one atomically.
pub fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(summary)?;
    std::fs::write(&tmp, body).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move summary into place at {}", path.display()))?;
    Ok(())
}

pub fn read_summary(path: &Path) -> anyhow::Result<RunSummary> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(serde_json::from_slice(&raw)?)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{Configuration, EvalScores, FailureKind, GenerationSummary, Question};
    use crate::model::{EvaluationRecord, SelectionStrategy};

    pub fn record(id: &str, executed: bool, correct: bool, similarity: f64) -> EvaluationRecord {
        let q = Question {
            id: id.to_string(),
            category: "profitability".into(),
            complexity: "simple".into(),
            question: format!("question {}", id),
            ground_truth_sql: "SELECT 1".into(),
            sql_pattern: "SIMPLE_SELECT".into(),
            expected_columns: Vec::new(),
        };
        let cfg = Configuration::new(3, SelectionStrategy::FirstN, "fake");
        let gen = GenerationSummary {
            generated_sql: Some("SELECT 1".into()),
            execution_success: executed,
            execution_time: 0.01,
            attempts: 1,
            failure: (!executed).then_some(FailureKind::Execution),
            error: (!executed).then(|| "SCHEMA: no such table: x".to_string()),
        };
        let scores = EvalScores {
            sql_similarity: similarity,
            results_match: correct,
            row_count_match: correct,
            column_count_match: correct,
            data_similarity: if correct { 1.0 } else { 0.0 },
            ..EvalScores::default()
        };
        EvaluationRecord::assemble("exp", &cfg, &q, gen, scores)
    }
}
