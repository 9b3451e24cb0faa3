use std::sync::Arc;

use nl2sql_core::metrics_api::{EvalInput, Evaluator};
use nl2sql_core::model::{EvalScores, RowOrder};

pub mod bleu;
pub mod components;
pub mod normalize;
pub mod results;
pub mod similarity;

pub use bleu::bleu_score;
pub use components::{component_diff, components, Component};
pub use normalize::{normalize_sql, sql_tokens};
pub use results::{compare_results, has_top_level_order_by, ResultComparison};
pub use similarity::{exact_match, sql_similarity};

/// Text-level and result-level scores for one generated statement.
pub struct SqlEvaluator;

impl Evaluator for SqlEvaluator {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn evaluate(&self, input: &EvalInput<'_>) -> EvalScores {
        let gt = input.ground_truth_sql;
        let Some(sql) = input.generated_sql.filter(|s| !s.trim().is_empty()) else {
            let (missing, _) = component_diff("", gt);
            return EvalScores {
                missing_components: missing,
                ..EvalScores::default()
            };
        };

        let ordered = match input.row_order {
            RowOrder::Strict => true,
            RowOrder::Unordered => false,
            RowOrder::Auto => has_top_level_order_by(gt),
        };
        let cmp = compare_results(input.generated, input.expected, ordered);
        let (missing, extra) = component_diff(sql, gt);

        let scores = EvalScores {
            exact_match: exact_match(sql, gt),
            sql_similarity: sql_similarity(sql, gt),
            bleu: bleu_score(&sql_tokens(sql), &sql_tokens(gt)),
            results_match: cmp.results_match,
            row_count_match: cmp.row_count_match,
            column_count_match: cmp.column_count_match,
            data_similarity: cmp.data_similarity,
            missing_components: missing,
            extra_components: extra,
        };
        tracing::trace!(
            event = "nl2sql.metrics.scored",
            exact = scores.exact_match,
            similarity = scores.sql_similarity,
            results_match = scores.results_match
        );
        scores
    }
}

pub fn default_evaluator() -> Arc<dyn Evaluator> {
    Arc::new(SqlEvaluator)
}
