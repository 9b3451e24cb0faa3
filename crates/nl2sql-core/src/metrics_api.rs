use crate::model::{EvalScores, RowOrder};
use crate::table::ResultTable;

/// Everything an evaluator may look at for one question.
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    pub generated_sql: Option<&'a str>,
    pub ground_truth_sql: &'a str,
    /// Result of the generated SQL; `None` when it did not execute.
    pub generated: Option<&'a ResultTable>,
    /// Result of the ground truth; `None` when the ground truth itself failed.
    pub expected: Option<&'a ResultTable>,
    pub row_order: RowOrder,
}

/// Scores one generated statement against its ground truth. Implementations
/// are pure and must not fail; missing inputs score as mismatches.
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, input: &EvalInput<'_>) -> EvalScores;
}
