use super::console::truncate;
use super::summary::{summarize, Aggregate};
use crate::model::EvaluationRecord;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Breakdown of what went wrong in a finished (or partial) run.
#[derive(Debug, Clone)]
pub struct FailureAnalysis {
    pub overall: Aggregate,
    pub wrong_but_executable: usize,
    pub execution_failures: Vec<EvaluationRecord>,
    pub semantic_errors: Vec<EvaluationRecord>,
    pub correct: Vec<EvaluationRecord>,
    /// Error kind (the prefix of the stored execution error) to count.
    pub error_kinds: BTreeMap<String, usize>,
    /// Ground-truth components the generated SQL lacked, across semantic errors.
    pub missing_components: BTreeMap<String, usize>,
    pub by_complexity: BTreeMap<String, Aggregate>,
    pub by_category: BTreeMap<String, Aggregate>,
    pub by_num_examples: BTreeMap<usize, Aggregate>,
}

pub fn analyze(records: &[EvaluationRecord]) -> FailureAnalysis {
    let summary = summarize("", records);
    let mut a = FailureAnalysis {
        overall: summary.overall,
        wrong_but_executable: 0,
        execution_failures: Vec::new(),
        semantic_errors: Vec::new(),
        correct: Vec::new(),
        error_kinds: BTreeMap::new(),
        missing_components: BTreeMap::new(),
        by_complexity: summary.by_complexity,
        by_category: summary.by_category,
        by_num_examples: summary.by_num_examples,
    };

    for r in records {
        if !r.execution_success {
            let kind = r
                .execution_error
                .as_deref()
                .and_then(|e| e.split_once(':'))
                .map(|(k, _)| k.trim().to_string())
                .filter(|k| !k.is_empty() && !k.contains(' '))
                .or_else(|| r.failure_kind.map(|f| f.as_str().to_ascii_uppercase()))
                .unwrap_or_else(|| "UNKNOWN".to_string());
            *a.error_kinds.entry(kind).or_insert(0) += 1;
            a.execution_failures.push(r.clone());
        } else if !r.results_match {
            for c in r.missing_components.split(';').filter(|c| !c.is_empty()) {
                *a.missing_components.entry(c.to_string()).or_insert(0) += 1;
            }
            a.semantic_errors.push(r.clone());
        } else {
            a.correct.push(r.clone());
        }
    }
    a.wrong_but_executable = a.semantic_errors.len();
    a
}

fn pct(n: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        n as f64 / total as f64 * 100.0
    }
}

impl FailureAnalysis {
    pub fn render(&self) -> String {
        let total = self.overall.total;
        let mut out = String::new();
        let rule = "=".repeat(80);
        let _ = writeln!(out, "{}\nEXPERIMENT FAILURE ANALYSIS\n{}", rule, rule);

        let _ = writeln!(out, "\nOverall:");
        let _ = writeln!(out, "  Total queries:          {}", total);
        let _ = writeln!(
            out,
            "  Executed successfully:  {} ({:.1}%)",
            self.overall.executed,
            pct(self.overall.executed, total)
        );
        let _ = writeln!(
            out,
            "  Semantically correct:   {} ({:.1}%)",
            self.overall.correct,
            pct(self.overall.correct, total)
        );
        let _ = writeln!(
            out,
            "  Wrong but executable:   {} ({:.1}%)",
            self.wrong_but_executable,
            pct(self.wrong_but_executable, total)
        );

        if !self.execution_failures.is_empty() {
            let _ = writeln!(out, "\nExecution failures ({}):", self.execution_failures.len());
            for (kind, n) in &self.error_kinds {
                let _ = writeln!(out, "  {:<12} {}", kind, n);
            }
            for r in &self.execution_failures {
                let _ = writeln!(out, "\n  Q{} [{}] {}", r.question_id, r.configuration, truncate(&r.question, 60));
                let _ = writeln!(
                    out,
                    "    Error: {}",
                    truncate(r.execution_error.as_deref().unwrap_or("-"), 100)
                );
                let _ = writeln!(out, "    SQL:   {}", truncate(&r.generated_sql, 150));
            }
        }

        if !self.semantic_errors.is_empty() {
            let _ = writeln!(
                out,
                "\nSemantic errors ({}, executed but wrong results):",
                self.semantic_errors.len()
            );
            if !self.missing_components.is_empty() {
                let parts: Vec<String> = self
                    .missing_components
                    .iter()
                    .map(|(c, n)| format!("{} x{}", c, n))
                    .collect();
                let _ = writeln!(out, "  Most often missing: {}", parts.join(", "));
            }
            for r in &self.semantic_errors {
                let _ = writeln!(out, "\n  Q{} [{}] {}", r.question_id, r.configuration, truncate(&r.question, 60));
                let _ = writeln!(
                    out,
                    "    Category: {}, complexity: {}, SQL similarity {:.1}%",
                    r.category,
                    r.complexity,
                    r.sql_similarity_score * 100.0
                );
                let _ = writeln!(
                    out,
                    "    Row match: {}, column match: {}, data similarity {:.1}%",
                    r.row_count_match,
                    r.column_count_match,
                    r.data_similarity_score * 100.0
                );
                let _ = writeln!(
                    out,
                    "    Missing: {}  Extra: {}",
                    or_dash(&r.missing_components),
                    or_dash(&r.extra_components)
                );
                let _ = writeln!(out, "    Generated:    {}", truncate(&r.generated_sql, 200));
                let _ = writeln!(out, "    Ground truth: {}", truncate(&r.ground_truth_sql, 200));
            }
        }

        if !self.correct.is_empty() {
            let _ = writeln!(out, "\nCorrect queries ({}):", self.correct.len());
            for r in &self.correct {
                let _ = writeln!(
                    out,
                    "  Q{} {} (similarity {:.1}%)",
                    r.question_id,
                    truncate(&r.question, 60),
                    r.sql_similarity_score * 100.0
                );
            }
        }

        let _ = writeln!(out, "\nAccuracy by complexity:");
        for (k, a) in &self.by_complexity {
            let _ = writeln!(out, "  {:<12} {:.1}% ({}/{})", k, a.semantic_correctness, a.correct, a.total);
        }
        let _ = writeln!(out, "\nAccuracy by category:");
        for (k, a) in &self.by_category {
            let _ = writeln!(out, "  {:<20} {:.1}% ({}/{})", k, a.semantic_correctness, a.correct, a.total);
        }
        let _ = writeln!(out, "\nBy number of examples:");
        for (k, a) in &self.by_num_examples {
            let _ = writeln!(
                out,
                "  {:>2} examples: exec {:.1}%, semantic {:.1}%",
                k, a.execution_accuracy, a.semantic_correctness
            );
        }
        let _ = writeln!(out, "\n{}", rule);
        out
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
