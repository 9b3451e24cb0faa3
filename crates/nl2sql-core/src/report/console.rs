use super::summary::{Aggregate, RunSummary};
use crate::model::EvaluationRecord;

/// One progress line per processed question.
pub fn print_record(rec: &EvaluationRecord) {
    let duration = format!("({:.2}s)", rec.execution_time);
    let label = format!("{} Q{}", rec.configuration, rec.question_id);
    if rec.results_match {
        eprintln!(
            "✅ {:<36} sim {:.2}  bleu {:.2}  {}",
            label, rec.sql_similarity_score, rec.bleu_score, duration
        );
    } else if rec.execution_success {
        eprintln!(
            "⚠️  {:<36} WRONG RESULT  data {:.2}  {}",
            label, rec.data_similarity_score, duration
        );
    } else {
        let kind = rec.failure_kind.map(|k| k.as_str()).unwrap_or("unknown");
        eprintln!(
            "❌ {:<36} FAILED ({}) after {} attempt(s)",
            label, kind, rec.attempts
        );
        if let Some(err) = &rec.execution_error {
            eprintln!("      → {}", truncate(err, 100));
        }
    }
}

fn aggregate_line(name: &str, a: &Aggregate) -> String {
    format!(
        "{:<32} n={:<4} exec {:>5.1}%  sem {:>5.1}%  overall {:>5.1}  sim {:.2}  bleu {:.2}",
        name,
        a.total,
        a.execution_accuracy,
        a.semantic_correctness,
        a.overall_score,
        a.avg_sql_similarity,
        a.avg_bleu
    )
}

pub fn print_run_summary(summary: &RunSummary) {
    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!("Experiment: {}", summary.experiment);
    eprintln!("{}", aggregate_line("overall", &summary.overall));
    if summary.by_configuration.len() > 1 {
        eprintln!("\nBy configuration:");
        for (label, a) in &summary.by_configuration {
            eprintln!("  {}", aggregate_line(label, a));
        }
    }
    if !summary.by_pattern.is_empty() {
        eprintln!("\nBy SQL pattern:");
        for (p, a) in &summary.by_pattern {
            eprintln!("  {}", aggregate_line(p, a));
        }
    }
    if !summary.failures.is_empty() {
        let parts: Vec<String> = summary
            .failures
            .iter()
            .map(|(k, n)| format!("{} {}", n, k))
            .collect();
        eprintln!("\nFailures: {}", parts.join(", "));
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    let one_line = s.replace('\n', " ");
    match one_line.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &one_line[..idx]),
        None => one_line,
    }
}
