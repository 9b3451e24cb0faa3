use crate::errors::ConfigError;
use crate::model::Question;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
#[serde(untagged)]
enum QuestionFile {
    Wrapped { test_questions: Vec<Question> },
    Bare(Vec<Question>),
}

pub fn parse_questions(raw: &str) -> anyhow::Result<Vec<Question>> {
    let parsed: QuestionFile = serde_json::from_str(raw)?;
    let questions = match parsed {
        QuestionFile::Wrapped { test_questions } => test_questions,
        QuestionFile::Bare(q) => q,
    };
    Ok(questions)
}

/// Reads a question set: either `{"test_questions": [...]}` or a bare array.
/// Duplicate ids are rejected because they would collide on resume.
pub fn load_questions(path: &Path) -> Result<Vec<Question>, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read questions {}: {}", path.display(), e)))?;
    let questions = parse_questions(&raw)
        .map_err(|e| ConfigError(format!("failed to parse questions {}: {}", path.display(), e)))?;

    let mut seen = std::collections::HashSet::new();
    for q in &questions {
        if !seen.insert(q.id.as_str()) {
            return Err(ConfigError(format!(
                "duplicate question id {} in {}",
                q.id,
                path.display()
            )));
        }
    }
    Ok(questions)
}

/// Questions `from..to`, 1-based and inclusive, clamped to the set.
pub fn select_range(questions: Vec<Question>, from: Option<usize>, to: Option<usize>) -> Vec<Question> {
    let start = from.unwrap_or(1).max(1) - 1;
    let end = to.unwrap_or(questions.len()).min(questions.len());
    if start >= end {
        return Vec::new();
    }
    questions.into_iter().skip(start).take(end - start).collect()
}

pub const SAMPLE_QUESTIONS: &str = r#"{
  "test_questions": [
    {
      "id": 1,
      "category": "profitability",
      "complexity": "simple",
      "question": "What was the revenue from operations in 2024?",
      "sql_pattern": "SIMPLE_SELECT",
      "ground_truth_sql": "SELECT ff.value FROM financial_fact ff JOIN statement s ON ff.statement_id = s.statement_id JOIN fiscal_period fp ON s.period_id = fp.period_id JOIN line_item li ON ff.line_item_id = li.line_item_id WHERE li.normalized_code = 'HUL_PROFIT_LOSS_REVENUE_FROM_OPERATIONS_NET' AND fp.fiscal_year = 2024"
    },
    {
      "id": 2,
      "category": "profitability",
      "complexity": "medium",
      "question": "Show net profit for every year in chronological order",
      "sql_pattern": "JOIN",
      "ground_truth_sql": "SELECT fp.fiscal_year, ff.value AS net_profit FROM financial_fact ff JOIN statement s ON ff.statement_id = s.statement_id JOIN fiscal_period fp ON s.period_id = fp.period_id JOIN line_item li ON ff.line_item_id = li.line_item_id WHERE li.normalized_code = 'HUL_PROFIT_LOSS_PROFIT_LOSS_FOR_THE_PERIOD' ORDER BY fp.fiscal_year"
    },
    {
      "id": 3,
      "category": "liquidity",
      "complexity": "medium",
      "question": "What is the average current ratio across all years?",
      "sql_pattern": "AGGREGATION",
      "ground_truth_sql": "SELECT ROUND(AVG(ff.value), 2) AS avg_current_ratio FROM financial_fact ff JOIN line_item li ON ff.line_item_id = li.line_item_id WHERE li.normalized_code = 'HUL_RATIOS_CURRENT_RATIO'"
    },
    {
      "id": 4,
      "category": "growth",
      "complexity": "complex",
      "question": "Show the year-over-year growth of total assets",
      "sql_pattern": "WINDOW_FUNCTION",
      "ground_truth_sql": "SELECT fp.fiscal_year, ff.value AS total_assets, ROUND((ff.value - LAG(ff.value) OVER (ORDER BY fp.fiscal_year)) * 100.0 / NULLIF(LAG(ff.value) OVER (ORDER BY fp.fiscal_year), 0), 2) AS growth_pct FROM financial_fact ff JOIN statement s ON ff.statement_id = s.statement_id JOIN fiscal_period fp ON s.period_id = fp.period_id JOIN line_item li ON ff.line_item_id = li.line_item_id WHERE li.normalized_code = 'HUL_BALANCE_TOTAL_ASSETS' ORDER BY fp.fiscal_year"
    }
  ]
}
"#;

pub fn write_sample_questions(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_QUESTIONS)
        .map_err(|e| ConfigError(format!("failed to write sample questions: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wrapped_and_bare_sets() -> anyhow::Result<()> {
        let wrapped = parse_questions(SAMPLE_QUESTIONS)?;
        assert_eq!(wrapped.len(), 4);
        assert_eq!(wrapped[0].id, "1");
        assert_eq!(wrapped[3].sql_pattern, "WINDOW_FUNCTION");

        let bare = parse_questions(
            r#"[{"question_id": "q7", "question": "x?", "ground_truth_sql": "SELECT 1"}]"#,
        )?;
        assert_eq!(bare[0].id, "q7");
        assert!(bare[0].category.is_empty());
        Ok(())
    }

    #[test]
    fn rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "question": "a", "ground_truth_sql": "SELECT 1"},
                {"id": "1", "question": "b", "ground_truth_sql": "SELECT 2"}]"#,
        )
        .unwrap();
        let err = load_questions(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate question id 1"));
    }

    #[test]
    fn range_is_one_based_inclusive() {
        let qs = parse_questions(SAMPLE_QUESTIONS).unwrap();
        let picked = select_range(qs.clone(), Some(2), Some(3));
        assert_eq!(
            picked.iter().map(|q| q.id.as_str()).collect::<Vec<_>>(),
            ["2", "3"]
        );
        assert_eq!(select_range(qs.clone(), None, Some(99)).len(), 4);
        assert!(select_range(qs, Some(5), None).is_empty());
    }
}
