use crate::model::Example;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

const PREAMBLE: &str = "You are an expert financial data analyst. Write one SQLite query that answers the question, following the schema and the examples.";

const RULES: &str = "Rules:
- Use only SELECT or WITH statements. Never modify data.
- Use only the tables and columns listed in the schema.
- Join financial_fact to statement, fiscal_period and line_item as shown in the join path.
- Identify metrics by line_item.normalized_code (always starting with HUL_).
- Wrap every divisor in NULLIF(x, 0).";

const FINAL_INSTRUCTION: &str = "Return only the SQL query, with no explanation and no markdown.";

/// Token counter over the `cl100k_base` encoding.
pub struct TokenCounter {
    bpe: CoreBPE,
}

impl TokenCounter {
    pub fn cl100k() -> anyhow::Result<Self> {
        Ok(Self {
            bpe: tiktoken_rs::cl100k_base()?,
        })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    /// Number of leading examples from the selection that made it in.
    pub examples_used: usize,
    pub tokens: Option<usize>,
    pub over_budget: bool,
}

#[derive(Clone)]
pub struct PromptBuilder {
    schema: String,
    counter: Option<Arc<TokenCounter>>,
    token_budget: Option<usize>,
}

impl PromptBuilder {
    pub fn new(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            counter: None,
            token_budget: None,
        }
    }

    pub fn with_budget(mut self, counter: Arc<TokenCounter>, token_budget: usize) -> Self {
        self.counter = Some(counter);
        self.token_budget = Some(token_budget);
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Schema, rules, examples in selection order, then the question. When a
    /// budget is set, examples are dropped from the end (least similar)
    /// until the prompt fits.
    pub fn build(&self, question: &str, examples: &[Example]) -> BuiltPrompt {
        let mut used = examples.len();
        loop {
            let text = self.render(question, &examples[..used]);
            let (tokens, fits) = match (&self.counter, self.token_budget) {
                (Some(c), Some(budget)) => {
                    let n = c.count(&text);
                    (Some(n), n <= budget)
                }
                _ => (None, true),
            };
            if fits || used == 0 {
                if !fits {
                    tracing::warn!(
                        event = "nl2sql.prompt.over_budget",
                        tokens = tokens.unwrap_or(0),
                        budget = self.token_budget.unwrap_or(0),
                        "prompt exceeds budget with no examples left to drop"
                    );
                }
                if used < examples.len() {
                    tracing::debug!(
                        event = "nl2sql.prompt.truncated",
                        kept = used,
                        dropped = examples.len() - used
                    );
                }
                return BuiltPrompt {
                    text,
                    examples_used: used,
                    tokens,
                    over_budget: !fits,
                };
            }
            used -= 1;
        }
    }

    fn render(&self, question: &str, examples: &[Example]) -> String {
        let mut out = String::new();
        out.push_str(PREAMBLE);
        out.push_str("\n\n");
        out.push_str(self.schema.trim());
        out.push_str("\n\n");
        out.push_str(RULES);
        out.push_str("\n\n");
        if !examples.is_empty() {
            out.push_str("Examples:\n\n");
            for e in examples {
                out.push_str(&format!("Question: {}\nSQL:\n{}\n\n", e.question, e.sql.trim()));
            }
        }
        out.push_str(&format!(
            "Question: {}\n{}\nSQL:",
            question.trim(),
            FINAL_INSTRUCTION
        ));
        out
    }

    /// Repair prompt for a statement that failed to execute. It carries no
    /// examples, so no reselection happens between attempts.
    pub fn build_repair(&self, question: &str, failing_sql: &str, error: &str) -> String {
        format!(
            "The SQL query below failed. Fix it.

Schema:
{schema}

Question: {question}
Failing SQL:
{sql}
Error: {error}

Common mistakes:
- Wrong table or column names
- Missing JOINs between financial_fact, statement, fiscal_period and line_item
- normalized_code values that do not start with HUL_
- Division by zero (use NULLIF)
- Functions that SQLite does not support

{instruction}
Corrected SQL:",
            schema = self.schema.trim(),
            question = question.trim(),
            sql = failing_sql.trim(),
            error = error.trim(),
            instruction = FINAL_INSTRUCTION,
        )
    }

    /// Reminder used when the previous completion contained no statement.
    pub fn build_extraction_retry(&self, base_prompt: &str) -> String {
        format!(
            "{}\n\nYour previous reply did not contain a SQL statement. Reply with a single SELECT or WITH query and nothing else.\nSQL:",
            base_prompt.trim_end().trim_end_matches("SQL:").trim_end()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fewshot::pool::{default_pool, SCHEMA_DESCRIPTION};
    use crate::providers::llm::fake::last_question;

    #[test]
    fn layout_is_schema_examples_question() {
        let pool = default_pool();
        let b = PromptBuilder::new(SCHEMA_DESCRIPTION);
        let p = b.build("What was revenue in 2024?", &pool[..2]);
        let schema_at = p.text.find("Tables:").unwrap();
        let first_ex = p.text.find(&pool[0].question).unwrap();
        let second_ex = p.text.find(&pool[1].question).unwrap();
        let q_at = p.text.rfind("What was revenue in 2024?").unwrap();
        assert!(schema_at < first_ex && first_ex < second_ex && second_ex < q_at);
        assert!(p.text.trim_end().ends_with("SQL:"));
        assert_eq!(p.examples_used, 2);
        assert_eq!(last_question(&p.text), Some("What was revenue in 2024?"));
    }

    #[test]
    fn zero_examples_still_builds() {
        let b = PromptBuilder::new(SCHEMA_DESCRIPTION);
        let p = b.build("q?", &[]);
        assert!(!p.text.contains("Examples:"));
        assert!(p.text.contains("Question: q?"));
    }

    #[test]
    fn budget_drops_least_similar_first() -> anyhow::Result<()> {
        let pool = default_pool();
        let counter = Arc::new(TokenCounter::cl100k()?);
        let unbounded = PromptBuilder::new(SCHEMA_DESCRIPTION).build("q?", &pool[..5]);
        let three = PromptBuilder::new(SCHEMA_DESCRIPTION).build("q?", &pool[..3]);
        let budget = counter.count(&three.text);
        assert!(counter.count(&unbounded.text) > budget);

        let b = PromptBuilder::new(SCHEMA_DESCRIPTION).with_budget(counter, budget);
        let p = b.build("q?", &pool[..5]);
        assert_eq!(p.examples_used, 3);
        assert!(p.text.contains(&pool[2].question));
        assert!(!p.text.contains(&pool[3].question));
        assert!(!p.over_budget);
        Ok(())
    }

    #[test]
    fn tiny_budget_keeps_question() -> anyhow::Result<()> {
        let counter = Arc::new(TokenCounter::cl100k()?);
        let b = PromptBuilder::new(SCHEMA_DESCRIPTION).with_budget(counter, 10);
        let p = b.build("q?", &default_pool()[..4]);
        assert_eq!(p.examples_used, 0);
        assert!(p.over_budget);
        assert!(p.text.contains("Question: q?"));
        Ok(())
    }

    #[test]
    fn repair_prompt_carries_error_and_sql() {
        let b = PromptBuilder::new(SCHEMA_DESCRIPTION);
        let p = b.build_repair("Revenue 2024?", "SELECT fp.year FROM x", "no such column: fp.year");
        assert!(p.contains("no such column: fp.year"));
        assert!(p.contains("SELECT fp.year FROM x"));
        assert!(!p.contains("Examples:"));
        assert_eq!(last_question(&p), Some("Revenue 2024?"));
    }
}
