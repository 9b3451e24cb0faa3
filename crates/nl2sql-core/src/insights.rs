use crate::providers::llm::LlmClient;
use crate::table::ResultTable;
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Rows of the result table shown to the model.
pub const INSIGHT_ROWS: usize = 50;

const SUMMARY_HEADER: &str = "## Executive Summary";
const SUMMARY_FALLBACK: &str = "Analysis completed. See full insights for details.";
const NO_ROWS: &str = "The query returned no rows, so there is nothing to analyze.";

/// Which analysis the model is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    /// Executive summary, key findings, analysis and implications.
    #[default]
    General,
    /// Main finding and key differences between the compared values.
    Comparison,
    /// Direction, magnitude and inflection points of a time series.
    Trend,
}

impl InsightKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Some(Self::General),
            "comparison" => Some(Self::Comparison),
            "trend" => Some(Self::Trend),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insights {
    pub kind: InsightKind,
    /// One or two sentences answering the question.
    pub summary: String,
    /// The full markdown text returned by the model.
    pub full_text: String,
}

/// Turns an executed query and its rows into narrative findings.
pub struct InsightGenerator {
    client: Arc<dyn LlmClient>,
}

impl InsightGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// An empty result is answered locally; the model is only asked when
    /// there are rows to talk about.
    pub async fn generate(
        &self,
        kind: InsightKind,
        question: &str,
        sql: &str,
        table: &ResultTable,
    ) -> anyhow::Result<Insights> {
        if table.row_count() == 0 {
            return Ok(Insights {
                kind,
                summary: NO_ROWS.to_string(),
                full_text: NO_ROWS.to_string(),
            });
        }

        let prompt = build_insight_prompt(kind, question, sql, table);
        let resp = self
            .client
            .complete(&prompt)
            .await
            .context("insights generation failed")?;
        let full_text = resp.text.trim().to_string();

        tracing::debug!(
            event = "nl2sql.insights.generated",
            kind = ?kind,
            provider = %resp.provider,
            cached = resp.cached,
            chars = full_text.len()
        );

        Ok(Insights {
            kind,
            summary: split_summary(kind, &full_text),
            full_text,
        })
    }
}

pub fn build_insight_prompt(
    kind: InsightKind,
    question: &str,
    sql: &str,
    table: &ResultTable,
) -> String {
    let rows = table.render(INSIGHT_ROWS);
    match kind {
        InsightKind::General => format!(
            "You are a financial analyst generating insights from HUL's financial data.

USER QUESTION:
{question}

SQL QUERY EXECUTED:
{sql}

QUERY RESULTS:
{rows}

CONTEXT:
- Company: Hindustan Unilever Limited (HUL)
- Industry: FMCG
- Currency: INR Crores
- Time Period: 2021-2025 (Annual Data)

Generate structured business insights following this format:

{SUMMARY_HEADER}
[1-2 sentence high-level takeaway answering the user's question directly]

## Key Findings
[3-5 bullet points with the most important insights, each with specific numbers]

## Analysis
[2-3 short paragraphs on trends and context]

## Implications
[2-3 bullet points on what this means for business strategy or performance]

GUIDELINES:
1. Be concise and business-focused
2. Always include specific numbers and percentages from the data
3. Highlight trends (improving/declining) and magnitude of changes
4. Compare periods when relevant (YoY, vs average)
5. If data shows concerning trends, mention them objectively
6. Keep total length under 400 words
7. Format with markdown headers and bullet points

Generate the insights:"
        ),
        InsightKind::Comparison => format!(
            "Generate concise comparison insights for HUL financial data.

USER QUESTION:
{question}

SQL QUERY EXECUTED:
{sql}

DATA:
{rows}

Provide:
1. Main finding (1 sentence)
2. Key differences (2-3 bullets with numbers)
3. Trend assessment (improving/declining/stable)
4. One actionable implication

Keep under 150 words total. Be specific and data-driven."
        ),
        InsightKind::Trend => format!(
            "Analyze the trend in HUL's financial data.

USER QUESTION:
{question}

SQL QUERY EXECUTED:
{sql}

TIME-SERIES DATA:
{rows}

Provide:
1. Overall trend direction (1 sentence)
2. Growth rate or change magnitude
3. Notable inflection points or anomalies (if any)
4. 3-year outlook based on trend
5. Risk or opportunity identified

Keep under 200 words. Focus on actionable insights."
        ),
    }
}

/// The executive summary section for general insights, otherwise the first
/// non-empty line.
pub fn split_summary(kind: InsightKind, text: &str) -> String {
    let summary = match kind {
        InsightKind::General => executive_summary(text),
        InsightKind::Comparison | InsightKind::Trend => {
            text.lines().map(str::trim).find(|l| !l.is_empty())
        }
    };
    summary
        .map(|s| s.trim_start_matches('#').trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SUMMARY_FALLBACK.to_string())
}

/// Paragraph after the summary header, or the first paragraph when the model
/// skipped the header.
fn executive_summary(text: &str) -> Option<&str> {
    let body = match text.find(SUMMARY_HEADER) {
        Some(pos) => &text[pos + SUMMARY_HEADER.len()..],
        None => text,
    };
    let body = body.trim_start();
    let end = body
        .find("\n\n")
        .or_else(|| body.find("\n#"))
        .unwrap_or(body.len());
    Some(body[..end].trim()).filter(|s| !s.is_empty())
}
