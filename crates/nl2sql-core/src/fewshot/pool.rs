use crate::model::{Example, PatternTag};
use anyhow::Context;
use std::path::Path;

pub const SCHEMA_DESCRIPTION: &str = r#"Database: Hindustan Unilever (HUL) annual financial statements, fiscal years 2021-2025 (SQLite).

Tables:
1. company (company_id, name, ticker, country, industry)
   - one company: HUL, company_id = 1
2. fiscal_period (period_id, company_id, fiscal_year, fiscal_quarter, period_type, start_date, end_date)
   - fiscal_year: 2021..2025, fiscal_quarter = 'FY', period_type = 'ANNUAL'
3. statement (statement_id, period_id, statement_type, currency, units)
   - statement_type: 'PROFIT_LOSS', 'BALANCE', 'CASH_FLOW', 'RATIOS'
   - currency = 'INR', units = 'CRORES'
4. line_item (line_item_id, name, normalized_code, statement_category, description)
   - statement_category: ASSET, LIABILITY, REVENUE, EXPENSE, RATIO, CF_OPERATING, CF_INVESTING, CF_FINANCING
   - normalized_code is 'HUL_' || statement_type || '_' || item, for example:
     HUL_PROFIT_LOSS_REVENUE_FROM_OPERATIONS_NET, HUL_PROFIT_LOSS_TOTAL_EXPENSES,
     HUL_PROFIT_LOSS_PROFIT_LOSS_FOR_THE_PERIOD, HUL_PROFIT_LOSS_BASIC_EPS_RS,
     HUL_BALANCE_TOTAL_ASSETS, HUL_BALANCE_TOTAL_CURRENT_ASSETS, HUL_BALANCE_TOTAL_CURRENT_LIABILITIES,
     HUL_CASH_FLOW_NET_CASH_FROM_OPERATING_ACTIVITIES, HUL_RATIOS_NET_PROFIT_MARGIN,
     HUL_RATIOS_CURRENT_RATIO, HUL_RATIOS_RETURN_ON_NET_WORTH, HUL_RATIOS_DIVIDEND_PER_SHARE
5. financial_fact (fact_id, statement_id, line_item_id, value, note, source_page)
   - one value per (statement, line item)

Join path:
financial_fact -> statement -> fiscal_period -> company
financial_fact -> line_item
"#;

const FACT_JOINS: &str = "FROM financial_fact ff
JOIN statement s ON ff.statement_id = s.statement_id
JOIN fiscal_period fp ON s.period_id = fp.period_id
JOIN line_item li ON ff.line_item_id = li.line_item_id";

fn ex(question: &str, sql: String, pattern: PatternTag) -> Example {
    Example {
        question: question.to_string(),
        sql: sql.trim().to_string(),
        pattern,
    }
}

/// The built-in demonstration pool, in a fixed order.
pub fn default_pool() -> Vec<Example> {
    let j = FACT_JOINS;
    vec![
        ex(
            "What was the net profit for fiscal year 2024?",
            format!(
                "SELECT fp.fiscal_year, ff.value AS net_profit, s.units
{j}
WHERE li.normalized_code = 'HUL_PROFIT_LOSS_PROFIT_LOSS_FOR_THE_PERIOD'
  AND fp.fiscal_year = 2024;"
            ),
            PatternTag::SimpleSelect,
        ),
        ex(
            "What is the revenue variance between 2022 and 2023?",
            format!(
                "SELECT
  MAX(CASE WHEN fp.fiscal_year = 2022 THEN ff.value END) AS revenue_2022,
  MAX(CASE WHEN fp.fiscal_year = 2023 THEN ff.value END) AS revenue_2023,
  MAX(CASE WHEN fp.fiscal_year = 2023 THEN ff.value END)
    - MAX(CASE WHEN fp.fiscal_year = 2022 THEN ff.value END) AS absolute_variance,
  ROUND((MAX(CASE WHEN fp.fiscal_year = 2023 THEN ff.value END)
    - MAX(CASE WHEN fp.fiscal_year = 2022 THEN ff.value END)) * 100.0
    / NULLIF(MAX(CASE WHEN fp.fiscal_year = 2022 THEN ff.value END), 0), 2) AS variance_pct
{j}
WHERE li.normalized_code = 'HUL_PROFIT_LOSS_REVENUE_FROM_OPERATIONS_NET'
  AND fp.fiscal_year IN (2022, 2023);"
            ),
            PatternTag::Case,
        ),
        ex(
            "Show the year-over-year trend of net cash from operating activities",
            format!(
                "SELECT
  fp.fiscal_year,
  ff.value AS operating_cash_flow,
  LAG(ff.value) OVER (ORDER BY fp.fiscal_year) AS previous_year,
  ff.value - LAG(ff.value) OVER (ORDER BY fp.fiscal_year) AS yoy_change,
  ROUND((ff.value - LAG(ff.value) OVER (ORDER BY fp.fiscal_year)) * 100.0
    / NULLIF(LAG(ff.value) OVER (ORDER BY fp.fiscal_year), 0), 2) AS yoy_change_pct
{j}
WHERE li.normalized_code = 'HUL_CASH_FLOW_NET_CASH_FROM_OPERATING_ACTIVITIES'
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::WindowFunction,
        ),
        ex(
            "Compare the current ratio across all years",
            format!(
                "SELECT
  li.name AS ratio_name,
  MAX(CASE WHEN fp.fiscal_year = 2021 THEN ff.value END) AS fy2021,
  MAX(CASE WHEN fp.fiscal_year = 2022 THEN ff.value END) AS fy2022,
  MAX(CASE WHEN fp.fiscal_year = 2023 THEN ff.value END) AS fy2023,
  MAX(CASE WHEN fp.fiscal_year = 2024 THEN ff.value END) AS fy2024,
  MAX(CASE WHEN fp.fiscal_year = 2025 THEN ff.value END) AS fy2025,
  ROUND(AVG(ff.value), 2) AS avg_ratio
{j}
WHERE li.normalized_code = 'HUL_RATIOS_CURRENT_RATIO'
GROUP BY li.name;"
            ),
            PatternTag::Case,
        ),
        ex(
            "How has the net profit margin moved relative to its average?",
            format!(
                "SELECT
  fp.fiscal_year,
  ff.value AS net_profit_margin,
  ROUND(AVG(ff.value) OVER (), 2) AS avg_margin,
  CASE
    WHEN ff.value > AVG(ff.value) OVER () THEN 'Above Average'
    WHEN ff.value < AVG(ff.value) OVER () THEN 'Below Average'
    ELSE 'At Average'
  END AS vs_average
{j}
WHERE li.normalized_code = 'HUL_RATIOS_NET_PROFIT_MARGIN'
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::WindowFunction,
        ),
        ex(
            "What is the cumulative growth of total assets since 2021?",
            format!(
                "SELECT
  fp.fiscal_year,
  ff.value AS total_assets,
  ROUND((ff.value - FIRST_VALUE(ff.value) OVER (ORDER BY fp.fiscal_year)) * 100.0
    / NULLIF(FIRST_VALUE(ff.value) OVER (ORDER BY fp.fiscal_year), 0), 2) AS cumulative_growth_pct
{j}
WHERE li.normalized_code = 'HUL_BALANCE_TOTAL_ASSETS'
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::WindowFunction,
        ),
        ex(
            "Compare return on net worth with net profit margin for each year",
            format!(
                "WITH ratios AS (
  SELECT fp.fiscal_year, li.normalized_code, ff.value
  {j}
  WHERE li.normalized_code IN ('HUL_RATIOS_RETURN_ON_NET_WORTH', 'HUL_RATIOS_NET_PROFIT_MARGIN')
)
SELECT
  fiscal_year,
  MAX(CASE WHEN normalized_code = 'HUL_RATIOS_RETURN_ON_NET_WORTH' THEN value END) AS return_on_net_worth,
  MAX(CASE WHEN normalized_code = 'HUL_RATIOS_NET_PROFIT_MARGIN' THEN value END) AS net_profit_margin
FROM ratios
GROUP BY fiscal_year
ORDER BY fiscal_year;"
            ),
            PatternTag::Cte,
        ),
        ex(
            "Calculate working capital for every year",
            format!(
                "WITH balance AS (
  SELECT
    fp.fiscal_year,
    MAX(CASE WHEN li.normalized_code = 'HUL_BALANCE_TOTAL_CURRENT_ASSETS' THEN ff.value END) AS current_assets,
    MAX(CASE WHEN li.normalized_code = 'HUL_BALANCE_TOTAL_CURRENT_LIABILITIES' THEN ff.value END) AS current_liabilities
  {j}
  WHERE s.statement_type = 'BALANCE'
  GROUP BY fp.fiscal_year
)
SELECT fiscal_year, current_assets, current_liabilities,
       current_assets - current_liabilities AS working_capital
FROM balance
ORDER BY fiscal_year;"
            ),
            PatternTag::Cte,
        ),
        ex(
            "List every profit and loss line item with its 2025 value",
            format!(
                "SELECT li.name, li.normalized_code, ff.value, s.units
{j}
JOIN company c ON fp.company_id = c.company_id
WHERE s.statement_type = 'PROFIT_LOSS'
  AND fp.fiscal_year = 2025
  AND c.ticker = 'HUL'
ORDER BY ff.value DESC;"
            ),
            PatternTag::Join,
        ),
        ex(
            "What share of total expenses did each expense line take in 2024?",
            format!(
                "SELECT
  li.name AS expense,
  ff.value,
  ROUND(ff.value * 100.0 / NULLIF((
    SELECT ff2.value
    FROM financial_fact ff2
    JOIN statement s2 ON ff2.statement_id = s2.statement_id
    JOIN fiscal_period fp2 ON s2.period_id = fp2.period_id
    JOIN line_item li2 ON ff2.line_item_id = li2.line_item_id
    WHERE li2.normalized_code = 'HUL_PROFIT_LOSS_TOTAL_EXPENSES' AND fp2.fiscal_year = 2024
  ), 0), 2) AS pct_of_total
{j}
WHERE li.statement_category = 'EXPENSE'
  AND li.normalized_code <> 'HUL_PROFIT_LOSS_TOTAL_EXPENSES'
  AND fp.fiscal_year = 2024
ORDER BY ff.value DESC;"
            ),
            PatternTag::Subquery,
        ),
        ex(
            "Summarize operating, investing and financing cash flows per year",
            format!(
                "SELECT
  fp.fiscal_year,
  SUM(CASE WHEN li.statement_category = 'CF_OPERATING' THEN ff.value ELSE 0 END) AS operating,
  SUM(CASE WHEN li.statement_category = 'CF_INVESTING' THEN ff.value ELSE 0 END) AS investing,
  SUM(CASE WHEN li.statement_category = 'CF_FINANCING' THEN ff.value ELSE 0 END) AS financing,
  SUM(ff.value) AS net_cash_flow
{j}
WHERE s.statement_type = 'CASH_FLOW'
GROUP BY fp.fiscal_year
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::Aggregation,
        ),
        ex(
            "Is the liquidity position healthy each year?",
            format!(
                "SELECT
  fp.fiscal_year,
  MAX(CASE WHEN li.normalized_code = 'HUL_RATIOS_CURRENT_RATIO' THEN ff.value END) AS current_ratio,
  MAX(CASE WHEN li.normalized_code = 'HUL_RATIOS_QUICK_RATIO' THEN ff.value END) AS quick_ratio,
  CASE
    WHEN MAX(CASE WHEN li.normalized_code = 'HUL_RATIOS_CURRENT_RATIO' THEN ff.value END) >= 1.2 THEN 'Healthy'
    WHEN MAX(CASE WHEN li.normalized_code = 'HUL_RATIOS_CURRENT_RATIO' THEN ff.value END) >= 1.0 THEN 'Adequate'
    ELSE 'Tight'
  END AS liquidity_status
{j}
WHERE s.statement_type = 'RATIOS'
GROUP BY fp.fiscal_year
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::Case,
        ),
        ex(
            "What are the average, minimum and maximum operating profit margins?",
            format!(
                "SELECT
  li.name AS metric,
  ROUND(AVG(ff.value), 2) AS avg_value,
  MIN(ff.value) AS min_value,
  MAX(ff.value) AS max_value,
  COUNT(*) AS years
{j}
WHERE li.normalized_code = 'HUL_RATIOS_OPERATING_PROFIT_MARGIN'
GROUP BY li.name;"
            ),
            PatternTag::Aggregation,
        ),
        ex(
            "How are total assets split between current and non-current assets?",
            format!(
                "WITH assets AS (
  SELECT
    fp.fiscal_year,
    MAX(CASE WHEN li.normalized_code = 'HUL_BALANCE_TOTAL_ASSETS' THEN ff.value END) AS total,
    MAX(CASE WHEN li.normalized_code = 'HUL_BALANCE_TOTAL_CURRENT_ASSETS' THEN ff.value END) AS current_assets,
    MAX(CASE WHEN li.normalized_code = 'HUL_BALANCE_TOTAL_NON_CURRENT_ASSETS' THEN ff.value END) AS non_current_assets
  {j}
  WHERE s.statement_type = 'BALANCE'
  GROUP BY fp.fiscal_year
)
SELECT fiscal_year,
       ROUND(current_assets * 100.0 / NULLIF(total, 0), 2) AS current_pct,
       ROUND(non_current_assets * 100.0 / NULLIF(total, 0), 2) AS non_current_pct
FROM assets
ORDER BY fiscal_year;"
            ),
            PatternTag::Cte,
        ),
        ex(
            "In which years was revenue above the five-year average?",
            format!(
                "SELECT fp.fiscal_year, ff.value AS revenue
{j}
WHERE li.normalized_code = 'HUL_PROFIT_LOSS_REVENUE_FROM_OPERATIONS_NET'
  AND ff.value > (
    SELECT AVG(ff2.value)
    FROM financial_fact ff2
    JOIN line_item li2 ON ff2.line_item_id = li2.line_item_id
    WHERE li2.normalized_code = 'HUL_PROFIT_LOSS_REVENUE_FROM_OPERATIONS_NET'
  )
ORDER BY fp.fiscal_year;"
            ),
            PatternTag::Subquery,
        ),
    ]
}

/// Loads a pool from a JSON array of `{question, sql, pattern}` objects.
pub fn load_pool(path: &Path) -> anyhow::Result<Vec<Example>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read example pool {}", path.display()))?;
    let pool: Vec<Example> = serde_json::from_str(&raw)
        .with_context(|| format!("config error: invalid example pool {}", path.display()))?;
    Ok(pool)
}
