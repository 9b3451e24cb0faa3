//! Financial warehouse layout: facts keyed by statement and line item,
//! statements keyed by fiscal period, periods keyed by company.

use anyhow::Context;
use rusqlite::{params, Connection};
use std::path::Path;

pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS company (
  company_id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  ticker TEXT NOT NULL UNIQUE,
  country TEXT,
  industry TEXT
);

CREATE TABLE IF NOT EXISTS fiscal_period (
  period_id INTEGER PRIMARY KEY,
  company_id INTEGER NOT NULL REFERENCES company(company_id),
  fiscal_year INTEGER NOT NULL,
  fiscal_quarter TEXT NOT NULL DEFAULT 'FY',
  period_type TEXT NOT NULL DEFAULT 'ANNUAL',
  start_date TEXT,
  end_date TEXT,
  UNIQUE (company_id, fiscal_year, fiscal_quarter)
);

CREATE TABLE IF NOT EXISTS statement (
  statement_id INTEGER PRIMARY KEY,
  period_id INTEGER NOT NULL REFERENCES fiscal_period(period_id),
  statement_type TEXT NOT NULL,
  currency TEXT NOT NULL DEFAULT 'INR',
  units TEXT NOT NULL DEFAULT 'CRORES',
  UNIQUE (period_id, statement_type)
);

CREATE TABLE IF NOT EXISTS line_item (
  line_item_id INTEGER PRIMARY KEY,
  name TEXT NOT NULL,
  normalized_code TEXT NOT NULL UNIQUE,
  statement_category TEXT,
  description TEXT
);

CREATE TABLE IF NOT EXISTS financial_fact (
  fact_id INTEGER PRIMARY KEY,
  statement_id INTEGER NOT NULL REFERENCES statement(statement_id),
  line_item_id INTEGER NOT NULL REFERENCES line_item(line_item_id),
  value REAL,
  note TEXT,
  source_page INTEGER,
  UNIQUE (statement_id, line_item_id)
);

CREATE INDEX IF NOT EXISTS idx_fact_line_item ON financial_fact(line_item_id);
CREATE INDEX IF NOT EXISTS idx_statement_type ON statement(statement_type);
"#;

pub const STATEMENT_TYPES: &[&str] = &["PROFIT_LOSS", "BALANCE", "CASH_FLOW", "RATIOS"];

pub const DEMO_YEARS: std::ops::RangeInclusive<i64> = 2021..=2025;

struct SeedItem {
    statement: &'static str,
    code: &'static str,
    name: &'static str,
    category: &'static str,
    base: f64,
    growth: f64,
}

const fn item(
    statement: &'static str,
    code: &'static str,
    name: &'static str,
    category: &'static str,
    base: f64,
    growth: f64,
) -> SeedItem {
    SeedItem {
        statement,
        code,
        name,
        category,
        base,
        growth,
    }
}

#[rustfmt::skip]
const SEED_ITEMS: &[SeedItem] = &[
    item("PROFIT_LOSS", "REVENUE_FROM_OPERATIONS_NET", "Revenue From Operations [Net]", "REVENUE", 45996.0, 1.07),
    item("PROFIT_LOSS", "TOTAL_REVENUE", "Total Revenue", "REVENUE", 46482.0, 1.07),
    item("PROFIT_LOSS", "TOTAL_EXPENSES", "Total Expenses", "EXPENSE", 36328.0, 1.065),
    item("PROFIT_LOSS", "COST_OF_MATERIALS_CONSUMED", "Cost Of Materials Consumed", "EXPENSE", 14226.0, 1.06),
    item("PROFIT_LOSS", "EMPLOYEE_BENEFIT_EXPENSES", "Employee Benefit Expenses", "EXPENSE", 2228.0, 1.05),
    item("PROFIT_LOSS", "DEPRECIATION_AND_AMORTISATION_EXPENSES", "Depreciation And Amortisation Expenses", "EXPENSE", 1074.0, 1.04),
    item("PROFIT_LOSS", "PROFIT_LOSS_BEFORE_TAX", "Profit/Loss Before Tax", "REVENUE", 10348.0, 1.08),
    item("PROFIT_LOSS", "PROFIT_LOSS_FOR_THE_PERIOD", "Profit/Loss For The Period", "REVENUE", 7999.0, 1.08),
    item("PROFIT_LOSS", "BASIC_EPS_RS", "Basic EPS (Rs.)", "RATIO", 34.03, 1.08),
    item("BALANCE", "TOTAL_ASSETS", "Total Assets", "ASSET", 69213.0, 1.03),
    item("BALANCE", "TOTAL_CURRENT_ASSETS", "Total Current Assets", "ASSET", 15378.0, 1.06),
    item("BALANCE", "TOTAL_NON_CURRENT_ASSETS", "Total Non-Current Assets", "ASSET", 53835.0, 1.02),
    item("BALANCE", "INVENTORIES", "Inventories", "ASSET", 3579.0, 1.05),
    item("BALANCE", "TRADE_RECEIVABLES", "Trade Receivables", "ASSET", 1758.0, 1.12),
    item("BALANCE", "CASH_AND_CASH_EQUIVALENTS", "Cash And Cash Equivalents", "ASSET", 845.0, 1.10),
    item("BALANCE", "TOTAL_SHAREHOLDERS_FUNDS", "Total Shareholders Funds", "LIABILITY", 47439.0, 1.03),
    item("BALANCE", "TOTAL_CURRENT_LIABILITIES", "Total Current Liabilities", "LIABILITY", 12340.0, 1.05),
    item("CASH_FLOW", "NET_CASH_FROM_OPERATING_ACTIVITIES", "Net Cash From Operating Activities", "CF_OPERATING", 9163.0, 1.06),
    item("CASH_FLOW", "INVESTING_ACTIVITIES", "Net Cash Used In Investing Activities", "CF_INVESTING", -1150.0, 1.10),
    item("CASH_FLOW", "NET_CASH_USED_IN_FROM_FINANCING_ACTIVITIES", "Net Cash Used In Financing Activities", "CF_FINANCING", -7930.0, 1.05),
    item("RATIOS", "NET_PROFIT_MARGIN", "Net Profit Margin (%)", "RATIO", 17.39, 1.01),
    item("RATIOS", "OPERATING_PROFIT_MARGIN", "Operating Profit Margin (%)", "RATIO", 24.92, 1.01),
    item("RATIOS", "CURRENT_RATIO", "Current Ratio (X)", "RATIO", 1.25, 0.98),
    item("RATIOS", "QUICK_RATIO", "Quick Ratio (X)", "RATIO", 0.96, 1.0),
    item("RATIOS", "RETURN_ON_NET_WORTH", "Return On Net Worth (%)", "RATIO", 16.86, 1.04),
    item("RATIOS", "DIVIDEND_PER_SHARE", "Dividend Per Share (Rs.)", "RATIO", 34.0, 1.05),
];

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(DDL).context("failed to create warehouse schema")?;
    Ok(())
}

/// Loads one company with five annual periods of deterministic figures.
pub fn seed_demo(conn: &Connection) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR IGNORE INTO company (company_id, name, ticker, country, industry)
         VALUES (1, 'Hindustan Unilever', 'HUL', 'India', 'FMCG')",
        [],
    )?;

    for (idx, year) in DEMO_YEARS.enumerate() {
        let period_id = idx as i64 + 1;
        tx.execute(
            "INSERT OR IGNORE INTO fiscal_period
               (period_id, company_id, fiscal_year, fiscal_quarter, period_type, start_date, end_date)
             VALUES (?1, 1, ?2, 'FY', 'ANNUAL', ?3, ?4)",
            params![
                period_id,
                year,
                format!("{}-04-01", year - 1),
                format!("{}-03-31", year)
            ],
        )?;
        for (s_idx, st) in STATEMENT_TYPES.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO statement (statement_id, period_id, statement_type, currency, units)
                 VALUES (?1, ?2, ?3, 'INR', 'CRORES')",
                params![statement_id(period_id, s_idx), period_id, st],
            )?;
        }
    }

    for (li_idx, it) in SEED_ITEMS.iter().enumerate() {
        let line_item_id = li_idx as i64 + 1;
        let code = format!("HUL_{}_{}", it.statement, it.code);
        tx.execute(
            "INSERT OR IGNORE INTO line_item (line_item_id, name, normalized_code, statement_category)
             VALUES (?1, ?2, ?3, ?4)",
            params![line_item_id, it.name, code, it.category],
        )?;

        let s_idx = STATEMENT_TYPES
            .iter()
            .position(|s| *s == it.statement)
            .context("seed item references unknown statement type")?;
        for (idx, _) in DEMO_YEARS.enumerate() {
            let period_id = idx as i64 + 1;
            let value = round2(it.base * it.growth.powi(idx as i32));
            tx.execute(
                "INSERT OR IGNORE INTO financial_fact (statement_id, line_item_id, value)
                 VALUES (?1, ?2, ?3)",
                params![statement_id(period_id, s_idx), line_item_id, value],
            )?;
        }
    }
    tx.commit()?;
    Ok(())
}

fn statement_id(period_id: i64, s_idx: usize) -> i64 {
    (period_id - 1) * STATEMENT_TYPES.len() as i64 + s_idx as i64 + 1
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Creates (or extends) a warehouse file on disk.
pub fn create_database(path: &Path, demo: bool) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    if demo {
        seed_demo(&conn)?;
    }
    Ok(())
}
