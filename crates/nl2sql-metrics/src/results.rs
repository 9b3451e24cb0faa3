use nl2sql_core::sql::lexer::{tokenize, Token};
use nl2sql_core::table::{Cell, ResultTable};
use serde::Serialize;

/// Relative tolerance for numeric cells.
pub const NUMERIC_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultComparison {
    pub results_match: bool,
    pub row_count_match: bool,
    pub column_count_match: bool,
    pub data_similarity: f64,
}

/// Text and blobs compare exactly. Only INTEGER and REAL cells get the
/// numeric tolerance; a number stored as text never equals a number.
pub fn cells_equal(a: &Cell, b: &Cell) -> bool {
    match (a, b) {
        (Cell::Null, Cell::Null) => true,
        (Cell::Text(x), Cell::Text(y)) => x == y,
        (Cell::Blob(x), Cell::Blob(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => {
                (x - y).abs() <= NUMERIC_EPSILON * x.abs().max(y.abs()).max(1.0)
            }
            _ => false,
        },
    }
}

fn rows_equal(a: &[&Cell], b: &[&Cell]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| cells_equal(x, y))
}

/// True when the statement has an ORDER BY outside any parentheses.
pub fn has_top_level_order_by(sql: &str) -> bool {
    let mut depth = 0i32;
    let mut prev_order = false;
    for (_, t) in tokenize(sql) {
        match t {
            Token::Punct('(') => depth += 1,
            Token::Punct(')') => depth -= 1,
            Token::Comment(_) => continue,
            _ => {}
        }
        if depth == 0 && prev_order && t.is_keyword("BY") {
            return true;
        }
        prev_order = depth == 0 && t.is_keyword("ORDER");
    }
    false
}

/// Compares two result tables. Column names are ignored since aliases vary;
/// columns are matched by position.
pub fn compare_results(
    generated: Option<&ResultTable>,
    expected: Option<&ResultTable>,
    ordered: bool,
) -> ResultComparison {
    let (Some(got), Some(want)) = (generated, expected) else {
        return ResultComparison::default();
    };
    let row_count_match = got.row_count() == want.row_count();
    let column_count_match = got.column_count() == want.column_count();

    let got_rows = got.rows();
    let want_rows = want.rows();
    let results_match = row_count_match
        && column_count_match
        && if ordered {
            got_rows.iter().zip(&want_rows).all(|(a, b)| rows_equal(a, b))
        } else {
            multiset_equal(&got_rows, &want_rows)
        };

    let data_similarity = if results_match {
        1.0
    } else {
        positional_similarity(got, want)
    };

    ResultComparison {
        results_match,
        row_count_match,
        column_count_match,
        data_similarity,
    }
}

fn multiset_equal(got: &[Vec<&Cell>], want: &[Vec<&Cell>]) -> bool {
    let mut used = vec![false; want.len()];
    'rows: for g in got {
        for (i, w) in want.iter().enumerate() {
            if !used[i] && rows_equal(g, w) {
                used[i] = true;
                continue 'rows;
            }
        }
        return false;
    }
    true
}

/// Share of equal cells at the same position, over the larger of the two shapes.
fn positional_similarity(got: &ResultTable, want: &ResultTable) -> f64 {
    let rows = got.row_count().max(want.row_count());
    let cols = got.column_count().max(want.column_count());
    let total = rows * cols;
    if total == 0 {
        return if got.column_count() == want.column_count() { 1.0 } else { 0.0 };
    }
    let mut equal = 0usize;
    for r in 0..got.row_count().min(want.row_count()) {
        for c in 0..got.column_count().min(want.column_count()) {
            if let (Some(a), Some(b)) = (got.cell(r, c), want.cell(r, c)) {
                if cells_equal(a, b) {
                    equal += 1;
                }
            }
        }
    }
    equal as f64 / total as f64
}
