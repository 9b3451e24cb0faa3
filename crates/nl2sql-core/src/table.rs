use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    /// Numeric value of an INTEGER or REAL cell. Text is never coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Integer(i) => Some(*i as f64),
            Cell::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("NULL"),
            Cell::Integer(i) => write!(f, "{}", i),
            Cell::Real(r) => write!(f, "{}", r),
            Cell::Text(s) => f.write_str(s),
            Cell::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    pub name: String,
    pub values: Vec<Cell>,
}

/// Query result stored column by column, in the row order the store returned.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: Vec<ColumnData>,
}

impl ResultTable {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            columns: names
                .into_iter()
                .map(|name| ColumnData {
                    name,
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn from_rows(names: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let mut t = Self::new(names);
        for r in rows {
            t.push_row(r);
        }
        t
    }

    /// Appends a row; short rows are padded with NULL, extra cells are dropped.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        let mut it = row.into_iter();
        for col in &mut self.columns {
            col.values.push(it.next().unwrap_or(Cell::Null));
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.columns.get(col).and_then(|c| c.values.get(row))
    }

    pub fn row(&self, idx: usize) -> Vec<&Cell> {
        self.columns.iter().filter_map(|c| c.values.get(idx)).collect()
    }

    pub fn rows(&self) -> Vec<Vec<&Cell>> {
        (0..self.row_count()).map(|i| self.row(i)).collect()
    }

    /// Plain text rendering for the console, capped at `max_rows`.
    pub fn render(&self, max_rows: usize) -> String {
        let names = self.column_names();
        let mut widths: Vec<usize> = names.iter().map(|n| n.len()).collect();
        let shown = self.row_count().min(max_rows);
        let cells: Vec<Vec<String>> = (0..shown)
            .map(|i| self.row(i).iter().map(|c| c.to_string()).collect())
            .collect();
        for r in &cells {
            for (w, c) in widths.iter_mut().zip(r) {
                *w = (*w).max(c.len());
            }
        }

        let mut out = String::new();
        let line = |vals: Vec<&str>, widths: &[usize]| -> String {
            vals.iter()
                .zip(widths)
                .map(|(v, w)| format!("{:<width$}", v, width = *w))
                .collect::<Vec<_>>()
                .join(" | ")
        };
        out.push_str(&line(names.clone(), &widths));
        out.push('\n');
        out.push_str(
            &widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        out.push('\n');
        for r in &cells {
            out.push_str(&line(r.iter().map(|s| s.as_str()).collect(), &widths));
            out.push('\n');
        }
        if self.row_count() > shown {
            out.push_str(&format!("... {} more rows\n", self.row_count() - shown));
        }
        out
    }
}
