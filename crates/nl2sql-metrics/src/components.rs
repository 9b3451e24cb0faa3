use nl2sql_core::sql::lexer::{tokenize, Token};
use std::collections::BTreeSet;

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "TOTAL", "GROUP_CONCAT"];

/// Structural features of a statement, compared between generated and
/// reference SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Component {
    Cte,
    Window,
    Case,
    Join,
    Aggregation,
    GroupBy,
    OrderBy,
    Subquery,
    Limit,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Cte => "CTE",
            Component::Window => "WINDOW",
            Component::Case => "CASE",
            Component::Join => "JOIN",
            Component::Aggregation => "AGGREGATION",
            Component::GroupBy => "GROUP_BY",
            Component::OrderBy => "ORDER_BY",
            Component::Subquery => "SUBQUERY",
            Component::Limit => "LIMIT",
        }
    }
}

pub fn components(sql: &str) -> BTreeSet<Component> {
    let toks: Vec<Token<'_>> = tokenize(sql)
        .into_iter()
        .map(|(_, t)| t)
        .filter(|t| !matches!(t, Token::Comment(_)))
        .collect();
    let mut out = BTreeSet::new();

    if toks.first().is_some_and(|t| t.is_keyword("WITH")) {
        out.insert(Component::Cte);
    }
    for (i, t) in toks.iter().enumerate() {
        let next = toks.get(i + 1);
        let prev = i.checked_sub(1).and_then(|p| toks.get(p));
        if t.is_keyword("OVER") {
            out.insert(Component::Window);
        } else if t.is_keyword("CASE") {
            out.insert(Component::Case);
        } else if t.is_keyword("JOIN") {
            out.insert(Component::Join);
        } else if t.is_keyword("LIMIT") {
            out.insert(Component::Limit);
        } else if t.is_keyword("GROUP") && next.is_some_and(|n| n.is_keyword("BY")) {
            out.insert(Component::GroupBy);
        } else if t.is_keyword("ORDER") && next.is_some_and(|n| n.is_keyword("BY")) {
            out.insert(Component::OrderBy);
        } else if AGGREGATES.iter().any(|a| t.is_keyword(a))
            && next == Some(&Token::Punct('('))
        {
            out.insert(Component::Aggregation);
        } else if *t == Token::Punct('(')
            && next.is_some_and(|n| n.is_keyword("SELECT"))
            // `name AS (SELECT ...)` is a CTE body.
            && !prev.is_some_and(|p| p.is_keyword("AS"))
        {
            out.insert(Component::Subquery);
        }
    }
    out
}

/// Components of the reference missing from the generated SQL, and the
/// generated SQL's components the reference does not have.
pub fn component_diff(generated: &str, ground_truth: &str) -> (Vec<String>, Vec<String>) {
    let got = components(generated);
    let want = components(ground_truth);
    let missing = want.difference(&got).map(|c| c.as_str().to_string()).collect();
    let extra = got.difference(&want).map(|c| c.as_str().to_string()).collect();
    (missing, extra)
}
