use nl2sql_core::sql::lexer::{tokenize, Token};

/// Comparison tokens: comments and terminators dropped, keywords and
/// identifiers lowercased, string literals kept verbatim.
pub fn sql_tokens(sql: &str) -> Vec<String> {
    tokenize(sql)
        .into_iter()
        .filter_map(|(_, t)| match t {
            Token::Comment(_) | Token::Punct(';') => None,
            Token::Word(w) => Some(w.to_ascii_lowercase()),
            Token::QuotedIdent(w) => Some(w.trim_matches(|c| matches!(c, '"' | '`' | '[' | ']')).to_ascii_lowercase()),
            Token::Literal(l) => Some(l.to_string()),
            Token::Punct(c) => Some(c.to_string()),
        })
        .collect()
}

/// Canonical single-line form used by exact match and edit similarity.
pub fn normalize_sql(sql: &str) -> String {
    sql_tokens(sql).join(" ")
}
