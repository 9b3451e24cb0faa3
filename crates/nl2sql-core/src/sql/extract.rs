use super::lexer::{first_terminator, tokenize, Spanned, Token};
use regex::Regex;
use std::sync::OnceLock;

const TRAILER_MARKERS: &[&str] = &["SQLResult:", "Answer:", "Explanation:", "Result:"];

const OBJECT_KINDS: &[&str] = &[
    "TABLE", "INDEX", "VIEW", "TRIGGER", "DATABASE", "SCHEMA", "TEMP", "TEMPORARY", "UNIQUE",
    "VIRTUAL", "IF",
];

const GRANTABLE: &[&str] = &["ALL", "SELECT", "INSERT", "UPDATE", "DELETE", "USAGE", "EXECUTE"];

fn line_start_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^[ \t]*(SELECT|WITH)\b").expect("static regex"))
}

fn upper_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(SELECT|WITH)\b").expect("static regex"))
}

fn any_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bselect\b").expect("static regex"))
}

fn prose_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Z][a-z]+[,:]?\s+[a-z]|\*\*|#|Note|This |The |Here )").expect("static regex")
    })
}

/// Pulls a single SQL statement out of a model completion.
///
/// Markdown fences win over everything else. Leading commentary is skipped
/// up to the first statement keyword, and the statement ends at the first
/// unquoted `;` or at the first paragraph of trailing prose. A completion
/// that opens with a state-changing statement (in any case, after comments)
/// yields that statement so the read-only guard can reject it; a verb such as
/// "Delete" in plain prose does not count. Returns `None` when no statement
/// keyword is present.
pub fn extract_sql(completion: &str) -> Option<String> {
    let body = fenced_block(completion).unwrap_or(completion);

    let toks = code_tokens(body);
    let leading = if opens_mutation(&toks, 0) {
        toks.first().map(|(pos, _)| *pos)
    } else {
        None
    };

    let start = leading
        .or_else(|| {
            line_start_keyword()
                .find(body)
                .map(|m| m.start() + (m.as_str().len() - m.as_str().trim_start().len()))
        })
        .or_else(|| upper_keyword().find(body).map(|m| m.start()))
        .or_else(|| any_keyword().find(body).map(|m| m.start()))
        .or_else(|| mutation_at_line_start(body))
        .or_else(|| {
            (0..toks.len())
                .find(|&i| opens_mutation(&toks, i))
                .map(|i| toks[i].0)
        })?;

    let mut stmt = &body[start..];
    for marker in TRAILER_MARKERS {
        if let Some(pos) = stmt.find(marker) {
            stmt = &stmt[..pos];
        }
    }
    if let Some(pos) = first_terminator(stmt) {
        stmt = &stmt[..pos];
    }
    let stmt = cut_trailing_prose(stmt);

    let sql = stmt.trim();
    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

/// Content of the first ``` block, without the language tag. An unclosed
/// fence runs to the end of the text.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let tag = after[..body_start].trim();
    // "```SELECT 1```" style: no newline, tag is the SQL itself.
    let (body, tagged) = if tag.is_empty() || tag.chars().all(|c| c.is_ascii_alphanumeric()) {
        (&after[body_start..], true)
    } else {
        (after, false)
    };
    let end = body.find("```").unwrap_or(body.len());
    let block = &body[..end];
    if block.trim().is_empty() && tagged {
        return None;
    }
    Some(block)
}

fn code_tokens(text: &str) -> Vec<Spanned<'_>> {
    tokenize(text)
        .into_iter()
        .filter(|(_, t)| !matches!(t, Token::Comment(_)))
        .collect()
}

/// True when the tokens at `i` open a state-changing statement rather than
/// a sentence that starts with the same verb.
fn opens_mutation(toks: &[Spanned<'_>], i: usize) -> bool {
    let at = |k: usize| toks.get(i + k).map(|(_, t)| t);
    let at_keyword =
        |k: usize, kws: &[&str]| at(k).is_some_and(|t| kws.iter().any(|kw| t.is_keyword(kw)));
    let Some(Token::Word(verb)) = at(0) else {
        return false;
    };
    match verb.to_ascii_uppercase().as_str() {
        "DELETE" => at_keyword(1, &["FROM"]),
        "INSERT" | "REPLACE" => at_keyword(1, &["INTO", "OR"]),
        "UPDATE" => {
            at_keyword(1, &["OR"])
                || (matches!(at(1), Some(Token::Word(_) | Token::QuotedIdent(_)))
                    && at_keyword(2, &["SET"]))
        }
        "DROP" | "ALTER" | "CREATE" | "TRUNCATE" => at_keyword(1, OBJECT_KINDS),
        "ATTACH" | "DETACH" => {
            at_keyword(1, &["DATABASE"]) || matches!(at(1), Some(Token::Literal(_)))
        }
        "PRAGMA" => matches!(at(1), Some(Token::Word(_))),
        "GRANT" | "REVOKE" => at_keyword(1, GRANTABLE),
        "VACUUM" | "REINDEX" => matches!(at(1), None | Some(Token::Punct(';'))),
        _ => false,
    }
}

/// Byte offset of the first line that opens with a state-changing statement.
/// Lines are lexed one at a time so an apostrophe in earlier prose cannot
/// swallow the rest of the text as a literal.
fn mutation_at_line_start(body: &str) -> Option<usize> {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        let toks = code_tokens(line);
        if opens_mutation(&toks, 0) {
            return toks.first().map(|(pos, _)| offset + pos);
        }
        offset += line.len();
    }
    None
}

fn cut_trailing_prose(stmt: &str) -> &str {
    let mut offset = 0;
    let mut prev_blank = false;
    for line in stmt.split_inclusive('\n') {
        let trimmed = line.trim();
        if prev_blank && !trimmed.is_empty() && prose_line().is_match(trimmed) {
            return &stmt[..offset];
        }
        prev_blank = trimmed.is_empty();
        offset += line.len();
    }
    stmt
}
