use super::lexer::{tokenize, Token};
use crate::errors::PolicyViolation;

/// Statement keywords that can change state. Rejected anywhere outside
/// literals, so `WITH x AS (...) DELETE ...` does not slip through.
pub const DENY_STATEMENTS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "ATTACH", "DETACH", "PRAGMA", "VACUUM", "REINDEX", "MERGE", "UPSERT",
];

/// Read-only gate. Fails closed: anything it cannot positively identify as a
/// single SELECT/WITH statement is a violation.
pub fn check_read_only(sql: &str) -> Result<(), PolicyViolation> {
    let toks: Vec<Token<'_>> = tokenize(sql)
        .into_iter()
        .map(|(_, t)| t)
        .filter(|t| !matches!(t, Token::Comment(_)))
        .collect();

    let first = toks.iter().find_map(|t| match t {
        Token::Word(w) => Some(*w),
        Token::Punct('(') => None,
        _ => Some(""),
    });
    match first {
        None => return Err(violation("empty statement")),
        Some(w) if w.eq_ignore_ascii_case("SELECT") || w.eq_ignore_ascii_case("WITH") => {}
        Some("") => return Err(violation("statement does not start with a keyword")),
        Some(w) => {
            return Err(violation(&format!(
                "only SELECT/WITH statements are allowed, got {}",
                w.to_ascii_uppercase()
            )))
        }
    }

    for (i, t) in toks.iter().enumerate() {
        if let Token::Word(w) = t {
            if let Some(kw) = DENY_STATEMENTS.iter().find(|k| w.eq_ignore_ascii_case(k)) {
                return Err(violation(&format!("forbidden keyword {}", kw)));
            }
            // REPLACE(...) is a string function; REPLACE INTO is a write.
            if w.eq_ignore_ascii_case("REPLACE") && toks.get(i + 1) != Some(&Token::Punct('(')) {
                return Err(violation("forbidden keyword REPLACE"));
            }
        }
        if *t == Token::Punct(';') && toks[i + 1..].iter().any(|t| *t != Token::Punct(';')) {
            return Err(violation("multiple statements are not allowed"));
        }
    }
    Ok(())
}

fn violation(reason: &str) -> PolicyViolation {
    PolicyViolation {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_select_and_cte() {
        assert!(check_read_only("SELECT * FROM company").is_ok());
        assert!(check_read_only("  -- lead\n/* c */ with x as (select 1) select * from x;").is_ok());
        assert!(check_read_only("(SELECT 1) UNION (SELECT 2)").is_ok());
        assert!(check_read_only("SELECT REPLACE(name, 'a', 'b') FROM company").is_ok());
    }

    #[test]
    fn rejects_mutations() {
        for sql in [
            "DELETE FROM financial_fact",
            "drop table company",
            "UPDATE company SET name = 'x'",
            "INSERT INTO company VALUES (1)",
            "WITH x AS (SELECT 1) DELETE FROM company",
            "PRAGMA writable_schema = 1",
            "REPLACE INTO company VALUES (1)",
        ] {
            assert!(check_read_only(sql).is_err(), "{sql}");
        }
    }

    #[test]
    fn rejects_stacked_statements() {
        let err = check_read_only("SELECT 1; DROP TABLE company").unwrap_err();
        assert!(err.reason.contains("DROP") || err.reason.contains("multiple"));
        assert!(check_read_only("SELECT 1; SELECT 2").is_err());
    }

    #[test]
    fn keywords_inside_literals_are_ignored() {
        assert!(check_read_only("SELECT 'DROP TABLE x' AS t").is_ok());
        assert!(check_read_only("SELECT \"delete\" FROM t").is_ok());
    }

    #[test]
    fn empty_is_rejected() {
        assert!(check_read_only("   ").is_err());
        assert!(check_read_only("-- nothing").is_err());
    }
}
