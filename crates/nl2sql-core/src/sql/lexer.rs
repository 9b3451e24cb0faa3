/// Coarse SQL token. String literals, quoted identifiers and comments are
/// kept as opaque tokens so keyword checks never look inside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Word(&'a str),
    Literal(&'a str),
    QuotedIdent(&'a str),
    Punct(char),
    Comment(&'a str),
}

impl<'a> Token<'a> {
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(kw))
    }
}

/// A token together with its byte offset into the source.
pub type Spanned<'a> = (usize, Token<'a>);

pub fn tokenize(sql: &str) -> Vec<Spanned<'_>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        match c {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                out.push((start, Token::Comment(&sql[start..i])));
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                out.push((start, Token::Comment(&sql[start..i])));
            }
            b'\'' => {
                i = skip_quoted(bytes, i, b'\'');
                out.push((start, Token::Literal(&sql[start..i])));
            }
            b'"' | b'`' => {
                i = skip_quoted(bytes, i, c);
                out.push((start, Token::QuotedIdent(&sql[start..i])));
            }
            b'[' => {
                while i < bytes.len() && bytes[i] != b']' {
                    i += 1;
                }
                i = (i + 1).min(bytes.len());
                out.push((start, Token::QuotedIdent(&sql[start..i])));
            }
            _ if is_word_byte(c) => {
                while i < bytes.len() && is_word_byte(bytes[i]) {
                    i += 1;
                }
                out.push((start, Token::Word(&sql[start..i])));
            }
            _ => {
                // Multi-byte chars are advanced whole so slicing stays on boundaries.
                let ch = sql[i..].chars().next().unwrap_or(' ');
                i += ch.len_utf8();
                out.push((start, Token::Punct(ch)));
            }
        }
    }
    out
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$'
}

fn skip_quoted(bytes: &[u8], open: usize, quote: u8) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // Doubled quote is an escaped quote.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Byte offset of the first `;` that is not inside a literal or comment.
pub fn first_terminator(sql: &str) -> Option<usize> {
    tokenize(sql)
        .into_iter()
        .find(|(_, t)| *t == Token::Punct(';'))
        .map(|(pos, _)| pos)
}
