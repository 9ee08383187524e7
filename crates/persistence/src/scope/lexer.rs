//! SQL tokenizer used to locate clause boundaries.
//!
//! The tokenizer understands just enough SQL to tell keywords apart from
//! string literals (including `E'...'`), quoted identifiers, comments and
//! dollar-quoted bodies, and to track parenthesis depth. It never interprets or rewrites text.

use crate::error::ScopeError;

/// The marker callers place where the silo predicate belongs.
pub const SCOPE_MARKER: &str = "silo_scope";

/// Placeholder spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ...
    Dollar,
    /// `?1`, `?2`, ... or a bare `?`.
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Whitespace,
    Comment,
    /// Keyword or bare identifier, uppercased for comparison.
    Word(String),
    QuotedIdent,
    Literal,
    Number,
    Placeholder {
        style: PlaceholderStyle,
        index: Option<usize>,
    },
    OpenParen,
    CloseParen,
    Semicolon,
    Marker {
        qualifier: Option<String>,
    },
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

impl Token<'_> {
    /// Whitespace and comments.
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Word(w) if w == word)
    }
}

pub(crate) fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, ScopeError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let b = bytes[pos];

        let kind = match b {
            b if b.is_ascii_whitespace() => {
                while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                    pos += 1;
                }
                TokenKind::Whitespace
            }
            b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
                TokenKind::Comment
            }
            b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                let end = sql[pos + 2..]
                    .find("*/")
                    .ok_or(ScopeError::Unterminated { what: "comment" })?;
                pos += 2 + end + 2;
                TokenKind::Comment
            }
            b'\'' => {
                pos = scan_quoted(bytes, pos, b'\'')
                    .ok_or(ScopeError::Unterminated { what: "string literal" })?;
                TokenKind::Literal
            }
            b'E' | b'e' if bytes.get(pos + 1) == Some(&b'\'') => {
                pos = scan_escape_string(bytes, pos + 1)?;
                TokenKind::Literal
            }
            b'"' => {
                pos = scan_quoted(bytes, pos, b'"').ok_or(ScopeError::Unterminated {
                    what: "quoted identifier",
                })?;
                TokenKind::QuotedIdent
            }
            b'$' => {
                let digits = count_digits(&bytes[pos + 1..]);
                if digits > 0 {
                    pos += 1 + digits;
                    TokenKind::Placeholder {
                        style: PlaceholderStyle::Dollar,
                        index: sql[start + 1..pos].parse().ok(),
                    }
                } else {
                    pos = scan_dollar_quoted(sql, pos).ok_or(ScopeError::Unterminated {
                        what: "dollar-quoted string",
                    })?;
                    TokenKind::Literal
                }
            }
            b'?' => {
                let digits = count_digits(&bytes[pos + 1..]);
                pos += 1 + digits;
                TokenKind::Placeholder {
                    style: PlaceholderStyle::Question,
                    index: if digits > 0 {
                        sql[start + 1..pos].parse().ok()
                    } else {
                        None
                    },
                }
            }
            b'{' => match scan_marker(sql, pos)? {
                Some((end, qualifier)) => {
                    pos = end;
                    TokenKind::Marker { qualifier }
                }
                None => {
                    pos += 1;
                    TokenKind::Symbol
                }
            },
            b'(' => {
                pos += 1;
                TokenKind::OpenParen
            }
            b')' => {
                pos += 1;
                TokenKind::CloseParen
            }
            b';' => {
                pos += 1;
                TokenKind::Semicolon
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'$')
                {
                    pos += 1;
                }
                TokenKind::Word(sql[start..pos].to_ascii_uppercase())
            }
            b if b.is_ascii_digit() => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'.')
                {
                    pos += 1;
                }
                TokenKind::Number
            }
            _ => {
                // Advance one whole character so slices stay on UTF-8 boundaries.
                let width = sql[pos..].chars().next().map(char::len_utf8).unwrap_or(1);
                pos += width;
                TokenKind::Symbol
            }
        };

        tokens.push(Token {
            kind,
            text: &sql[start..pos],
        });
    }

    Ok(tokens)
}

fn count_digits(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|b| b.is_ascii_digit()).count()
}

/// Scans a quoted run where the quote character is escaped by doubling.
/// Returns the position just past the closing quote.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let mut pos = start + 1;
    while pos < bytes.len() {
        if bytes[pos] == quote {
            if bytes.get(pos + 1) == Some(&quote) {
                pos += 2;
                continue;
            }
            return Some(pos + 1);
        }
        pos += 1;
    }
    None
}

/// Scans the body of a Postgres `E'...'` literal starting at its opening quote.
/// Backslash escapes apply here, so the literal must end at the same quote
/// under both escaping rules or the boundary is unknowable without the dialect.
fn scan_escape_string(bytes: &[u8], quote: usize) -> Result<usize, ScopeError> {
    let mut pos = quote + 1;
    let end = loop {
        match bytes.get(pos) {
            None => {
                return Err(ScopeError::Unterminated {
                    what: "escape string literal",
                })
            }
            Some(b'\\') => pos += 2,
            Some(b'\'') if bytes.get(pos + 1) == Some(&b'\'') => pos += 2,
            Some(b'\'') => break pos + 1,
            Some(_) => pos += 1,
        }
    };
    if scan_quoted(bytes, quote, b'\'') != Some(end) {
        return Err(ScopeError::EscapedQuote);
    }
    Ok(end)
}

/// Scans `$tag$ ... $tag$`. A `$` that does not open a valid tag is rejected.
fn scan_dollar_quoted(sql: &str, start: usize) -> Option<usize> {
    let rest = &sql[start + 1..];
    let tag_len = rest.find('$')?;
    let tag = &rest[..tag_len];
    if !tag
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return None;
    }
    let delimiter = &sql[start..start + tag_len + 2];
    let body_start = start + delimiter.len();
    let close = sql[body_start..].find(delimiter)?;
    Some(body_start + close + delimiter.len())
}

/// Recognizes `{silo_scope}` and `{silo_scope:alias}`.
fn scan_marker(sql: &str, start: usize) -> Result<Option<(usize, Option<String>)>, ScopeError> {
    let rest = &sql[start + 1..];
    if !rest.starts_with(SCOPE_MARKER) {
        return Ok(None);
    }
    let Some(close) = rest.find('}') else {
        return Ok(None);
    };
    let inner = &rest[..close];
    let qualifier = match inner.strip_prefix(SCOPE_MARKER) {
        Some("") => None,
        Some(tail) => match tail.strip_prefix(':') {
            Some(alias) if is_identifier(alias) => Some(alias.to_string()),
            Some(alias) => {
                return Err(ScopeError::InvalidQualifier {
                    qualifier: alias.to_string(),
                });
            }
            None => return Ok(None),
        },
        None => return Ok(None),
    };
    Ok(Some((start + 1 + close + 1, qualifier)))
}

/// Returns `true` for a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql)
            .unwrap()
            .into_iter()
            .filter(|t| !t.is_trivia())
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_are_uppercased() {
        let kinds = kinds("select id from contacts where x = 1");
        assert_eq!(kinds[0], TokenKind::Word("SELECT".to_string()));
        assert!(kinds.contains(&TokenKind::Word("WHERE".to_string())));
    }

    #[test]
    fn test_where_inside_literal_is_not_a_keyword() {
        let tokens = tokenize("SELECT 'where' FROM t").unwrap();
        assert!(!tokens.iter().any(|t| t.is_word("WHERE")));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Literal && t.text == "'where'"));
    }

    #[test]
    fn test_escaped_quotes() {
        let tokens = tokenize("SELECT 'it''s where' FROM t").unwrap();
        assert!(tokens.iter().any(|t| t.text == "'it''s where'"));
    }

    #[test]
    fn test_escape_string_literals() {
        let tokens = tokenize(r"SELECT E'a\tb where' FROM t").unwrap();
        assert!(!tokens.iter().any(|t| t.is_word("WHERE")));
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Literal && t.text == r"E'a\tb where'"));

        let tokens = tokenize("SELECT e'it''s' FROM t").unwrap();
        assert!(tokens.iter().any(|t| t.text == "e'it''s'"));

        // A plain identifier ending in E is not a prefix.
        let tokens = tokenize("SELECT name'x' FROM t").unwrap();
        assert!(tokens.iter().any(|t| t.is_word("NAME")));
    }

    #[test]
    fn test_escape_string_with_backslash_quote_is_rejected() {
        assert!(matches!(
            tokenize(r"SELECT E'it\'s' FROM t WHERE {silo_scope}"),
            Err(ScopeError::EscapedQuote)
        ));
        assert!(matches!(
            tokenize(r"SELECT E'\' OR true --' FROM t WHERE {silo_scope}"),
            Err(ScopeError::EscapedQuote)
        ));
        assert!(matches!(
            tokenize(r"SELECT E'open\"),
            Err(ScopeError::Unterminated { .. })
        ));
    }

    #[test]
    fn test_comments_hide_keywords() {
        let tokens = tokenize("SELECT 1 -- where\n/* where */ FROM t").unwrap();
        assert!(!tokens.iter().any(|t| t.is_word("WHERE")));
    }

    #[test]
    fn test_placeholders() {
        let kinds = kinds("a = $12 AND b = ?3 AND c = ?");
        assert!(kinds.contains(&TokenKind::Placeholder {
            style: PlaceholderStyle::Dollar,
            index: Some(12)
        }));
        assert!(kinds.contains(&TokenKind::Placeholder {
            style: PlaceholderStyle::Question,
            index: Some(3)
        }));
        assert!(kinds.contains(&TokenKind::Placeholder {
            style: PlaceholderStyle::Question,
            index: None
        }));
    }

    #[test]
    fn test_markers() {
        assert!(kinds("{silo_scope}").contains(&TokenKind::Marker { qualifier: None }));
        assert!(kinds("{silo_scope:c}").contains(&TokenKind::Marker {
            qualifier: Some("c".to_string())
        }));
        assert_eq!(kinds("{other}")[0], TokenKind::Symbol);
    }

    #[test]
    fn test_marker_inside_literal_is_text() {
        let kinds = kinds("'{silo_scope}'");
        assert_eq!(kinds, vec![TokenKind::Literal]);
    }

    #[test]
    fn test_bad_qualifier() {
        assert!(matches!(
            tokenize("{silo_scope:c; DROP}"),
            Err(ScopeError::InvalidQualifier { .. })
        ));
    }

    #[test]
    fn test_unterminated_inputs() {
        assert!(tokenize("SELECT 'open").is_err());
        assert!(tokenize("SELECT \"open").is_err());
        assert!(tokenize("SELECT /* open").is_err());
        assert!(tokenize("SELECT $tag$ open").is_err());
    }

    #[test]
    fn test_dollar_quoted_body() {
        let tokens = tokenize("SELECT $q$ where ; $q$ FROM t").unwrap();
        assert!(!tokens.iter().any(|t| t.is_word("WHERE")));
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::Semicolon));
    }

    #[test]
    fn test_tokens_cover_input() {
        let sql = "SELECT é, \"Col\" FROM t WHERE a = 'x' {silo_scope}";
        let rebuilt: String = tokenize(sql).unwrap().iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, sql);
    }
}
