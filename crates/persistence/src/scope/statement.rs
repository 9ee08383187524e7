//! Silo-scoped statements.
//!
//! A [`ScopedStatement`] is caller-written SQL that marks where the silo
//! predicate belongs with `{silo_scope}` (or `{silo_scope:alias}` to qualify
//! the column). Composition rewrites the top-level `WHERE` clause as
//! `WHERE (<caller predicate>) AND silo = <next placeholder>` and appends the
//! silo to the parameters. Anything the composer cannot place with certainty
//! is rejected before it reaches the database.
//!
//! Only single `SELECT`, `UPDATE` and `DELETE` statements without nested
//! `SELECT`s are accepted. When a statement reads several tables, each one
//! needs its own qualified marker:
//!
//! ```text
//! SELECT c.name, a.status FROM contacts c JOIN loan_applications a ON a.contact_id = c.id
//! WHERE a.id = $1 {silo_scope:c} AND {silo_scope:a}
//! ```
//!
//! Inserts are written through [`ScopedInsert`](super::ScopedInsert).

use std::fmt;

use super::lexer::{PlaceholderStyle, Token, TokenKind, tokenize};
use super::value::SqlValue;
use crate::error::ScopeError;
use crate::silo::Silo;

/// Name of the scope column on every silo-owned table.
pub const SILO_COLUMN: &str = "silo";

/// Keywords that close a `WHERE` clause.
const CLAUSE_KEYWORDS: &[&str] = &[
    "GROUP",
    "ORDER",
    "LIMIT",
    "HAVING",
    "RETURNING",
    "OFFSET",
    "WINDOW",
    "FOR",
    "FETCH",
];

const COMPOUND_KEYWORDS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

/// Placeholder dialect of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `$1`, `$2`, ...
    Postgres,
    /// `?1`, `?2`, ...
    Sqlite,
}

impl Dialect {
    /// Renders the placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
        }
    }

    fn style(&self) -> PlaceholderStyle {
        match self {
            Dialect::Postgres => PlaceholderStyle::Dollar,
            Dialect::Sqlite => PlaceholderStyle::Question,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Postgres => write!(f, "postgres"),
            Dialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// A statement against silo-owned tables, before scoping.
///
/// ```
/// use portal_persistence::scope::{Dialect, ScopedStatement};
/// use portal_persistence::silo::Silo;
///
/// let stmt = ScopedStatement::new(
///     "SELECT id, name FROM contacts WHERE status = $1 {silo_scope} ORDER BY name",
/// );
/// let composed = stmt
///     .compose(Dialect::Postgres, Silo::BI, vec!["active".into()])
///     .unwrap();
/// assert_eq!(
///     composed.sql(),
///     "SELECT id, name FROM contacts WHERE (status = $1) AND silo = $2 ORDER BY name",
/// );
/// assert_eq!(composed.params().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedStatement {
    sql: String,
}

impl ScopedStatement {
    /// Wraps caller SQL. Nothing is validated until [`compose`](Self::compose).
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    /// Returns the caller's SQL.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Injects the silo predicate, or rejects the statement as ambiguous.
    pub fn compose(
        &self,
        dialect: Dialect,
        silo: Silo,
        mut params: Vec<SqlValue>,
    ) -> Result<ComposedStatement, ScopeError> {
        let tokens = tokenize(&self.sql)?;
        let layout = analyze(&tokens, dialect, params.len())?;

        let mut sql = String::with_capacity(self.sql.len() + 32);
        for token in &tokens[..=layout.where_index] {
            sql.push_str(token.text);
        }
        let predicate: String = tokens[layout.predicate.clone()]
            .iter()
            .map(|t| t.text)
            .collect();
        let mut clauses = Vec::with_capacity(layout.qualifiers.len() + 1);
        if !predicate.is_empty() {
            clauses.push(format!("({predicate})"));
        }
        for qualifier in &layout.qualifiers {
            let column = match qualifier {
                Some(alias) => format!("{alias}.{SILO_COLUMN}"),
                None => SILO_COLUMN.to_string(),
            };
            params.push(SqlValue::from(silo));
            clauses.push(format!("{column} = {}", dialect.placeholder(params.len())));
        }
        sql.push(' ');
        sql.push_str(&clauses.join(" AND "));
        for token in &tokens[layout.last_marker + 1..] {
            sql.push_str(token.text);
        }

        Ok(ComposedStatement {
            sql,
            params,
            silo,
        })
    }
}

/// A statement that carries a bound silo predicate.
///
/// Only produced by [`ScopedStatement::compose`] and
/// [`ScopedInsert::compose`](super::ScopedInsert::compose), so holding one
/// means the scoping rules were applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedStatement {
    sql: String,
    params: Vec<SqlValue>,
    silo: Silo,
}

impl ComposedStatement {
    pub(crate) fn from_parts(sql: String, params: Vec<SqlValue>, silo: Silo) -> Self {
        Self { sql, params, silo }
    }

    /// The final SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters; the silo is the last one.
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// The silo the statement is scoped to.
    pub fn silo(&self) -> Silo {
        self.silo
    }
}

/// Token positions the composer needs.
struct Layout {
    where_index: usize,
    last_marker: usize,
    /// Tokens between `WHERE` and the first marker, trimmed of trivia and of
    /// one trailing `AND`.
    predicate: std::ops::Range<usize>,
    /// One entry per marker, in statement order.
    qualifiers: Vec<Option<String>>,
}

/// Keywords that cannot be a table alias.
const NON_ALIAS_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "OUTER", "NATURAL", "ON", "USING",
    "SET", "LATERAL",
];

/// A table named in FROM, JOIN, USING or UPDATE position.
struct TableRef<'a> {
    table: &'a str,
    /// Alias, or the table's own name; uppercased for comparison.
    reference: String,
}

fn analyze(tokens: &[Token<'_>], dialect: Dialect, supplied: usize) -> Result<Layout, ScopeError> {
    let mut depth: usize = 0;
    let mut wheres = Vec::new();
    let mut markers = Vec::new();
    // (index, depth) of significant tokens
    let mut significant: Vec<(usize, usize)> = Vec::new();

    for (index, token) in tokens.iter().enumerate() {
        if token.is_trivia() {
            continue;
        }
        if let Some(&(last, _)) = significant.last() {
            if tokens[last].kind == TokenKind::Semicolon {
                return Err(ScopeError::MultipleStatements);
            }
        }

        match &token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(ScopeError::UnbalancedParentheses)?;
            }
            TokenKind::Word(word) if COMPOUND_KEYWORDS.contains(&word.as_str()) => {
                return Err(ScopeError::CompoundQuery {
                    keyword: word.clone(),
                });
            }
            TokenKind::Word(word) if depth > 0 && matches!(word.as_str(), "SELECT" | "WHERE") => {
                return Err(ScopeError::Subquery);
            }
            TokenKind::Word(word) if word == "WHERE" => wheres.push(index),
            TokenKind::Marker { qualifier } => markers.push((index, depth, qualifier.clone())),
            TokenKind::Placeholder { style, index: number } => {
                if *style != dialect.style() {
                    return Err(ScopeError::ForeignPlaceholder {
                        placeholder: token.text.to_string(),
                    });
                }
                match number {
                    None => {
                        return Err(ScopeError::ForeignPlaceholder {
                            placeholder: token.text.to_string(),
                        });
                    }
                    Some(n) if *n == 0 || *n > supplied => {
                        return Err(ScopeError::PlaceholderOutOfRange {
                            found: *n,
                            supplied,
                        });
                    }
                    Some(_) => {}
                }
            }
            _ => {}
        }
        significant.push((index, depth));
    }

    if depth != 0 {
        return Err(ScopeError::UnbalancedParentheses);
    }

    let verb = match significant.first().map(|&(i, _)| &tokens[i].kind) {
        Some(TokenKind::Word(word)) => word.as_str(),
        _ => return Err(ScopeError::MissingWhere),
    };
    if !matches!(verb, "SELECT" | "UPDATE" | "DELETE") {
        return Err(ScopeError::UnsupportedStatement {
            keyword: verb.to_string(),
        });
    }

    let where_index = match wheres.as_slice() {
        [] => return Err(ScopeError::MissingWhere),
        [only] => *only,
        many => return Err(ScopeError::MultipleWhere { count: many.len() }),
    };

    if markers.is_empty() {
        return Err(ScopeError::MissingMarker);
    }
    for &(index, marker_depth, _) in &markers {
        if marker_depth > 0 {
            return Err(ScopeError::MarkerNested);
        }
        if index < where_index {
            return Err(ScopeError::MarkerOutsideWhere);
        }
    }
    let first_marker = markers[0].0;
    let last_marker = markers[markers.len() - 1].0;

    let inside_where = significant
        .iter()
        .filter(|(i, d)| *i > where_index && *i < first_marker && *d == 0);
    for &(i, _) in inside_where {
        if is_clause_keyword(&tokens[i]) {
            return Err(ScopeError::MarkerOutsideWhere);
        }
    }

    // Markers form one run, optionally joined by AND.
    let between_markers = significant
        .iter()
        .filter(|(i, _)| *i > first_marker && *i < last_marker);
    for &(i, _) in between_markers {
        let token = &tokens[i];
        if !matches!(token.kind, TokenKind::Marker { .. }) && !token.is_word("AND") {
            return Err(ScopeError::MarkerNotAtEnd);
        }
    }

    let next = significant.iter().find(|(i, _)| *i > last_marker);
    if let Some(&(i, _)) = next {
        let token = &tokens[i];
        if token.kind != TokenKind::Semicolon && !is_clause_keyword(token) {
            return Err(ScopeError::MarkerNotAtEnd);
        }
    }

    let tables = table_references(tokens, &significant, where_index)?;
    let qualifiers = markers.into_iter().map(|(_, _, q)| q).collect::<Vec<_>>();
    check_coverage(&tables, &qualifiers)?;

    if verb == "UPDATE" {
        reject_silo_assignment(tokens, &significant, where_index)?;
    }

    // Trim the predicate to its significant tokens.
    let mut inner = significant
        .iter()
        .map(|(i, _)| *i)
        .filter(|i| *i > where_index && *i < first_marker)
        .collect::<Vec<_>>();
    if inner.last().is_some_and(|&i| tokens[i].is_word("AND")) {
        inner.pop();
    }
    if let Some(&last) = inner.last() {
        if let TokenKind::Word(word) = &tokens[last].kind {
            if matches!(word.as_str(), "AND" | "OR" | "NOT") {
                return Err(ScopeError::DanglingConnective {
                    keyword: word.clone(),
                });
            }
        }
    }
    let predicate = match (inner.first(), inner.last()) {
        (Some(&first), Some(&last)) => first..last + 1,
        _ => where_index + 1..where_index + 1,
    };

    Ok(Layout {
        where_index,
        last_marker,
        predicate,
        qualifiers,
    })
}

fn is_clause_keyword(token: &Token<'_>) -> bool {
    matches!(&token.kind, TokenKind::Word(w) if CLAUSE_KEYWORDS.contains(&w.as_str()))
}

/// Collects every table the statement reads or writes before its `WHERE`.
///
/// A table starts after `UPDATE` (as the first word), `FROM`, `JOIN`, a
/// table-position `USING`, or a comma inside a FROM list.
fn table_references<'a>(
    tokens: &[Token<'a>],
    significant: &[(usize, usize)],
    where_index: usize,
) -> Result<Vec<TableRef<'a>>, ScopeError> {
    let mut tables = Vec::new();
    let mut in_from = false;
    let mut pos = 0;

    while pos < significant.len() {
        let (index, depth) = significant[pos];
        if index >= where_index {
            break;
        }
        pos += 1;
        if depth > 0 {
            continue;
        }

        let token = &tokens[index];
        let starts_table = match &token.kind {
            TokenKind::Word(word) => match word.as_str() {
                "UPDATE" => pos == 1,
                // `IS DISTINCT FROM` compares values.
                "FROM" => pos < 2 || !tokens[significant[pos - 2].0].is_word("DISTINCT"),
                "JOIN" => true,
                "USING" => {
                    in_from
                        && significant
                            .get(pos)
                            .is_some_and(|&(i, _)| tokens[i].kind != TokenKind::OpenParen)
                }
                "SET" => {
                    in_from = false;
                    false
                }
                _ => false,
            },
            TokenKind::Symbol => in_from && token.text == ",",
            _ => false,
        };
        if starts_table {
            in_from = true;
            let (table, next) = read_table(tokens, significant, pos)?;
            tables.push(table);
            pos = next;
        }
    }

    Ok(tables)
}

/// Reads `name [[AS] alias]` starting at `significant[pos]`.
fn read_table<'a>(
    tokens: &[Token<'a>],
    significant: &[(usize, usize)],
    mut pos: usize,
) -> Result<(TableRef<'a>, usize), ScopeError> {
    let Some(mut name) = name_at(tokens, significant, pos) else {
        let source_text = significant
            .get(pos)
            .map(|&(i, _)| tokens[i].text.to_string())
            .unwrap_or_default();
        return Err(ScopeError::UnscopableSource { source_text });
    };
    pos += 1;
    // schema.table
    while significant.get(pos).is_some_and(|&(i, _)| tokens[i].text == ".") {
        name = name_at(tokens, significant, pos + 1).ok_or_else(|| {
            ScopeError::UnscopableSource {
                source_text: name.text.to_string(),
            }
        })?;
        pos += 2;
    }
    if significant
        .get(pos)
        .is_some_and(|&(i, _)| tokens[i].kind == TokenKind::OpenParen)
    {
        return Err(ScopeError::UnscopableSource {
            source_text: name.text.to_string(),
        });
    }

    let mut alias = None;
    if let Some(next) = name_at(tokens, significant, pos) {
        if next.is_word("AS") {
            alias = name_at(tokens, significant, pos + 1);
            if alias.is_none() {
                return Err(ScopeError::UnscopableSource {
                    source_text: name.text.to_string(),
                });
            }
            pos += 2;
        } else if can_be_alias(next) {
            alias = Some(next);
            pos += 1;
        }
    }

    let table = TableRef {
        table: name.text,
        reference: identifier_key(alias.unwrap_or(name).text),
    };
    Ok((table, pos))
}

/// The word or quoted identifier at `significant[pos]`, if any.
fn name_at<'t, 'a>(
    tokens: &'t [Token<'a>],
    significant: &[(usize, usize)],
    pos: usize,
) -> Option<&'t Token<'a>> {
    significant
        .get(pos)
        .map(|&(i, _)| &tokens[i])
        .filter(|t| matches!(t.kind, TokenKind::Word(_) | TokenKind::QuotedIdent))
}

fn can_be_alias(token: &Token<'_>) -> bool {
    match &token.kind {
        TokenKind::QuotedIdent => true,
        TokenKind::Word(word) => {
            !NON_ALIAS_KEYWORDS.contains(&word.as_str()) && !CLAUSE_KEYWORDS.contains(&word.as_str())
        }
        _ => false,
    }
}

fn identifier_key(text: &str) -> String {
    text.trim_matches('"').to_ascii_uppercase()
}

/// Every table needs exactly one marker naming it.
fn check_coverage(tables: &[TableRef<'_>], qualifiers: &[Option<String>]) -> Result<(), ScopeError> {
    if tables.is_empty() {
        return Err(ScopeError::MissingTable);
    }

    let mut covered = vec![0usize; tables.len()];
    for qualifier in qualifiers {
        let slot = match qualifier {
            None if tables.len() == 1 => 0,
            None => {
                return Err(ScopeError::UnqualifiedMarker {
                    tables: tables.len(),
                });
            }
            Some(alias) => {
                let key = identifier_key(alias);
                tables
                    .iter()
                    .position(|t| t.reference == key)
                    .ok_or_else(|| ScopeError::UnknownQualifier {
                        qualifier: alias.clone(),
                    })?
            }
        };
        covered[slot] += 1;
    }

    if let Some(count) = covered.iter().copied().find(|&c| c > 1) {
        return Err(ScopeError::DuplicateMarker { count });
    }
    if let Some(slot) = covered.iter().position(|&c| c == 0) {
        return Err(ScopeError::UncoveredTable {
            table: tables[slot].table.to_string(),
        });
    }
    Ok(())
}

/// Rejects any mention of the scope column in an UPDATE's SET list, which
/// could move rows between silos.
fn reject_silo_assignment(
    tokens: &[Token<'_>],
    significant: &[(usize, usize)],
    where_index: usize,
) -> Result<(), ScopeError> {
    let set_list = significant
        .iter()
        .filter(|(i, _)| *i < where_index)
        .skip_while(|(i, d)| !(*d == 0 && tokens[*i].is_word("SET")))
        .skip(1)
        .take_while(|(i, d)| !(*d == 0 && tokens[*i].is_word("FROM")));
    for &(i, _) in set_list {
        let token = &tokens[i];
        let names_silo = match &token.kind {
            TokenKind::Word(w) => w == "SILO",
            TokenKind::QuotedIdent => identifier_key(token.text) == "SILO",
            _ => false,
        };
        if names_silo {
            return Err(ScopeError::ExplicitSiloColumn);
        }
    }
    Ok(())
}
