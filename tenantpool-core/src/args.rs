//! Bind arguments and statement results shared by every backend.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A dynamically typed statement parameter.
///
/// Arguments bind positionally (`$1`, `$2`, ...) and are rendered into
/// span fields, so their `Display` form is what shows up in traces.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

impl fmt::Display for SqlArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlArg::Null => f.write_str("NULL"),
            SqlArg::Bool(v) => write!(f, "{v}"),
            SqlArg::Int(v) => write!(f, "{v}"),
            SqlArg::Float(v) => write!(f, "{v}"),
            SqlArg::Text(v) => write!(f, "{v:?}"),
            SqlArg::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlArg::Uuid(v) => write!(f, "{v}"),
            SqlArg::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            SqlArg::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        SqlArg::Bool(v)
    }
}

impl From<i32> for SqlArg {
    fn from(v: i32) -> Self {
        SqlArg::Int(i64::from(v))
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        SqlArg::Float(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_owned())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<Vec<u8>> for SqlArg {
    fn from(v: Vec<u8>) -> Self {
        SqlArg::Bytes(v)
    }
}

impl From<Uuid> for SqlArg {
    fn from(v: Uuid) -> Self {
        SqlArg::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlArg {
    fn from(v: DateTime<Utc>) -> Self {
        SqlArg::Timestamp(v)
    }
}

impl From<JsonValue> for SqlArg {
    fn from(v: JsonValue) -> Self {
        SqlArg::Json(v)
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlArg::Null, Into::into)
    }
}

/// Renders an argument slice as `[a, b, c]` for span fields.
pub struct ArgList<'a>(pub &'a [SqlArg]);

impl fmt::Display for ArgList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, arg) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str("]")
    }
}

/// Completion tag of a statement that returns no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTag {
    command: String,
    rows_affected: u64,
}

impl CommandTag {
    pub fn new(command: impl Into<String>, rows_affected: u64) -> Self {
        Self {
            command: command.into(),
            rows_affected,
        }
    }

    /// Build a tag the way Postgres names the statement's command.
    ///
    /// The pool reports only a row count, so the verb is read from the
    /// statement: leading comments and parentheses are skipped, a `WITH`
    /// query takes the verb of its main statement, and DDL keeps its object
    /// kind (`CREATE TABLE`).
    pub fn for_statement(statement: &str, rows_affected: u64) -> Self {
        Self::new(command_name(&top_level_words(statement)), rows_affected)
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.command.as_str() {
            // oid is always 0
            "INSERT" => write!(f, "INSERT 0 {}", self.rows_affected),
            "SELECT" | "UPDATE" | "DELETE" | "MERGE" | "MOVE" | "FETCH" | "COPY" => {
                write!(f, "{} {}", self.command, self.rows_affected)
            }
            "" => write!(f, "{}", self.rows_affected),
            command => f.write_str(command),
        }
    }
}

/// Main-statement verbs that may follow a `WITH` list.
const WITH_BODY_VERBS: &[&str] = &["SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "VALUES", "TABLE"];

/// Modifiers between `CREATE`/`DROP`/`ALTER` and the object kind.
const DDL_MODIFIERS: &[&str] = &[
    "OR", "REPLACE", "UNIQUE", "TEMP", "TEMPORARY", "UNLOGGED", "GLOBAL", "LOCAL", "TRUSTED",
    "PROCEDURAL", "RECURSIVE",
];

fn command_name(words: &[(usize, String)]) -> String {
    let Some((depth, first)) = words.first() else {
        return String::new();
    };

    match first.as_str() {
        "WITH" => words
            .iter()
            .skip(1)
            .filter(|(d, _)| d == depth)
            .map(|(_, word)| word.as_str())
            .find(|word| WITH_BODY_VERBS.contains(word))
            .map_or("SELECT", select_alias)
            .to_string(),
        "CREATE" | "DROP" | "ALTER" => {
            let mut kind = words[1..]
                .iter()
                .map(|(_, word)| word.as_str())
                .skip_while(|word| DDL_MODIFIERS.contains(word));
            match kind.next() {
                Some("MATERIALIZED") => format!("{first} MATERIALIZED VIEW"),
                Some("FOREIGN") => format!("{first} FOREIGN TABLE"),
                Some(object) => format!("{first} {object}"),
                None => first.clone(),
            }
        }
        "TRUNCATE" => "TRUNCATE TABLE".to_string(),
        "START" => "START TRANSACTION".to_string(),
        verb => select_alias(verb).to_string(),
    }
}

fn select_alias(verb: &str) -> &str {
    match verb {
        "VALUES" | "TABLE" => "SELECT",
        verb => verb,
    }
}

/// Uppercased keywords of a statement with their parenthesis depth.
///
/// Comments, string literals and quoted identifiers are skipped.
fn top_level_words(statement: &str) -> Vec<(usize, String)> {
    let mut words = Vec::new();
    let mut depth = 0usize;
    let mut chars = statement.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                chars.by_ref().find(|&c| c == '\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut nesting = 1;
                let mut prev = '\0';
                while nesting > 0 {
                    let Some(c) = chars.next() else { break };
                    match (prev, c) {
                        ('/', '*') => {
                            nesting += 1;
                            prev = '\0';
                            continue;
                        }
                        ('*', '/') => {
                            nesting -= 1;
                            prev = '\0';
                            continue;
                        }
                        _ => {}
                    }
                    prev = c;
                }
            }
            '\'' | '"' => {
                chars.by_ref().find(|&next| next == c);
            }
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c.to_ascii_uppercase());
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next.to_ascii_uppercase());
                    chars.next();
                }
                words.push((depth, word));
            }
            _ => {}
        }
    }
    words
}

/// Result of `query_row`: the single row, read lazily.
///
/// Errors from the database are held until the row is read, so a
/// missing row and a failed query both surface from the same call.
#[derive(Debug)]
pub struct SingleRow<R> {
    result: Result<Option<R>, sqlx::Error>,
}

impl<R> SingleRow<R> {
    pub fn new(result: Result<Option<R>, sqlx::Error>) -> Self {
        Self { result }
    }

    /// The row, `sqlx::Error::RowNotFound` when the query matched nothing,
    /// or the deferred database error.
    pub fn into_row(self) -> Result<R, sqlx::Error> {
        self.result?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Like [`SingleRow::into_row`], but an empty result is `Ok(None)`.
    pub fn optional(self) -> Result<Option<R>, sqlx::Error> {
        self.result
    }
}

/// Buffered result of `query`.
#[derive(Debug)]
pub struct Rows<R> {
    rows: Vec<R>,
}

impl<R> Rows<R> {
    pub fn new(rows: Vec<R>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rows.iter()
    }

    pub fn into_vec(self) -> Vec<R> {
        self.rows
    }
}

impl<R> IntoIterator for Rows<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a Rows<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Connection counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
}
