//! Persistence collaborator contract.
//!
//! The engine only ever reads through parameterized SELECT statements. A
//! statement is a [`CompiledQuery`]; each result row comes back as a
//! [`Tuple`] of loosely typed [`SqlValue`]s that the compiler's decoders
//! turn into model objects.

use async_trait::async_trait;
use gridbase_core::StorageError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// PARAMETERS AND VALUES
// ============================================================================

/// A value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    Int(i32),
    Bool(bool),
}

impl From<Uuid> for SqlParam {
    fn from(value: Uuid) -> Self {
        SqlParam::Uuid(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

/// A field of a result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
    Uuid(Uuid),
    TextArray(Vec<Option<String>>),
    UuidArray(Vec<Option<Uuid>>),
}

impl SqlValue {
    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Text(_) => "text",
            SqlValue::Int(_) => "int",
            SqlValue::Bool(_) => "bool",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::TextArray(_) => "text[]",
            SqlValue::UuidArray(_) => "uuid[]",
        }
    }
}

/// One result row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple(pub Vec<SqlValue>);

impl Tuple {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: usize) -> Result<&SqlValue, StorageError> {
        self.0.get(field).ok_or_else(|| StorageError::DecodeFailed {
            field,
            reason: format!("result row has only {} fields", self.0.len()),
        })
    }

    fn mismatch(field: usize, expected: &str, found: &SqlValue) -> StorageError {
        StorageError::DecodeFailed {
            field,
            reason: format!("expected {}, found {}", expected, found.kind()),
        }
    }

    pub fn uuid(&self, field: usize) -> Result<Uuid, StorageError> {
        match self.get(field)? {
            SqlValue::Uuid(uuid) => Ok(*uuid),
            SqlValue::Text(text) => Uuid::parse_str(text).map_err(|e| StorageError::DecodeFailed {
                field,
                reason: e.to_string(),
            }),
            other => Err(Self::mismatch(field, "uuid", other)),
        }
    }

    pub fn opt_uuid(&self, field: usize) -> Result<Option<Uuid>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(None),
            _ => self.uuid(field).map(Some),
        }
    }

    pub fn opt_text(&self, field: usize) -> Result<Option<String>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(text) => Ok(Some(text.clone())),
            other => Err(Self::mismatch(field, "text", other)),
        }
    }

    /// Text field, with NULL read as the empty string.
    pub fn text(&self, field: usize) -> Result<String, StorageError> {
        Ok(self.opt_text(field)?.unwrap_or_default())
    }

    pub fn opt_int(&self, field: usize) -> Result<Option<i64>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(n) => Ok(Some(*n)),
            other => Err(Self::mismatch(field, "int", other)),
        }
    }

    pub fn opt_bool(&self, field: usize) -> Result<Option<bool>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(None),
            SqlValue::Bool(b) => Ok(Some(*b)),
            other => Err(Self::mismatch(field, "bool", other)),
        }
    }

    /// Aggregated uuid array; NULL (no match) reads as empty.
    pub fn uuid_array(&self, field: usize) -> Result<Vec<Option<Uuid>>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(Vec::new()),
            SqlValue::UuidArray(values) => Ok(values.clone()),
            other => Err(Self::mismatch(field, "uuid[]", other)),
        }
    }

    /// Aggregated text array; NULL (no match) reads as empty.
    pub fn text_array(&self, field: usize) -> Result<Vec<Option<String>>, StorageError> {
        match self.get(field)? {
            SqlValue::Null => Ok(Vec::new()),
            SqlValue::TextArray(values) => Ok(values.clone()),
            other => Err(Self::mismatch(field, "text[]", other)),
        }
    }
}

// ============================================================================
// COMPILED STATEMENTS
// ============================================================================

/// What a compiled statement loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum QueryKind {
    LoadGrid,
    LoadColumns,
    LoadRows,
    Authenticate,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::LoadGrid => "load_grid",
            QueryKind::LoadColumns => "load_columns",
            QueryKind::LoadRows => "load_rows",
            QueryKind::Authenticate => "authenticate",
        };
        f.write_str(name)
    }
}

/// A parameterized SELECT ready for execution.
///
/// `kind` and `subject` (the grid the statement is about) label the
/// statement for logs and let test backends answer without parsing SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub kind: QueryKind,
    pub subject: Uuid,
    pub sql: String,
    pub params: Vec<SqlParam>,
}

// ============================================================================
// PERSISTENCE TRAIT
// ============================================================================

/// Read access to the physical tables.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Execute a statement expected to return at most one row.
    async fn select_one(&self, query: &CompiledQuery) -> Result<Option<Tuple>, StorageError>;

    /// Execute a statement and return all of its rows.
    async fn select_all(&self, query: &CompiledQuery) -> Result<Vec<Tuple>, StorageError>;
}
