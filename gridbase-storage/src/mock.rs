//! In-memory persistence for tests.
//!
//! Answers compiled statements by their `(kind, subject)` label instead of
//! parsing SQL, and records every executed statement so tests can assert on
//! what was queried and how often.

use crate::persistence::{CompiledQuery, Persistence, QueryKind, SqlParam, Tuple};
use async_trait::async_trait;
use gridbase_core::StorageError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// In-memory [`Persistence`] keyed by statement kind and subject grid.
#[derive(Debug, Default, Clone)]
pub struct MockPersistence {
    results: Arc<RwLock<HashMap<(QueryKind, Uuid), Vec<Tuple>>>>,
    credentials: Arc<RwLock<HashMap<(String, String), Tuple>>>,
    failures: Arc<RwLock<HashMap<(QueryKind, Uuid), StorageError>>>,
    executed: Arc<RwLock<Vec<CompiledQuery>>>,
}

impl MockPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result rows returned for `(kind, subject)`.
    pub fn set_result(&self, kind: QueryKind, subject: Uuid, tuples: Vec<Tuple>) {
        self.results
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((kind, subject), tuples);
    }

    /// Append one result row for `(kind, subject)`.
    pub fn push_result(&self, kind: QueryKind, subject: Uuid, tuple: Tuple) {
        self.results
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry((kind, subject))
            .or_default()
            .push(tuple);
    }

    /// Register a user row returned for a matching login and password.
    pub fn set_credentials(&self, login_id: &str, password: &str, tuple: Tuple) {
        self.credentials
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((login_id.to_string(), password.to_string()), tuple);
    }

    /// Make statements labelled `(kind, subject)` fail.
    pub fn fail_with(&self, kind: QueryKind, subject: Uuid, error: StorageError) {
        self.failures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((kind, subject), error);
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<CompiledQuery> {
        self.executed.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of executed statements labelled `(kind, subject)`.
    pub fn count(&self, kind: QueryKind, subject: Uuid) -> usize {
        self.executed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|q| q.kind == kind && q.subject == subject)
            .count()
    }

    pub fn clear_executed(&self) {
        self.executed.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn run(&self, query: &CompiledQuery) -> Result<Vec<Tuple>, StorageError> {
        self.executed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(query.clone());

        let key = (query.kind, query.subject);
        if let Some(error) = self.failures.read().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Err(error.clone());
        }

        if query.kind == QueryKind::Authenticate {
            return Ok(self.match_credentials(&query.params).into_iter().collect());
        }

        Ok(self
            .results
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    fn match_credentials(&self, params: &[SqlParam]) -> Option<Tuple> {
        let texts: Vec<&str> = params
            .iter()
            .filter_map(|p| match p {
                SqlParam::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        let (login_id, password) = match texts.as_slice() {
            [login_id, password] => (login_id.to_string(), password.to_string()),
            _ => return None,
        };
        self.credentials
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(login_id, password))
            .cloned()
    }
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn select_one(&self, query: &CompiledQuery) -> Result<Option<Tuple>, StorageError> {
        Ok(self.run(query)?.into_iter().next())
    }

    async fn select_all(&self, query: &CompiledQuery) -> Result<Vec<Tuple>, StorageError> {
        self.run(query)
    }
}
