//! Typed SELECT builder.
//!
//! Table names, aliases and slot columns only ever come from
//! [`StorageTable`] and integer addresses. Every caller-supplied value is
//! bound as a `$n` parameter. Joins are deduplicated by alias, so columns
//! that share a physical cell compile to a single join.

use crate::persistence::{CompiledQuery, QueryKind, SqlParam};
use gridbase_core::StorageTable;
use std::collections::HashSet;
use uuid::Uuid;

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

/// A predicate inside an ON or WHERE clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `left = right`, both qualified column references.
    Columns { left: String, right: String },
    /// `column = <literal partition>`.
    Partition { alias: String, partition: i32 },
    /// `column = $n`.
    Equals { column: String, value: SqlParam },
    /// `column = true`.
    IsTrue { column: String },
    /// `column IS NOT NULL`.
    NotNull { column: String },
    /// `column = crypt($n, column)`, a salted hash comparison.
    CryptMatches { column: String, value: SqlParam },
}

impl Condition {
    pub fn columns(left: impl Into<String>, right: impl Into<String>) -> Self {
        Condition::Columns {
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn equals(column: impl Into<String>, value: impl Into<SqlParam>) -> Self {
        Condition::Equals {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// A join fragment, keyed by its alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: StorageTable,
    pub alias: String,
    pub on: Vec<Condition>,
}

impl Join {
    pub fn left_outer(table: StorageTable, alias: impl Into<String>) -> Self {
        Self {
            kind: JoinKind::LeftOuter,
            table,
            alias: alias.into(),
            on: Vec::new(),
        }
    }

    pub fn inner(table: StorageTable, alias: impl Into<String>) -> Self {
        Self {
            kind: JoinKind::Inner,
            ..Self::left_outer(table, alias)
        }
    }

    pub fn on(mut self, condition: Condition) -> Self {
        self.on.push(condition);
        self
    }

    /// `{alias}.{joinKey} = {owner}` and `{alias}.partition = {partition}`,
    /// the standard attachment of a storage table to a row.
    pub fn attach(table: StorageTable, alias: impl Into<String>, owner: &str, partition: i32) -> Self {
        let alias = alias.into();
        Self::left_outer(table, alias.clone())
            .on(Condition::columns(format!("{}.{}", alias, table.join_key()), owner))
            .on(Condition::Partition { alias, partition })
    }
}

/// Builder for one SELECT statement over `rows`.
#[derive(Debug, Default)]
pub struct SelectBuilder {
    selects: Vec<String>,
    joins: Vec<String>,
    join_aliases: HashSet<String>,
    filters: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    params: Vec<SqlParam>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bind(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn render(&mut self, condition: Condition) -> String {
        match condition {
            Condition::Columns { left, right } => format!("{} = {}", left, right),
            Condition::Partition { alias, partition } => format!("{}.partition = {}", alias, partition),
            Condition::Equals { column, value } => {
                let placeholder = self.bind(value);
                format!("{} = {}", column, placeholder)
            }
            Condition::IsTrue { column } => format!("{} = true", column),
            Condition::NotNull { column } => format!("{} IS NOT NULL", column),
            Condition::CryptMatches { column, value } => {
                let placeholder = self.bind(value);
                format!("{} = crypt({}, {})", column, placeholder, column)
            }
        }
    }

    pub fn select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.selects.push(expr.into());
        self
    }

    /// Add a join unless one with the same alias is already present.
    ///
    /// Returns whether the join was added. Parameters of a skipped join are
    /// never bound.
    pub fn join(&mut self, join: Join) -> bool {
        if !self.join_aliases.insert(join.alias.clone()) {
            return false;
        }
        let conditions: Vec<String> = join.on.into_iter().map(|c| self.render(c)).collect();
        self.joins.push(format!(
            "{} {} AS {} ON {}",
            join.kind.keyword(),
            join.table.name(),
            join.alias,
            conditions.join(" AND ")
        ));
        true
    }

    pub fn filter(&mut self, condition: Condition) -> &mut Self {
        let rendered = self.render(condition);
        self.filters.push(rendered);
        self
    }

    pub fn group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn order_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.order_by.push(expr.into());
        self
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    pub fn build(self, kind: QueryKind, subject: Uuid) -> CompiledQuery {
        let mut sql = format!("SELECT {}\nFROM rows", self.selects.join(",\n       "));
        for join in &self.joins {
            sql.push('\n');
            sql.push_str(join);
        }
        if !self.filters.is_empty() {
            sql.push_str("\nWHERE ");
            sql.push_str(&self.filters.join("\n  AND "));
        }
        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        CompiledQuery {
            kind,
            subject,
            sql,
            params: self.params,
        }
    }
}
