//! Physical addressing of logical columns.
//!
//! A logical column is stored in one of four wide tables. Its `columnIndex`
//! picks the row partition (`columnIndex div 10`) and the slot inside that
//! partition (`columnIndex mod 10`). Aliases are a pure function of the
//! address so that columns sharing a storage cell reuse one join.

use crate::catalog::ColumnType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of value slots per physical partition row.
pub const SLOTS_PER_PARTITION: i32 = 10;

/// Physical tables of the fixed storage schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageTable {
    Rows,
    Texts,
    Ints,
    Booleans,
    Relationships,
}

impl StorageTable {
    /// Table used to store values of the given column type.
    pub fn for_column_type(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Int => StorageTable::Ints,
            ColumnType::Reference => StorageTable::Relationships,
            ColumnType::Boolean => StorageTable::Booleans,
            _ => StorageTable::Texts,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageTable::Rows => "rows",
            StorageTable::Texts => "texts",
            StorageTable::Ints => "ints",
            StorageTable::Booleans => "booleans",
            StorageTable::Relationships => "relationships",
        }
    }

    /// Prefix of the slot columns (`text0`, `int3`, `toUuid9`, ...).
    pub fn slot_prefix(&self) -> &'static str {
        match self {
            StorageTable::Rows => "",
            StorageTable::Texts => "text",
            StorageTable::Ints => "int",
            StorageTable::Booleans => "bool",
            StorageTable::Relationships => "toUuid",
        }
    }

    /// Column of this table that holds the owning row's uuid.
    pub fn join_key(&self) -> &'static str {
        match self {
            StorageTable::Relationships => "fromUuid",
            _ => "uuid",
        }
    }
}

impl fmt::Display for StorageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage address of one logical column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalAddress {
    pub table: StorageTable,
    pub partition: i32,
    pub slot: i32,
}

impl PhysicalAddress {
    pub fn new(table: StorageTable, column_index: i32) -> Self {
        Self {
            table,
            partition: column_index.div_euclid(SLOTS_PER_PARTITION),
            slot: column_index.rem_euclid(SLOTS_PER_PARTITION),
        }
    }

    pub fn for_column(column_type: ColumnType, column_index: i32) -> Self {
        Self::new(StorageTable::for_column_type(column_type), column_index)
    }

    /// Alias shared by every column stored in the same (table, partition).
    pub fn alias(&self) -> String {
        format!("{}_{}", self.table.name(), self.partition)
    }

    /// Alias scoped to one referencing column, so that several reference
    /// columns pointing at the same grid never collide.
    pub fn scoped_alias(&self, owner_column_index: i32) -> String {
        format!("{}_{}_{}", self.table.name(), self.partition, owner_column_index)
    }

    /// Slot column name, e.g. `text3`.
    pub fn column_name(&self) -> String {
        format!("{}{}", self.table.slot_prefix(), self.slot)
    }

    /// Fully-qualified select expression under the shared alias.
    pub fn select_expr(&self) -> String {
        format!("{}.{}", self.alias(), self.column_name())
    }

    /// Fully-qualified select expression under a scoped alias.
    pub fn scoped_select_expr(&self, owner_column_index: i32) -> String {
        format!("{}.{}", self.scoped_alias(owner_column_index), self.column_name())
    }
}

/// Alias of the `rows` copy that resolves a reference column's targets.
pub fn reference_rows_alias(owner_column_index: i32) -> String {
    format!("rows_ref_{}", owner_column_index)
}
