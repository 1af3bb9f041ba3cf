//! Grid, column and row model.
//!
//! A [`Grid`] owns its [`Column`] descriptors. Rows are kept apart from their
//! grid (see the service cache) and are aligned with the grid's columns.
//! A reference column never holds a pointer to the grid it targets; it keeps
//! an owned [`ReferenceTarget`] projection of the few facts the compiler
//! needs, which avoids reference cycles between cached grids.

use crate::address::{PhysicalAddress, StorageTable};
use crate::catalog::ColumnType;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Separator between the display values of a row.
pub const DISPLAY_SEPARATOR: &str = " | ";

// ============================================================================
// COLUMN
// ============================================================================

/// Display-relevant projection of a referenced grid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTarget {
    pub grid_uuid: Uuid,
    /// `columnIndex` of each display-flagged text column, in column order.
    pub display_column_indexes: Vec<i32>,
}

impl ReferenceTarget {
    /// Project a loaded grid onto the columns a reference to it displays.
    pub fn from_grid(grid: &Grid) -> Self {
        Self {
            grid_uuid: grid.uuid,
            display_column_indexes: grid
                .columns
                .iter()
                .filter(|c| c.display && c.storage_table() == StorageTable::Texts)
                .map(|c| c.column_index)
                .collect(),
        }
    }
}

/// Typed field definition of a grid, mapped onto one physical storage slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub uuid: Uuid,
    pub index: usize,
    pub field_index: usize,
    pub order: String,
    pub name: String,
    pub type_uuid: Uuid,
    pub column_index: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_grid_uuid: Option<Uuid>,
    /// Set once the referenced grid is loaded and expansion is enabled.
    #[serde(skip)]
    pub reference_grid: Option<ReferenceTarget>,
    pub display: bool,
}

impl Column {
    pub fn new(
        uuid: Uuid,
        order: impl Into<String>,
        name: impl Into<String>,
        type_uuid: Uuid,
        column_index: i32,
    ) -> Self {
        Self {
            uuid,
            index: 0,
            field_index: 0,
            order: order.into(),
            name: name.into(),
            type_uuid,
            column_index,
            reference_grid_uuid: None,
            reference_grid: None,
            display: false,
        }
    }

    pub fn with_reference_grid(mut self, grid_uuid: Uuid) -> Self {
        self.reference_grid_uuid = Some(grid_uuid);
        self
    }

    pub fn with_display(mut self, display: bool) -> Self {
        self.display = display;
        self
    }

    pub fn column_type(&self) -> ColumnType {
        ColumnType::from_uuid(self.type_uuid)
    }

    pub fn is_reference(&self) -> bool {
        self.column_type().is_reference()
    }

    pub fn storage_table(&self) -> StorageTable {
        StorageTable::for_column_type(self.column_type())
    }

    pub fn address(&self) -> PhysicalAddress {
        PhysicalAddress::for_column(self.column_type(), self.column_index)
    }

    /// Whether this reference column resolves display values of its target.
    pub fn is_expanded(&self) -> bool {
        self.is_reference() && self.reference_grid.is_some()
    }

    /// Number of physical result-set fields this column consumes.
    pub fn number_of_fields(&self) -> usize {
        match &self.reference_grid {
            Some(target) if self.is_reference() => 1 + target.display_column_indexes.len(),
            _ => 1,
        }
    }
}

// ============================================================================
// GRID
// ============================================================================

/// Logical table definition; itself a row of the built-in Grids grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub revision: i64,
    pub columns: Vec<Column>,
}

impl Grid {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: String::new(),
            description: String::new(),
            revision: 1,
            columns: Vec::new(),
        }
    }

    pub fn column(&self, column_uuid: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.uuid == column_uuid)
    }

    /// Replace all columns, sorting by order and reassigning indexes.
    pub fn set_columns(&mut self, mut columns: Vec<Column>) {
        columns.sort_by(|a, b| a.order.cmp(&b.order));
        self.columns = columns;
        self.reindex();
    }

    /// Insert a column at its sort position and return that position.
    ///
    /// Columns with an equal order keep insertion order, so a new column
    /// lands after existing ones that share its order.
    pub fn insert_column(&mut self, column: Column) -> usize {
        let position = self.columns.partition_point(|c| c.order <= column.order);
        self.columns.insert(position, column);
        self.reindex();
        position
    }

    /// Recompute `index` and `fieldIndex` of every column.
    pub fn reindex(&mut self) {
        let mut field_index = 0;
        for (index, column) in self.columns.iter_mut().enumerate() {
            column.index = index;
            column.field_index = field_index;
            field_index += column.number_of_fields();
        }
    }

    /// Total number of value fields the columns occupy in a row result.
    pub fn number_of_fields(&self) -> usize {
        self.columns.iter().map(Column::number_of_fields).sum()
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// Projection of a row of another grid embedded in a reference value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRow {
    pub uuid: Uuid,
    #[serde(skip_serializing, default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub display_string: String,
}

impl ReferenceRow {
    pub fn new(uuid: Uuid, values: Vec<String>) -> Self {
        let display_string = values.join(DISPLAY_SEPARATOR);
        Self {
            uuid,
            values,
            display_string,
        }
    }
}

/// One instance of a grid's data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub uuid: Uuid,
    pub revision: i64,
    pub values: Vec<Value>,
    pub display_string: String,
}

impl Row {
    pub fn new(columns: &[Column], uuid: Uuid, revision: i64, values: Vec<Value>) -> Self {
        let mut row = Self {
            uuid,
            revision,
            values,
            display_string: String::new(),
        };
        row.refresh_display_string(columns);
        row
    }

    /// A new row holding the type default of every column, at revision 1.
    pub fn with_defaults(columns: &[Column], uuid: Uuid) -> Self {
        let values = columns
            .iter()
            .map(|c| Value::default_for(c.column_type()))
            .collect();
        Self::new(columns, uuid, 1, values)
    }

    /// Recompute the display string from the display-flagged columns.
    pub fn refresh_display_string(&mut self, columns: &[Column]) {
        self.display_string = columns
            .iter()
            .filter(|c| c.display)
            .filter_map(|c| self.values.get(c.index))
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(DISPLAY_SEPARATOR);
    }
}
