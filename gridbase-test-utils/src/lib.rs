//! GRIDBASE Test Utilities
//!
//! Shared test infrastructure for the gridbase workspace:
//! - Grid fixtures that seed [`MockPersistence`] with results laid out the
//!   way the query compiler reads them
//! - The built-in Grids/Columns meta-grids and the Users scenario
//! - Proptest generators for columns and values
//! - Custom assertions

pub use gridbase_storage::MockPersistence;

pub use gridbase_core::{
    catalog, Column, ColumnType, Grid, GridError, GridResult, ReferenceRow, Row, StorageError,
    ValidationError, Value,
};
pub use gridbase_storage::{QueryKind, SqlValue, Tuple};

use uuid::Uuid;

// ============================================================================
// GRID FIXTURES
// ============================================================================

/// One grid as stored: its Grids row, its Columns rows and its data rows.
///
/// Row fields follow the load-rows layout: every scalar column takes one
/// field, every reference column takes its uuid array followed by one text
/// array per display column of the referenced grid.
#[derive(Debug, Clone)]
pub struct GridFixture {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub revision: i64,
    pub columns: Vec<Column>,
    pub rows: Vec<(Uuid, i64, Vec<SqlValue>)>,
}

impl GridFixture {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            description: String::new(),
            revision: 1,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row(mut self, uuid: Uuid, fields: Vec<SqlValue>) -> Self {
        self.rows.push((uuid, 1, fields));
        self
    }

    /// Result of the load-grid statement.
    pub fn grid_tuple(&self) -> Tuple {
        Tuple::new(vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.description.clone()),
            SqlValue::Int(self.revision),
        ])
    }

    /// Results of the load-columns statement.
    pub fn column_tuples(&self) -> Vec<Tuple> {
        self.columns.iter().map(column_tuple).collect()
    }

    /// Results of the load-rows statement.
    pub fn row_tuples(&self) -> Vec<Tuple> {
        self.rows
            .iter()
            .map(|(uuid, revision, fields)| {
                let mut values = vec![SqlValue::Uuid(*uuid), SqlValue::Int(*revision)];
                values.extend(fields.iter().cloned());
                Tuple::new(values)
            })
            .collect()
    }

    /// Register every statement result of this grid with the mock.
    pub fn seed(&self, mock: &MockPersistence) {
        mock.set_result(QueryKind::LoadGrid, self.uuid, vec![self.grid_tuple()]);
        mock.set_result(QueryKind::LoadColumns, self.uuid, self.column_tuples());
        mock.set_result(QueryKind::LoadRows, self.uuid, self.row_tuples());
    }
}

/// A column definition as returned by the load-columns statement.
pub fn column_tuple(column: &Column) -> Tuple {
    Tuple::new(vec![
        SqlValue::Uuid(column.uuid),
        SqlValue::Text(column.order.clone()),
        SqlValue::Text(column.name.clone()),
        SqlValue::Uuid(column.type_uuid),
        column
            .reference_grid_uuid
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null),
        SqlValue::Int(i64::from(column.column_index)),
        SqlValue::Bool(column.display),
    ])
}

pub fn text(value: &str) -> SqlValue {
    SqlValue::Text(value.to_string())
}

pub fn int(value: i64) -> SqlValue {
    SqlValue::Int(value)
}

pub fn boolean(value: bool) -> SqlValue {
    SqlValue::Bool(value)
}

/// Fields of one reference column: the uuid array, then one aligned text
/// array per display column.
pub fn references(targets: &[(Uuid, Vec<&str>)], display_count: usize) -> Vec<SqlValue> {
    let mut fields = vec![SqlValue::UuidArray(
        targets.iter().map(|(uuid, _)| Some(*uuid)).collect(),
    )];
    for k in 0..display_count {
        fields.push(SqlValue::TextArray(
            targets
                .iter()
                .map(|(_, values)| values.get(k).map(|v| v.to_string()))
                .collect(),
        ));
    }
    fields
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made grids.

    use super::*;

    /// The Users scenario: `FirstName` (text, display), `Age` (int) and
    /// `Manager` (reference to Users itself).
    pub mod users {
        use super::*;

        pub const GRID: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0001);
        pub const FIRST_NAME: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0011);
        pub const AGE: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0012);
        pub const MANAGER: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0013);

        /// Existing row "Bob".
        pub const BOB: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0101);
        /// Existing row "Carol", managed by Bob.
        pub const CAROL: Uuid = Uuid::from_u128(0x7573_6572_7300_0000_0000_0000_0000_0102);

        pub fn columns() -> Vec<Column> {
            vec![
                Column::new(FIRST_NAME, "a", "FirstName", catalog::TEXT_COLUMN_TYPE, 0)
                    .with_display(true),
                Column::new(AGE, "b", "Age", catalog::INT_COLUMN_TYPE, 1),
                Column::new(MANAGER, "c", "Manager", catalog::REFERENCE_COLUMN_TYPE, 2)
                    .with_reference_grid(GRID),
            ]
        }

        pub fn grid() -> GridFixture {
            let fixture = GridFixture::new(GRID, "Users").description("People and who they report to");
            columns()
                .into_iter()
                .fold(fixture, |fixture, column| fixture.column(column))
                .row(
                    BOB,
                    [vec![text("Bob"), int(52)], references(&[], 1)].concat(),
                )
                .row(
                    CAROL,
                    [
                        vec![text("Carol"), int(38)],
                        references(&[(BOB, vec!["Bob"])], 1),
                    ]
                    .concat(),
                )
        }
    }

    /// The built-in Grids and Columns meta-grids, describing the Users grid.
    pub mod meta {
        use super::*;

        /// Columns row of a text column not yet attached to any grid.
        pub const EMAIL_COLUMN: Uuid = Uuid::from_u128(0x6d65_7461_0000_0000_0000_0000_0000_0001);

        pub fn grids() -> GridFixture {
            GridFixture::new(catalog::GRIDS, "Grids")
                .column(
                    Column::new(catalog::GRID_COLUMN_NAME, "a", "Name", catalog::TEXT_COLUMN_TYPE, 0)
                        .with_display(true),
                )
                .column(Column::new(
                    catalog::GRID_COLUMN_DESC,
                    "b",
                    "Description",
                    catalog::TEXT_COLUMN_TYPE,
                    1,
                ))
                .column(
                    Column::new(
                        catalog::GRID_COLUMN_COLUMNS,
                        "c",
                        "Columns",
                        catalog::REFERENCE_COLUMN_TYPE,
                        0,
                    )
                    .with_reference_grid(catalog::COLUMNS),
                )
                .row(
                    users::GRID,
                    [
                        vec![text("Users"), text("People and who they report to")],
                        references(
                            &[
                                (users::FIRST_NAME, vec!["FirstName"]),
                                (users::AGE, vec!["Age"]),
                                (users::MANAGER, vec!["Manager"]),
                            ],
                            1,
                        ),
                    ]
                    .concat(),
                )
        }

        /// Columns grid. `Type` stays unexpanded because ColumnTypes is not
        /// seeded; `ReferenceGrid` expands against Grids (one display column).
        pub fn columns() -> GridFixture {
            let column_row = |uuid: Uuid, order: &str, name: &str, column_type: ColumnType, index: i64, display: bool| {
                (
                    uuid,
                    1,
                    [
                        vec![text(order), text(name)],
                        vec![SqlValue::UuidArray(vec![Some(column_type.uuid())])],
                        references(&[], 1),
                        vec![int(index), boolean(display)],
                    ]
                    .concat(),
                )
            };

            let mut fixture = GridFixture::new(catalog::COLUMNS, "Columns")
                .column(Column::new(catalog::COLUMN_COLUMN_ORDER, "a", "Order", catalog::TEXT_COLUMN_TYPE, 0))
                .column(
                    Column::new(catalog::COLUMN_COLUMN_NAME, "b", "Name", catalog::TEXT_COLUMN_TYPE, 1)
                        .with_display(true),
                )
                .column(
                    Column::new(catalog::COLUMN_COLUMN_TYPE, "c", "Type", catalog::REFERENCE_COLUMN_TYPE, 0)
                        .with_reference_grid(catalog::COLUMN_TYPES),
                )
                .column(
                    Column::new(
                        catalog::COLUMN_COLUMN_REFERENCE_GRID,
                        "d",
                        "ReferenceGrid",
                        catalog::REFERENCE_COLUMN_TYPE,
                        1,
                    )
                    .with_reference_grid(catalog::GRIDS),
                )
                .column(Column::new(catalog::COLUMN_COLUMN_INDEX, "e", "Index", catalog::INT_COLUMN_TYPE, 0))
                .column(Column::new(
                    catalog::COLUMN_COLUMN_DISPLAY,
                    "f",
                    "Display",
                    catalog::BOOLEAN_COLUMN_TYPE,
                    0,
                ));
            fixture.rows = vec![
                column_row(users::FIRST_NAME, "a", "FirstName", ColumnType::Text, 0, true),
                column_row(users::AGE, "b", "Age", ColumnType::Int, 1, false),
                column_row(EMAIL_COLUMN, "d", "Email", ColumnType::Text, 3, false),
            ];
            fixture
        }
    }

    /// Seed the Users scenario and the meta-grids into a fresh mock.
    pub fn seeded_mock() -> MockPersistence {
        let mock = MockPersistence::new();
        users::grid().seed(&mock);
        meta::grids().seed(&mock);
        meta::columns().seed(&mock);
        mock
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for gridbase model types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_column_type() -> impl Strategy<Value = ColumnType> {
        prop_oneof![
            Just(ColumnType::Text),
            Just(ColumnType::Int),
            Just(ColumnType::Reference),
            Just(ColumnType::Password),
            Just(ColumnType::Boolean),
            Just(ColumnType::Uuid),
            Just(ColumnType::Date),
        ]
    }

    pub fn arb_column_index() -> impl Strategy<Value = i32> {
        0i32..100
    }

    /// A column with a distinct order key derived from `position`.
    pub fn arb_column(position: usize) -> impl Strategy<Value = Column> {
        (arb_uuid(), arb_column_type(), arb_column_index(), any::<bool>(), arb_uuid()).prop_map(
            move |(uuid, column_type, column_index, display, target)| {
                let column = Column::new(
                    uuid,
                    format!("{:04}", position),
                    format!("column{}", position),
                    column_type.uuid(),
                    column_index,
                )
                .with_display(display);
                if column_type.is_reference() {
                    column.with_reference_grid(target)
                } else {
                    column
                }
            },
        )
    }

    /// Between 1 and `max` columns, in shuffled order.
    pub fn arb_columns(max: usize) -> impl Strategy<Value = Vec<Column>> {
        (1..=max.max(1))
            .prop_flat_map(|n| (0..n).map(arb_column).collect::<Vec<_>>())
            .prop_shuffle()
    }

    /// A JSON change value accepted by text columns.
    pub fn arb_text_change() -> impl Strategy<Value = serde_json::Value> {
        "[a-zA-Z0-9 ]{0,24}".prop_map(serde_json::Value::String)
    }

    /// Reference targets with one display value each.
    pub fn arb_reference_targets(max: usize) -> impl Strategy<Value = Vec<(Uuid, String)>> {
        prop::collection::vec((arb_uuid(), "[A-Z][a-z]{1,8}"), 0..=max)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for gridbase invariants.

    use super::*;

    /// `columns[i].index == i` and field indexes advance by each column's
    /// field count.
    pub fn assert_grid_indexed(grid: &Grid) {
        let mut expected_field = 0;
        for (i, column) in grid.columns.iter().enumerate() {
            assert_eq!(column.index, i, "column {} has index {}", column.name, column.index);
            assert_eq!(
                column.field_index, expected_field,
                "column {} has field index {}",
                column.name, column.field_index
            );
            expected_field += column.number_of_fields();
        }
    }

    /// A row carries one value per column of its grid.
    pub fn assert_row_aligned(grid: &Grid, row: &Row) {
        assert_eq!(
            row.values.len(),
            grid.columns.len(),
            "row {} is not aligned with grid {}",
            row.uuid,
            grid.uuid
        );
    }

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &GridResult<T>) {
        assert!(
            matches!(result, Err(GridError::Validation(_))),
            "expected a validation error, got {:?}",
            result
        );
    }

    /// Uuids of the references held by a value, in order.
    pub fn reference_uuids(value: &Value) -> Vec<Uuid> {
        value
            .as_references()
            .map(|references| references.iter().map(|r| r.uuid).collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// TESTS
// ============================================================================
