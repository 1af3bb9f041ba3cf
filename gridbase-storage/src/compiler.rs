//! Query compiler.
//!
//! Builds the per-grid statements that read grid definitions, column
//! definitions and row data out of the fixed physical tables, and decodes
//! their result rows back into the model.
//!
//! Reference columns match zero, one or many rows of another grid. Row
//! loads fold that fan-out into a single result row per grid row with
//! `array_agg`, one aligned array for the referenced uuids and one for each
//! display column, all ordered by referenced uuid. Arrays need no delimiter
//! so display values are never split or escaped.

use crate::persistence::{CompiledQuery, QueryKind, SqlParam, SqlValue, Tuple};
use crate::sql::{Condition, Join, SelectBuilder};
use gridbase_core::catalog::{self, meta_slots};
use gridbase_core::{
    reference_rows_alias, Column, Grid, PhysicalAddress, ReferenceRow, Row, StorageError,
    StorageTable, Value,
};
use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Fields every row result carries before the column values.
const ROW_HEADER_FIELDS: usize = 2;

// ============================================================================
// COLUMN FRAGMENTS
// ============================================================================

/// Joins and select expressions needed to read one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFragments {
    pub joins: Vec<Join>,
    pub selects: Vec<String>,
    /// Whether the selects are aggregates (reference columns).
    pub aggregated: bool,
}

impl ColumnFragments {
    pub fn for_column(column: &Column) -> Self {
        let address = column.address();
        let storage_join = Join::attach(address.table, address.alias(), "rows.uuid", address.partition);

        if !column.is_reference() {
            return Self {
                joins: vec![storage_join],
                selects: vec![address.select_expr()],
                aggregated: false,
            };
        }

        let target = match &column.reference_grid {
            Some(target) => target,
            None => {
                let target_uuid = address.select_expr();
                return Self {
                    joins: vec![storage_join],
                    selects: vec![array_agg(&target_uuid, &target_uuid)],
                    aggregated: true,
                };
            }
        };

        let rows_alias = reference_rows_alias(column.column_index);
        let referenced_uuid = format!("{}.uuid", rows_alias);
        let mut joins = vec![
            storage_join,
            Join::left_outer(StorageTable::Rows, rows_alias.clone())
                .on(Condition::columns(referenced_uuid.clone(), address.select_expr()))
                .on(Condition::equals(format!("{}.gridUuid", rows_alias), target.grid_uuid))
                .on(Condition::IsTrue {
                    column: format!("{}.enabled", rows_alias),
                }),
        ];
        let mut selects = vec![array_agg(&referenced_uuid, &referenced_uuid)];

        for display_index in &target.display_column_indexes {
            let display = PhysicalAddress::new(StorageTable::Texts, *display_index);
            joins.push(Join::attach(
                StorageTable::Texts,
                display.scoped_alias(column.column_index),
                &referenced_uuid,
                display.partition,
            ));
            selects.push(array_agg(
                &display.scoped_select_expr(column.column_index),
                &referenced_uuid,
            ));
        }

        Self {
            joins,
            selects,
            aggregated: true,
        }
    }
}

fn array_agg(expr: &str, key: &str) -> String {
    format!(
        "array_agg({} ORDER BY {}) FILTER (WHERE {} IS NOT NULL)",
        expr, key, key
    )
}

fn scoped_to_grid(builder: &mut SelectBuilder, grid_uuid: Uuid) {
    builder
        .filter(Condition::equals("rows.gridUuid", grid_uuid))
        .filter(Condition::IsTrue {
            column: "rows.enabled".to_string(),
        });
}

// ============================================================================
// LOAD GRID
// ============================================================================

/// Read the row describing `grid_uuid` inside the Grids grid.
pub fn load_grid(grid_uuid: Uuid) -> CompiledQuery {
    let name = PhysicalAddress::new(StorageTable::Texts, meta_slots::GRID_NAME);
    let description = PhysicalAddress::new(StorageTable::Texts, meta_slots::GRID_DESCRIPTION);

    let mut builder = SelectBuilder::new();
    builder
        .select(name.select_expr())
        .select(description.select_expr())
        .select("rows.revision");
    builder.join(Join::attach(StorageTable::Texts, name.alias(), "rows.uuid", name.partition));
    builder.join(Join::attach(
        StorageTable::Texts,
        description.alias(),
        "rows.uuid",
        description.partition,
    ));
    scoped_to_grid(&mut builder, catalog::GRIDS);
    builder.filter(Condition::equals("rows.uuid", grid_uuid));
    builder.build(QueryKind::LoadGrid, grid_uuid)
}

/// Decode a [`load_grid`] result; columns are left empty.
pub fn decode_grid(grid_uuid: Uuid, tuple: &Tuple) -> Result<Grid, StorageError> {
    let mut grid = Grid::new(grid_uuid);
    grid.name = tuple.text(0)?;
    grid.description = tuple.text(1)?;
    grid.revision = tuple.opt_int(2)?.unwrap_or(1);
    Ok(grid)
}

// ============================================================================
// LOAD COLUMNS
// ============================================================================

const MEMBERSHIP_ALIAS: &str = "membership";
const TYPE_ALIAS: &str = "rel_type";
const REFERENCE_GRID_ALIAS: &str = "rel_ref";

/// Read the column definitions linked to `grid_uuid` through the Grids
/// membership relationship.
pub fn load_columns(grid_uuid: Uuid) -> CompiledQuery {
    let membership = PhysicalAddress::new(StorageTable::Relationships, meta_slots::GRID_COLUMNS);
    let order = PhysicalAddress::new(StorageTable::Texts, meta_slots::COLUMN_ORDER);
    let name = PhysicalAddress::new(StorageTable::Texts, meta_slots::COLUMN_NAME);
    let column_type = PhysicalAddress::new(StorageTable::Relationships, meta_slots::COLUMN_TYPE);
    let reference_grid =
        PhysicalAddress::new(StorageTable::Relationships, meta_slots::COLUMN_REFERENCE_GRID);
    let column_index = PhysicalAddress::new(StorageTable::Ints, meta_slots::COLUMN_INDEX);
    let display = PhysicalAddress::new(StorageTable::Booleans, meta_slots::COLUMN_DISPLAY);

    let type_expr = format!("{}.{}", TYPE_ALIAS, column_type.column_name());
    let reference_expr = format!("{}.{}", REFERENCE_GRID_ALIAS, reference_grid.column_name());

    let mut builder = SelectBuilder::new();
    builder
        .select("rows.uuid")
        .select(order.select_expr())
        .select(name.select_expr())
        .select(type_expr.clone())
        .select(reference_expr.clone())
        .select(column_index.select_expr())
        .select(display.select_expr());

    builder.join(
        Join::inner(StorageTable::Relationships, MEMBERSHIP_ALIAS)
            .on(Condition::columns(
                format!("{}.{}", MEMBERSHIP_ALIAS, membership.column_name()),
                "rows.uuid",
            ))
            .on(Condition::Partition {
                alias: MEMBERSHIP_ALIAS.to_string(),
                partition: membership.partition,
            })
            .on(Condition::equals(format!("{}.fromUuid", MEMBERSHIP_ALIAS), grid_uuid)),
    );
    builder.join(Join::attach(StorageTable::Texts, order.alias(), "rows.uuid", order.partition));
    builder.join(Join::attach(StorageTable::Texts, name.alias(), "rows.uuid", name.partition));
    builder.join(
        Join::attach(StorageTable::Relationships, TYPE_ALIAS, "rows.uuid", column_type.partition)
            .on(Condition::NotNull { column: type_expr }),
    );
    builder.join(
        Join::attach(
            StorageTable::Relationships,
            REFERENCE_GRID_ALIAS,
            "rows.uuid",
            reference_grid.partition,
        )
        .on(Condition::NotNull {
            column: reference_expr,
        }),
    );
    builder.join(Join::attach(
        StorageTable::Ints,
        column_index.alias(),
        "rows.uuid",
        column_index.partition,
    ));
    builder.join(Join::attach(
        StorageTable::Booleans,
        display.alias(),
        "rows.uuid",
        display.partition,
    ));
    scoped_to_grid(&mut builder, catalog::COLUMNS);
    builder.order_by(order.select_expr()).order_by("rows.uuid");
    builder.build(QueryKind::LoadColumns, grid_uuid)
}

/// Decode [`load_columns`] results, keeping the first row per column uuid.
///
/// A column without a type is stored as text.
pub fn decode_columns(tuples: &[Tuple]) -> Result<Vec<Column>, StorageError> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        let uuid = tuple.uuid(0)?;
        if !seen.insert(uuid) {
            continue;
        }
        let column_index = match tuple.opt_int(5)? {
            Some(n) => i32::try_from(n).map_err(|e| StorageError::DecodeFailed {
                field: 5,
                reason: e.to_string(),
            })?,
            None => 0,
        };
        let mut column = Column::new(
            uuid,
            tuple.text(1)?,
            tuple.text(2)?,
            tuple.opt_uuid(3)?.unwrap_or(catalog::TEXT_COLUMN_TYPE),
            column_index,
        )
        .with_display(tuple.opt_bool(6)?.unwrap_or(false));
        column.reference_grid_uuid = tuple.opt_uuid(4)?;
        columns.push(column);
    }
    Ok(columns)
}

// ============================================================================
// LOAD ROWS
// ============================================================================

/// Read every enabled row of `grid`, one value group per column.
pub fn load_rows(grid: &Grid) -> CompiledQuery {
    let mut builder = SelectBuilder::new();
    builder.select("rows.uuid").select("rows.revision");

    let mut grouped = vec!["rows.uuid".to_string(), "rows.revision".to_string()];
    let mut any_aggregate = false;
    for column in &grid.columns {
        let fragments = ColumnFragments::for_column(column);
        for join in fragments.joins {
            builder.join(join);
        }
        for select in fragments.selects {
            if !fragments.aggregated && !grouped.contains(&select) {
                grouped.push(select.clone());
            }
            builder.select(select);
        }
        any_aggregate |= fragments.aggregated;
    }

    scoped_to_grid(&mut builder, grid.uuid);
    if any_aggregate {
        for expr in grouped {
            builder.group_by(expr);
        }
    }
    builder.build(QueryKind::LoadRows, grid.uuid)
}

/// Decode [`load_rows`] results against the grid they were compiled for.
pub fn decode_rows(grid: &Grid, tuples: &[Tuple]) -> Result<Vec<Row>, StorageError> {
    tuples.iter().map(|tuple| decode_row(grid, tuple)).collect()
}

fn decode_row(grid: &Grid, tuple: &Tuple) -> Result<Row, StorageError> {
    let uuid = tuple.uuid(0)?;
    let revision = tuple.opt_int(1)?.unwrap_or(1);
    let values = grid
        .columns
        .iter()
        .map(|column| decode_value(column, tuple, ROW_HEADER_FIELDS + column.field_index))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(&grid.columns, uuid, revision, values))
}

fn decode_value(column: &Column, tuple: &Tuple, field: usize) -> Result<Value, StorageError> {
    if !column.is_reference() {
        return match tuple.get(field)? {
            SqlValue::Null => Ok(Value::Null),
            SqlValue::Text(text) => Ok(Value::Text(text.clone())),
            SqlValue::Int(n) => Ok(Value::Int(*n)),
            SqlValue::Bool(b) => Ok(Value::Bool(*b)),
            SqlValue::Uuid(uuid) => Ok(Value::Text(uuid.to_string())),
            SqlValue::TextArray(_) | SqlValue::UuidArray(_) => Err(StorageError::DecodeFailed {
                field,
                reason: format!("column {} is not a reference column", column.uuid),
            }),
        };
    }

    let uuids = tuple.uuid_array(field)?;
    let display_count = column.number_of_fields() - 1;
    let displays = (0..display_count)
        .map(|k| tuple.text_array(field + 1 + k))
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    let mut references = Vec::new();
    for (position, uuid) in uuids.into_iter().enumerate() {
        let Some(uuid) = uuid else { continue };
        // join fan-out across reference columns repeats targets
        if !seen.insert(uuid) {
            continue;
        }
        let values = displays
            .iter()
            .map(|display| display.get(position).cloned().flatten().unwrap_or_default())
            .collect();
        references.push(ReferenceRow::new(uuid, values));
    }
    Ok(Value::References(references))
}

// ============================================================================
// AUTHENTICATE
// ============================================================================

/// A Users row matched by login and password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub uuid: Uuid,
    pub login_id: String,
    pub first_name: String,
    pub last_name: String,
}

/// Look up a user by login, checking the password against its salted hash.
pub fn authenticate(login_id: &str, password: &str) -> CompiledQuery {
    let login = PhysicalAddress::new(StorageTable::Texts, meta_slots::USER_LOGIN);
    let first_name = PhysicalAddress::new(StorageTable::Texts, meta_slots::USER_FIRST_NAME);
    let last_name = PhysicalAddress::new(StorageTable::Texts, meta_slots::USER_LAST_NAME);
    let password_hash = PhysicalAddress::new(StorageTable::Texts, meta_slots::USER_PASSWORD);

    let mut builder = SelectBuilder::new();
    builder
        .select("rows.uuid")
        .select(first_name.select_expr())
        .select(last_name.select_expr());
    for address in [login, first_name, last_name, password_hash] {
        builder.join(Join::attach(
            StorageTable::Texts,
            address.alias(),
            "rows.uuid",
            address.partition,
        ));
    }
    scoped_to_grid(&mut builder, catalog::USERS);
    builder
        .filter(Condition::equals(login.select_expr(), login_id))
        .filter(Condition::CryptMatches {
            column: password_hash.select_expr(),
            value: SqlParam::from(password),
        });
    builder.build(QueryKind::Authenticate, catalog::USERS)
}

pub fn decode_user(login_id: &str, tuple: &Tuple) -> Result<UserRecord, StorageError> {
    Ok(UserRecord {
        uuid: tuple.uuid(0)?,
        login_id: login_id.to_string(),
        first_name: tuple.text(1)?,
        last_name: tuple.text(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridbase_core::catalog::{INT_COLUMN_TYPE, REFERENCE_COLUMN_TYPE, TEXT_COLUMN_TYPE};
    use gridbase_core::ReferenceTarget;
    use proptest::prelude::*;

    const PEOPLE: Uuid = Uuid::from_u128(0x100);

    fn people_grid(expanded: bool) -> Grid {
        let mut manager = Column::new(Uuid::from_u128(3), "c", "Manager", REFERENCE_COLUMN_TYPE, 2)
            .with_reference_grid(PEOPLE);
        if expanded {
            manager.reference_grid = Some(ReferenceTarget {
                grid_uuid: PEOPLE,
                display_column_indexes: vec![0],
            });
        }
        let mut grid = Grid::new(PEOPLE);
        grid.set_columns(vec![
            Column::new(Uuid::from_u128(1), "a", "FirstName", TEXT_COLUMN_TYPE, 0).with_display(true),
            Column::new(Uuid::from_u128(2), "b", "Age", INT_COLUMN_TYPE, 1),
            manager,
        ]);
        grid
    }

    #[test]
    fn test_load_grid_binds_uuid() {
        let query = load_grid(PEOPLE);
        assert_eq!(query.kind, QueryKind::LoadGrid);
        assert_eq!(query.subject, PEOPLE);
        assert_eq!(query.params, vec![SqlParam::Uuid(catalog::GRIDS), SqlParam::Uuid(PEOPLE)]);
        assert!(query.sql.contains("texts_0.text0"));
        assert!(!query.sql.contains(&PEOPLE.to_string()));
        assert_eq!(query.sql.matches("JOIN texts AS texts_0").count(), 1);
    }

    #[test]
    fn test_load_columns_statement() {
        let query = load_columns(PEOPLE);
        assert!(query.sql.contains("INNER JOIN relationships AS membership"));
        assert!(query.sql.contains("rel_type.toUuid0 IS NOT NULL"));
        assert!(query.sql.contains("rel_ref.toUuid1 IS NOT NULL"));
        assert!(query.sql.contains("ORDER BY texts_0.text0"));
        assert!(query.params.contains(&SqlParam::Uuid(PEOPLE)));
        assert!(query.params.contains(&SqlParam::Uuid(catalog::COLUMNS)));
    }

    #[test]
    fn test_expanded_reference_fragments() {
        let grid = people_grid(true);
        let fragments = ColumnFragments::for_column(&grid.columns[2]);
        let aliases: Vec<_> = fragments.joins.iter().map(|j| j.alias.as_str()).collect();
        assert_eq!(aliases, ["relationships_0", "rows_ref_2", "texts_0_2"]);
        assert_eq!(fragments.selects.len(), 2);
        assert!(fragments.aggregated);
        assert_eq!(
            fragments.selects[1],
            "array_agg(texts_0_2.text0 ORDER BY rows_ref_2.uuid) FILTER (WHERE rows_ref_2.uuid IS NOT NULL)"
        );
    }

    #[test]
    fn test_load_rows_groups_scalars_and_binds_reference_grid() {
        let grid = people_grid(true);
        let query = load_rows(&grid);
        assert!(query
            .sql
            .contains("GROUP BY rows.uuid, rows.revision, texts_0.text0, ints_0.int1"));
        assert_eq!(query.params, vec![SqlParam::Uuid(PEOPLE), SqlParam::Uuid(PEOPLE)]);
        assert!(query.sql.contains("rows_ref_2.gridUuid = $1"));
        assert!(query.sql.contains("rows.gridUuid = $2"));
    }

    #[test]
    fn test_load_rows_without_references_has_no_group_by() {
        let mut grid = Grid::new(PEOPLE);
        grid.set_columns(vec![Column::new(Uuid::from_u128(1), "a", "Name", TEXT_COLUMN_TYPE, 0)]);
        let query = load_rows(&grid);
        assert!(!query.sql.contains("GROUP BY"));
    }

    #[test]
    fn test_decode_rows_collapses_fan_out() -> Result<(), StorageError> {
        let grid = people_grid(true);
        let (bob, eve) = (Uuid::from_u128(20), Uuid::from_u128(21));
        let tuple = Tuple::new(vec![
            SqlValue::Uuid(Uuid::from_u128(10)),
            SqlValue::Int(4),
            SqlValue::Text("Ann".to_string()),
            SqlValue::Int(33),
            SqlValue::UuidArray(vec![Some(bob), Some(bob), Some(eve)]),
            SqlValue::TextArray(vec![Some("Bob".into()), Some("Bob".into()), None]),
        ]);
        let rows = decode_rows(&grid, &[tuple])?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].revision, 4);
        assert_eq!(rows[0].display_string, "Ann");
        assert_eq!(
            rows[0].values[2],
            Value::References(vec![
                ReferenceRow::new(bob, vec!["Bob".into()]),
                ReferenceRow::new(eve, vec![String::new()]),
            ])
        );
        Ok(())
    }

    #[test]
    fn test_decode_unexpanded_reference() -> Result<(), StorageError> {
        let grid = people_grid(false);
        let tuple = Tuple::new(vec![
            SqlValue::Uuid(Uuid::from_u128(10)),
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Null,
            SqlValue::Null,
        ]);
        let rows = decode_rows(&grid, &[tuple])?;
        assert_eq!(rows[0].values, vec![Value::Null, Value::Null, Value::References(vec![])]);
        Ok(())
    }

    #[test]
    fn test_decode_columns_dedups() -> Result<(), StorageError> {
        let tuple = |uuid: u128| {
            Tuple::new(vec![
                SqlValue::Uuid(Uuid::from_u128(uuid)),
                SqlValue::Text("a".into()),
                SqlValue::Text("Name".into()),
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Int(12),
                SqlValue::Bool(true),
            ])
        };
        let columns = decode_columns(&[tuple(1), tuple(1), tuple(2)])?;
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].type_uuid, TEXT_COLUMN_TYPE);
        assert_eq!(columns[0].column_index, 12);
        assert!(columns[0].display);
        Ok(())
    }

    #[test]
    fn test_authenticate_binds_credentials() {
        let query = authenticate("root", "s3cret'; --");
        assert!(!query.sql.contains("s3cret"));
        assert_eq!(
            query.params,
            vec![
                SqlParam::Uuid(catalog::USERS),
                SqlParam::Text("root".into()),
                SqlParam::Text("s3cret'; --".into()),
            ]
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Columns sharing a (table, partition) compile to one join.
        #[test]
        fn prop_shared_partition_single_join(indexes in prop::collection::vec(0i32..40, 1..10)) {
            let mut grid = Grid::new(PEOPLE);
            grid.set_columns(
                indexes
                    .iter()
                    .enumerate()
                    .map(|(i, ci)| Column::new(Uuid::new_v4(), format!("{:02}", i), "c", TEXT_COLUMN_TYPE, *ci))
                    .collect(),
            );
            let partitions: HashSet<i32> = indexes.iter().map(|ci| ci / 10).collect();
            let query = load_rows(&grid);
            prop_assert_eq!(query.sql.matches("LEFT OUTER JOIN texts").count(), partitions.len());
        }

        /// Two reference columns to the same grid never share display joins.
        #[test]
        fn prop_reference_aliases_do_not_collide(a in 0i32..30, b in 30i32..60) {
            let target = ReferenceTarget { grid_uuid: PEOPLE, display_column_indexes: vec![0, 1] };
            let mut left = Column::new(Uuid::new_v4(), "a", "L", REFERENCE_COLUMN_TYPE, a);
            let mut right = Column::new(Uuid::new_v4(), "b", "R", REFERENCE_COLUMN_TYPE, b);
            left.reference_grid = Some(target.clone());
            right.reference_grid = Some(target);
            let mut grid = Grid::new(PEOPLE);
            grid.set_columns(vec![left, right]);

            let query = load_rows(&grid);
            prop_assert_eq!(query.sql.matches(" AS rows_ref_").count(), 2);
            prop_assert_eq!(query.sql.matches("JOIN texts AS texts_0_").count(), 2);
            prop_assert_eq!(grid.number_of_fields(), 6);
        }
    }
}
