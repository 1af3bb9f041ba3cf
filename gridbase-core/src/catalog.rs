//! Well-known identifiers for built-in grids, meta-columns and column types.
//!
//! Schema is stored as data: grid definitions are rows of [`GRIDS`] and column
//! definitions are rows of [`COLUMNS`]. The identifiers below are seeded by the
//! persistence backend and never change, which lets the engine bootstrap the
//! self-describing metadata without circular type references.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{uuid, Uuid};

// ============================================================================
// BUILT-IN GRIDS
// ============================================================================

/// Grid whose rows define every grid (including itself).
pub const GRIDS: Uuid = uuid!("f35ef7de-66e7-4e51-9a09-6ff8667da8f7");

/// Grid whose rows define every column.
pub const COLUMNS: Uuid = uuid!("533b6862-add3-4fef-8f93-20a17aaaaf5a");

/// Grid whose rows name the available column types.
pub const COLUMN_TYPES: Uuid = uuid!("2114a6ae-013c-4bb1-be6e-3ee875ae517f");

/// Grid holding user accounts.
pub const USERS: Uuid = uuid!("018803e1-b4bf-42fa-b58f-ac5faaeeb0c2");

/// Row of [`USERS`] created at bootstrap.
pub const ROOT_USER: Uuid = uuid!("3a33485c-7683-4482-aa5d-0aa51e58d79d");

// ============================================================================
// META-COLUMNS
// ============================================================================

/// Name column of the Grids grid.
pub const GRID_COLUMN_NAME: Uuid = uuid!("e9e4a415-c31e-4383-ae70-18949d6ec692");

/// Description column of the Grids grid.
pub const GRID_COLUMN_DESC: Uuid = uuid!("bc1c489d-40c3-441c-9257-c8717be290cd");

/// Membership reference column linking a grid row to its column rows.
pub const GRID_COLUMN_COLUMNS: Uuid = uuid!("e91060d9-2887-424e-b8a1-72650cdaafb3");

pub const COLUMN_COLUMN_ORDER: Uuid = uuid!("808963d8-dced-4640-8310-00bda0c5faf4");
pub const COLUMN_COLUMN_NAME: Uuid = uuid!("a5194e16-415e-45fd-a603-b5db45d13d7d");
pub const COLUMN_COLUMN_TYPE: Uuid = uuid!("87245ad9-323a-4946-a0a7-a4082beae745");
pub const COLUMN_COLUMN_INDEX: Uuid = uuid!("b46b0ee5-f4d2-48c2-ad62-bf7d618dd8e8");
pub const COLUMN_COLUMN_REFERENCE_GRID: Uuid = uuid!("98e984b5-03e7-40f0-90d2-24304fb27bee");
pub const COLUMN_COLUMN_DISPLAY: Uuid = uuid!("d981b260-ae90-4fc5-8181-06e333063a9b");

pub const COLUMN_TYPE_COLUMN_NAME: Uuid = uuid!("9da0e49f-528c-4081-bc07-3c32497857ff");
pub const COLUMN_TYPE_COLUMN_DESC: Uuid = uuid!("5a9eba36-7601-4627-be8e-50cf027d9ad8");

pub const USER_COLUMN_ID: Uuid = uuid!("927a3228-f83d-4235-b70a-e0d3c0881598");
pub const USER_COLUMN_FIRST_NAME: Uuid = uuid!("83762777-8bd3-4f7c-a060-e7ceebfebe1c");
pub const USER_COLUMN_LAST_NAME: Uuid = uuid!("afe9d02b-0313-44d7-965f-e84a7047e047");
pub const USER_COLUMN_PASSWORD: Uuid = uuid!("51270c2c-704d-4ae7-9fdb-08fd6f0c9065");

// ============================================================================
// COLUMN TYPES
// ============================================================================

pub const TEXT_COLUMN_TYPE: Uuid = uuid!("65f3c258-fb1e-4f8b-96ca-f790e70d29c1");
pub const INT_COLUMN_TYPE: Uuid = uuid!("8c28d527-66f4-481c-902e-ac1e65a8abb0");
pub const REFERENCE_COLUMN_TYPE: Uuid = uuid!("c8b16312-d4f0-40a5-aa04-c0bc1350fea7");
pub const PASSWORD_COLUMN_TYPE: Uuid = uuid!("5f038b21-d9a4-45fc-aa3f-fc405342c287");
pub const BOOLEAN_COLUMN_TYPE: Uuid = uuid!("6e205ebd-6567-44dc-8fd4-ef6ad281ab40");
pub const UUID_COLUMN_TYPE: Uuid = uuid!("d7c004ff-da5e-4a18-9520-cd42b2847508");
pub const DATE_COLUMN_TYPE: Uuid = uuid!("28ac131f-f04b-4350-b464-3db4f8920597");

// ============================================================================
// META-GRID LAYOUT
// ============================================================================

/// Physical column indexes of the meta-columns, per storage table.
pub mod meta_slots {
    /// Grids: name is text0, description text1.
    pub const GRID_NAME: i32 = 0;
    pub const GRID_DESCRIPTION: i32 = 1;
    /// Grids: the membership reference lives in toUuid0.
    pub const GRID_COLUMNS: i32 = 0;

    /// Columns: order text0, name text1.
    pub const COLUMN_ORDER: i32 = 0;
    pub const COLUMN_NAME: i32 = 1;
    /// Columns: type is toUuid0, referenced grid toUuid1.
    pub const COLUMN_TYPE: i32 = 0;
    pub const COLUMN_REFERENCE_GRID: i32 = 1;
    /// Columns: columnIndex is int0.
    pub const COLUMN_INDEX: i32 = 0;
    /// Columns: display flag is bool0.
    pub const COLUMN_DISPLAY: i32 = 0;

    /// Users: login text0, first name text1, last name text2, password hash text3.
    pub const USER_LOGIN: i32 = 0;
    pub const USER_FIRST_NAME: i32 = 1;
    pub const USER_LAST_NAME: i32 = 2;
    pub const USER_PASSWORD: i32 = 3;
}

// ============================================================================
// COLUMN TYPE DISCRIMINATOR
// ============================================================================

/// Column type resolved from a column's `typeUuid`.
///
/// Unknown type identifiers are kept as [`ColumnType::Other`] and stored like text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Int,
    Reference,
    Password,
    Boolean,
    Uuid,
    Date,
    Other(Uuid),
}

impl ColumnType {
    /// Resolve a type identifier against the catalog.
    pub fn from_uuid(type_uuid: Uuid) -> Self {
        match type_uuid {
            TEXT_COLUMN_TYPE => ColumnType::Text,
            INT_COLUMN_TYPE => ColumnType::Int,
            REFERENCE_COLUMN_TYPE => ColumnType::Reference,
            PASSWORD_COLUMN_TYPE => ColumnType::Password,
            BOOLEAN_COLUMN_TYPE => ColumnType::Boolean,
            UUID_COLUMN_TYPE => ColumnType::Uuid,
            DATE_COLUMN_TYPE => ColumnType::Date,
            other => ColumnType::Other(other),
        }
    }

    /// The catalog identifier of this type.
    pub fn uuid(&self) -> Uuid {
        match self {
            ColumnType::Text => TEXT_COLUMN_TYPE,
            ColumnType::Int => INT_COLUMN_TYPE,
            ColumnType::Reference => REFERENCE_COLUMN_TYPE,
            ColumnType::Password => PASSWORD_COLUMN_TYPE,
            ColumnType::Boolean => BOOLEAN_COLUMN_TYPE,
            ColumnType::Uuid => UUID_COLUMN_TYPE,
            ColumnType::Date => DATE_COLUMN_TYPE,
            ColumnType::Other(uuid) => *uuid,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, ColumnType::Reference)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Other(uuid) => write!(f, "Other({})", uuid),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Human-readable name of a well-known identifier, for logs.
pub fn well_known_name(uuid: Uuid) -> Option<&'static str> {
    let name = match uuid {
        GRIDS => "Grids",
        COLUMNS => "Columns",
        COLUMN_TYPES => "ColumnTypes",
        USERS => "Users",
        ROOT_USER => "RootUser",
        GRID_COLUMN_NAME => "GridColumnName",
        GRID_COLUMN_DESC => "GridColumnDesc",
        GRID_COLUMN_COLUMNS => "GridColumnColumns",
        COLUMN_COLUMN_ORDER => "ColumnColumnOrder",
        COLUMN_COLUMN_NAME => "ColumnColumnName",
        COLUMN_COLUMN_TYPE => "ColumnColumnColumnType",
        COLUMN_COLUMN_INDEX => "ColumnColumnIndex",
        COLUMN_COLUMN_REFERENCE_GRID => "ColumnColumnReferenceGrid",
        COLUMN_COLUMN_DISPLAY => "ColumnColumnDisplay",
        TEXT_COLUMN_TYPE => "TextColumnType",
        INT_COLUMN_TYPE => "IntColumnType",
        REFERENCE_COLUMN_TYPE => "ReferenceColumnType",
        PASSWORD_COLUMN_TYPE => "PasswordColumnType",
        BOOLEAN_COLUMN_TYPE => "BooleanColumnType",
        UUID_COLUMN_TYPE => "UuidColumnType",
        DATE_COLUMN_TYPE => "DateColumnType",
        _ => return None,
    };
    Some(name)
}
