//! GRIDBASE Core - Grid Model and Physical Addressing
//!
//! Self-describing tabular data: grids, columns and rows whose schema is
//! itself stored as rows of built-in grids. This crate holds the catalog of
//! well-known identifiers, the in-memory model, the mapping of logical
//! columns onto fixed physical slots, and the shared error taxonomy.
//! It performs no I/O apart from reading mounted secret files.

pub mod address;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod value;

pub use address::{reference_rows_alias, PhysicalAddress, StorageTable, SLOTS_PER_PARTITION};
pub use catalog::ColumnType;
pub use error::{
    AuthError, ConfigError, GridError, GridResult, StorageError, TransportError, ValidationError,
};
pub use model::{Column, Grid, ReferenceRow, ReferenceTarget, Row, DISPLAY_SEPARATOR};
pub use value::Value;
