//! GRIDBASE Storage - Persistence Contract and Query Compiler
//!
//! Grids live in a fixed set of wide physical tables (`rows`, `texts`,
//! `ints`, `booleans`, `relationships`). This crate compiles per-grid
//! parameterized statements over those tables, decodes their results into
//! the core model, and provides the PostgreSQL and in-memory backends that
//! execute them.

pub mod compiler;
pub mod mock;
pub mod persistence;
pub mod postgres;
pub mod sql;

pub use compiler::{ColumnFragments, UserRecord};
pub use mock::MockPersistence;
pub use persistence::{CompiledQuery, Persistence, QueryKind, SqlParam, SqlValue, Tuple};
pub use postgres::{DbConfig, PgPersistence};
pub use sql::{Condition, Join, JoinKind, SelectBuilder};
