//! Grid and row registry.
//!
//! Arena-style maps keyed by grid uuid. A grid may be cached without its
//! rows (it was loaded as the target of a reference column); a grid's rows
//! are loaded exactly when an entry exists in `rows`.

use gridbase_core::{Grid, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Rows of one grid, in load/insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridRows {
    order: Vec<Uuid>,
    rows: HashMap<Uuid, Row>,
}

impl GridRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut grid_rows = Self::new();
        for row in rows {
            grid_rows.insert(row);
        }
        grid_rows
    }

    /// Insert a row; replacing an existing row keeps its position.
    pub fn insert(&mut self, row: Row) {
        if !self.rows.contains_key(&row.uuid) {
            self.order.push(row.uuid);
        }
        self.rows.insert(row.uuid, row);
    }

    pub fn get(&self, row_uuid: Uuid) -> Option<&Row> {
        self.rows.get(&row_uuid)
    }

    pub fn get_mut(&mut self, row_uuid: Uuid) -> Option<&mut Row> {
        self.rows.get_mut(&row_uuid)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.order.iter().filter_map(|uuid| self.rows.get(uuid))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Row> {
        self.rows.values_mut()
    }
}

/// Process-lifetime registry of loaded grids and rows.
#[derive(Debug, Default)]
pub struct GridCache {
    grids: HashMap<Uuid, Grid>,
    rows: HashMap<Uuid, GridRows>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(&self, grid_uuid: Uuid) -> Option<&Grid> {
        self.grids.get(&grid_uuid)
    }

    pub fn grid_mut(&mut self, grid_uuid: Uuid) -> Option<&mut Grid> {
        self.grids.get_mut(&grid_uuid)
    }

    pub fn contains_grid(&self, grid_uuid: Uuid) -> bool {
        self.grids.contains_key(&grid_uuid)
    }

    pub fn insert_grid(&mut self, grid: Grid) {
        self.grids.insert(grid.uuid, grid);
    }

    pub fn rows(&self, grid_uuid: Uuid) -> Option<&GridRows> {
        self.rows.get(&grid_uuid)
    }

    pub fn rows_loaded(&self, grid_uuid: Uuid) -> bool {
        self.rows.contains_key(&grid_uuid)
    }

    pub fn insert_rows(&mut self, grid_uuid: Uuid, rows: GridRows) {
        self.rows.insert(grid_uuid, rows);
    }

    /// A grid together with mutable access to its rows.
    pub fn grid_and_rows_mut(&mut self, grid_uuid: Uuid) -> Option<(&Grid, &mut GridRows)> {
        let grid = self.grids.get(&grid_uuid)?;
        let rows = self.rows.get_mut(&grid_uuid)?;
        Some((grid, rows))
    }

    /// A grid mutable together with its rows, if loaded.
    pub fn grid_mut_and_rows_mut(
        &mut self,
        grid_uuid: Uuid,
    ) -> Option<(&mut Grid, Option<&mut GridRows>)> {
        let grid = self.grids.get_mut(&grid_uuid)?;
        Some((grid, self.rows.get_mut(&grid_uuid)))
    }

    /// Drop a grid and its rows; the next access reloads them.
    pub fn invalidate(&mut self, grid_uuid: Uuid) -> bool {
        let had_grid = self.grids.remove(&grid_uuid).is_some();
        let had_rows = self.rows.remove(&grid_uuid).is_some();
        had_grid || had_rows
    }

    pub fn clear(&mut self) {
        self.grids.clear();
        self.rows.clear();
    }

    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }
}
