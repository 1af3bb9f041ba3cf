//! Grid engine: lazy loading and in-memory mutations.
//!
//! The engine owns the [`GridCache`] and the persistence handle and is
//! driven from a single processing path, so it takes `&mut self` and needs
//! no locking. Grids are loaded on first use; later loads are served from
//! the cache without touching storage.
//!
//! Mutations apply to the cache only. They are a staging layer: nothing is
//! written back to storage and row revisions are left unchanged.

use crate::cache::{GridCache, GridRows};
use crate::change::{Operation, ReferencePayload};
use gridbase_core::catalog::{self, ColumnType};
use gridbase_core::{
    Column, Grid, GridError, GridResult, ReferenceRow, ReferenceTarget, Row, ValidationError,
    Value,
};
use gridbase_storage::{compiler, Persistence};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a successfully applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every operation was applied.
    Applied { count: usize },
    /// A load operation ended the batch early.
    Loaded { grid_uuid: Uuid },
}

pub struct GridEngine {
    persistence: Arc<dyn Persistence>,
    cache: GridCache,
}

impl GridEngine {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            cache: GridCache::new(),
        }
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    pub fn cache(&self) -> &GridCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut GridCache {
        &mut self.cache
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Read a grid definition and its columns from storage.
    async fn fetch_grid(&self, grid_uuid: Uuid) -> GridResult<Option<Grid>> {
        let tuple = match self
            .persistence
            .select_one(&compiler::load_grid(grid_uuid))
            .await?
        {
            Some(tuple) => tuple,
            None => return Ok(None),
        };
        let mut grid = compiler::decode_grid(grid_uuid, &tuple)?;

        let tuples = self
            .persistence
            .select_all(&compiler::load_columns(grid_uuid))
            .await?;
        grid.set_columns(compiler::decode_columns(&tuples)?);

        info!(
            grid_uuid = %grid_uuid,
            name = %grid.name,
            built_in = catalog::well_known_name(grid_uuid).unwrap_or("-"),
            columns = grid.columns.len(),
            "Grid loaded"
        );
        Ok(Some(grid))
    }

    /// Cache a grid definition without expanding its references.
    ///
    /// Returns `false` when the grid does not exist.
    async fn ensure_grid(&mut self, grid_uuid: Uuid) -> GridResult<bool> {
        if self.cache.contains_grid(grid_uuid) {
            debug!(grid_uuid = %grid_uuid, "Grid already in memory");
            return Ok(true);
        }
        match self.fetch_grid(grid_uuid).await? {
            Some(grid) => {
                self.cache.insert_grid(grid);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Resolve the targets of a grid's unexpanded reference columns.
    ///
    /// Referenced grids are cached as plain definitions, one level deep, so
    /// mutually referencing grids terminate.
    async fn expand_references(&mut self, grid_uuid: Uuid) -> GridResult<()> {
        let pending: Vec<(usize, Uuid)> = match self.cache.grid(grid_uuid) {
            Some(grid) => grid
                .columns
                .iter()
                .filter(|c| c.is_reference() && c.reference_grid.is_none())
                .filter_map(|c| c.reference_grid_uuid.map(|target| (c.index, target)))
                .collect(),
            None => return Ok(()),
        };
        if pending.is_empty() {
            return Ok(());
        }

        let mut targets = Vec::with_capacity(pending.len());
        for (index, target_uuid) in pending {
            if !self.ensure_grid(target_uuid).await? {
                warn!(
                    grid_uuid = %grid_uuid,
                    reference_grid_uuid = %target_uuid,
                    "Referenced grid not found, column left unexpanded"
                );
                continue;
            }
            if let Some(target) = self.cache.grid(target_uuid) {
                targets.push((index, ReferenceTarget::from_grid(target)));
            }
        }

        if let Some(grid) = self.cache.grid_mut(grid_uuid) {
            for (index, target) in targets {
                if let Some(column) = grid.columns.get_mut(index) {
                    column.reference_grid = Some(target);
                }
            }
            grid.reindex();
        }
        Ok(())
    }

    async fn ensure_rows(&mut self, grid_uuid: Uuid) -> GridResult<()> {
        if self.cache.rows_loaded(grid_uuid) {
            return Ok(());
        }
        self.expand_references(grid_uuid).await?;

        let query = match self.cache.grid(grid_uuid) {
            Some(grid) => compiler::load_rows(grid),
            None => return Err(ValidationError::GridNotFound { grid_uuid }.into()),
        };
        let tuples = self.persistence.select_all(&query).await?;

        let grid = self
            .cache
            .grid(grid_uuid)
            .ok_or(ValidationError::GridNotFound { grid_uuid })?;
        let rows = compiler::decode_rows(grid, &tuples)?;
        info!(grid_uuid = %grid_uuid, rows = rows.len(), "Rows loaded");
        self.cache.insert_rows(grid_uuid, GridRows::from_rows(rows));
        Ok(())
    }

    /// Make a grid and its rows available in the cache.
    async fn resolve(&mut self, grid_uuid: Uuid) -> GridResult<()> {
        if !self.ensure_grid(grid_uuid).await? {
            warn!(grid_uuid = %grid_uuid, "Grid not found");
            return Err(ValidationError::GridNotFound { grid_uuid }.into());
        }
        self.ensure_rows(grid_uuid).await
    }

    /// Load a grid with its rows, from the cache when already loaded.
    pub async fn load(&mut self, grid_uuid: Uuid) -> GridResult<(&Grid, &GridRows)> {
        self.resolve(grid_uuid).await?;
        let not_found = || GridError::from(ValidationError::GridNotFound { grid_uuid });
        let grid = self.cache.grid(grid_uuid).ok_or_else(not_found)?;
        let rows = self.cache.rows(grid_uuid).ok_or_else(not_found)?;
        Ok((grid, rows))
    }

    /// Drop a grid from the cache and load it again from storage.
    pub async fn reload(&mut self, grid_uuid: Uuid) -> GridResult<(&Grid, &GridRows)> {
        if self.cache.invalidate(grid_uuid) {
            debug!(grid_uuid = %grid_uuid, "Grid invalidated");
        }
        self.load(grid_uuid).await
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Apply a batch of operations in order.
    ///
    /// The first failure aborts the rest of the batch; operations already
    /// applied stay applied. A load operation ends the batch.
    pub async fn apply(&mut self, operations: Vec<Operation>) -> GridResult<BatchOutcome> {
        let mut count = 0;
        for operation in operations {
            let name = operation.name();
            let grid_uuid = operation.grid_uuid();
            debug!(operation = name, grid_uuid = %grid_uuid, "Applying change");

            let loads = matches!(operation, Operation::Load { .. });
            let result = match operation {
                Operation::Load { grid_uuid } => self.resolve(grid_uuid).await,
                Operation::Add { grid_uuid, row_uuid } => self.add_row(grid_uuid, row_uuid).await,
                Operation::Update {
                    grid_uuid,
                    column_uuid,
                    row_uuid,
                    value,
                } => self.update_row(grid_uuid, column_uuid, row_uuid, &value).await,
                Operation::AddRelationship {
                    grid_uuid,
                    column_uuid,
                    row_uuid,
                    reference,
                } => {
                    self.add_relationship(grid_uuid, column_uuid, row_uuid, reference)
                        .await
                }
                Operation::RemoveRelationship {
                    grid_uuid,
                    column_uuid,
                    row_uuid,
                    reference_uuid,
                } => {
                    self.remove_relationship(grid_uuid, column_uuid, row_uuid, reference_uuid)
                        .await
                }
            };
            if let Err(err) = &result {
                warn!(operation = name, grid_uuid = %grid_uuid, error = %err, "Change rejected");
            }
            result?;
            if loads {
                return Ok(BatchOutcome::Loaded { grid_uuid });
            }
            count += 1;
        }
        Ok(BatchOutcome::Applied { count })
    }

    /// Resolve a grid and a reference column of it.
    fn reference_column(grid: &Grid, column_uuid: Uuid) -> Result<&Column, ValidationError> {
        let column = grid.column(column_uuid).ok_or(ValidationError::ColumnNotFound {
            grid_uuid: grid.uuid,
            column_uuid,
        })?;
        if !column.is_reference() {
            return Err(ValidationError::NotAReferenceColumn { column_uuid });
        }
        Ok(column)
    }

    fn loaded<'a>(
        cache: &'a mut GridCache,
        grid_uuid: Uuid,
    ) -> Result<(&'a Grid, &'a mut GridRows), ValidationError> {
        cache
            .grid_and_rows_mut(grid_uuid)
            .ok_or(ValidationError::GridNotFound { grid_uuid })
    }

    async fn add_row(&mut self, grid_uuid: Uuid, row_uuid: Uuid) -> GridResult<()> {
        self.resolve(grid_uuid).await?;
        let (grid, rows) = Self::loaded(&mut self.cache, grid_uuid)?;
        if rows.get(row_uuid).is_some() {
            return Err(ValidationError::RowAlreadyExists { grid_uuid, row_uuid }.into());
        }
        let row = Row::with_defaults(&grid.columns, row_uuid);
        rows.insert(row);
        info!(grid_uuid = %grid_uuid, row_uuid = %row_uuid, "Row added");

        // a row of Grids is a grid definition
        if grid_uuid == catalog::GRIDS && !self.cache.contains_grid(row_uuid) {
            self.cache.insert_grid(Grid::new(row_uuid));
            self.cache.insert_rows(row_uuid, GridRows::new());
            info!(grid_uuid = %row_uuid, "New grid added to memory");
        }
        Ok(())
    }

    async fn update_row(
        &mut self,
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        raw: &serde_json::Value,
    ) -> GridResult<()> {
        self.resolve(grid_uuid).await?;
        let value = {
            let (grid, rows) = Self::loaded(&mut self.cache, grid_uuid)?;
            let column = grid.column(column_uuid).ok_or(ValidationError::ColumnNotFound {
                grid_uuid,
                column_uuid,
            })?;
            if column.is_reference() {
                return Err(ValidationError::ReferenceColumnNotUpdatable { column_uuid }.into());
            }
            let row = rows
                .get_mut(row_uuid)
                .ok_or(ValidationError::RowNotFound { grid_uuid, row_uuid })?;
            let value = Value::coerce(column.column_type(), raw)?;
            let slot = row
                .values
                .get_mut(column.index)
                .ok_or_else(|| ValidationError::invalid("row", "row is not aligned with its columns"))?;
            *slot = value.clone();
            row.refresh_display_string(&grid.columns);
            debug!(row_uuid = %row_uuid, display = %row.display_string, "Row updated");
            value
        };

        if grid_uuid == catalog::GRIDS {
            if let Some(defined) = self.cache.grid_mut(row_uuid) {
                match column_uuid {
                    catalog::GRID_COLUMN_NAME => defined.name = value.to_string(),
                    catalog::GRID_COLUMN_DESC => defined.description = value.to_string(),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    async fn add_relationship(
        &mut self,
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        reference: ReferencePayload,
    ) -> GridResult<()> {
        self.resolve(grid_uuid).await?;
        let reference_uuid = reference.uuid;
        {
            let (grid, rows) = Self::loaded(&mut self.cache, grid_uuid)?;
            let column = Self::reference_column(grid, column_uuid)?;
            let row = rows
                .get_mut(row_uuid)
                .ok_or(ValidationError::RowNotFound { grid_uuid, row_uuid })?;
            let slot = row
                .values
                .get_mut(column.index)
                .ok_or_else(|| ValidationError::invalid("row", "row is not aligned with its columns"))?;
            if slot.as_references().is_none() {
                *slot = Value::References(Vec::new());
            }
            if let Some(references) = slot.as_references_mut() {
                references.push(ReferenceRow::new(reference.uuid, reference.values));
            }
            row.refresh_display_string(&grid.columns);
            debug!(row_uuid = %row_uuid, reference_uuid = %reference_uuid, "Relationship added");
        }

        if grid_uuid == catalog::GRIDS && column_uuid == catalog::GRID_COLUMN_COLUMNS {
            self.attach_column(row_uuid, reference_uuid).await?;
        }
        Ok(())
    }

    async fn remove_relationship(
        &mut self,
        grid_uuid: Uuid,
        column_uuid: Uuid,
        row_uuid: Uuid,
        reference_uuid: Uuid,
    ) -> GridResult<()> {
        self.resolve(grid_uuid).await?;
        let (grid, rows) = Self::loaded(&mut self.cache, grid_uuid)?;
        let column = Self::reference_column(grid, column_uuid)?;
        let row = rows
            .get_mut(row_uuid)
            .ok_or(ValidationError::RowNotFound { grid_uuid, row_uuid })?;

        let removed = match row.values.get_mut(column.index).and_then(Value::as_references_mut) {
            Some(references) => match references.iter().position(|r| r.uuid == reference_uuid) {
                Some(position) => {
                    references.remove(position);
                    true
                }
                None => false,
            },
            None => false,
        };
        if removed {
            row.refresh_display_string(&grid.columns);
        }
        debug!(row_uuid = %row_uuid, reference_uuid = %reference_uuid, removed, "Relationship removed");
        Ok(())
    }

    // ========================================================================
    // STRUCTURAL MIRROR
    // ========================================================================

    /// Insert the column defined by a Columns row into a cached grid at its
    /// sort position, as a reload would show it.
    async fn attach_column(&mut self, grid_uuid: Uuid, column_row_uuid: Uuid) -> GridResult<()> {
        if !self.cache.contains_grid(grid_uuid) {
            debug!(grid_uuid = %grid_uuid, "Grid not in memory, column not mirrored");
            return Ok(());
        }
        self.resolve(catalog::COLUMNS).await?;
        let column = match self.column_definition(column_row_uuid) {
            Some(column) => column,
            None => {
                warn!(column_uuid = %column_row_uuid, "Column definition not found, column not mirrored");
                return Ok(());
            }
        };

        let Some((grid, rows)) = self.cache.grid_mut_and_rows_mut(grid_uuid) else {
            return Ok(());
        };
        if grid.column(column.uuid).is_some() {
            return Ok(());
        }
        let column_type = column.column_type();
        let position = grid.insert_column(column);
        if let Some(rows) = rows {
            for row in rows.iter_mut() {
                let at = position.min(row.values.len());
                row.values.insert(at, Value::default_for(column_type));
                row.refresh_display_string(&grid.columns);
            }
        }
        info!(
            grid_uuid = %grid_uuid,
            column_uuid = %column_row_uuid,
            position,
            "Column added to grid"
        );
        Ok(())
    }

    /// Build a column descriptor from a cached row of the Columns grid.
    fn column_definition(&self, column_row_uuid: Uuid) -> Option<Column> {
        let columns_grid = self.cache.grid(catalog::COLUMNS)?;
        let row = self.cache.rows(catalog::COLUMNS)?.get(column_row_uuid)?;

        let value_of = |meta: Uuid| {
            columns_grid
                .column(meta)
                .and_then(|column| row.values.get(column.index))
        };
        let text = |meta: Uuid| value_of(meta).map(Value::to_string).unwrap_or_default();
        let first_reference = |meta: Uuid| {
            value_of(meta)
                .and_then(Value::as_references)
                .and_then(|references| references.first())
                .map(|reference| reference.uuid)
        };

        let column_index = match value_of(catalog::COLUMN_COLUMN_INDEX) {
            Some(Value::Int(n)) => i32::try_from(*n).ok()?,
            Some(Value::Text(s)) if !s.is_empty() => s.trim().parse().ok()?,
            _ => 0,
        };
        let display = matches!(value_of(catalog::COLUMN_COLUMN_DISPLAY), Some(Value::Bool(true)));
        let type_uuid = first_reference(catalog::COLUMN_COLUMN_TYPE)
            .unwrap_or(ColumnType::Text.uuid());

        let mut column = Column::new(
            column_row_uuid,
            text(catalog::COLUMN_COLUMN_ORDER),
            text(catalog::COLUMN_COLUMN_NAME),
            type_uuid,
            column_index,
        )
        .with_display(display);
        column.reference_grid_uuid = first_reference(catalog::COLUMN_COLUMN_REFERENCE_GRID);
        Some(column)
    }
}
