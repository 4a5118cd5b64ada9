//! Dataset assembly
//!
//! Drives the per-file stages (zero fill, canonicalization, coercion,
//! source tagging, optional node expansion) and merges the results into one
//! combined table. Any failing stage aborts the whole run before anything
//! is written.

use crate::canonical::canonicalize;
use crate::cleanup::SOURCE_COLUMN;
use crate::coerce::{CoercionPolicy, TypeCoercionEngine};
use crate::error::Result;
use crate::io::{write_parquet, SnapshotReader};
use crate::models::Value;
use crate::permute::expand;
use crate::registry::TypeRegistry;
use crate::table::{Column, Table};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-run switches of the assembler
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblerOptions {
    pub policy: CoercionPolicy,
    /// Append node-permuted copies of every loaded file
    pub randomize_nodes: bool,
}

/// Shape of one loaded source after its per-file stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceShape {
    pub file: String,
    pub rows: usize,
    pub columns: usize,
}

/// Combined table plus the shapes of its inputs
#[derive(Debug, Clone)]
pub struct CombinedDataset {
    pub table: Table,
    pub sources: Vec<SourceShape>,
}

pub struct DatasetAssembler<'a, R> {
    registry: &'a TypeRegistry,
    reader: R,
    options: AssemblerOptions,
}

impl<'a, R: SnapshotReader> DatasetAssembler<'a, R> {
    pub fn new(registry: &'a TypeRegistry, reader: R, options: AssemblerOptions) -> Self {
        Self {
            registry,
            reader,
            options,
        }
    }

    fn engine(&self) -> TypeCoercionEngine<'_> {
        TypeCoercionEngine::new(self.registry, self.options.policy)
    }

    /// Run the per-file stages on an already loaded table
    pub fn prepare(&self, table: Table, source: &str) -> Result<Table> {
        let table = table.fill_null(&Value::Int(0))?;
        let table = canonicalize(table)?;
        let mut table = self.engine().apply(table)?;

        if !table.contains(SOURCE_COLUMN) {
            let tag = vec![Value::from(source); table.height()];
            table = table.with_column(Column::new(SOURCE_COLUMN, tag))?;
        }

        if self.options.randomize_nodes {
            let rows = table.height();
            table = expand(table)?;
            info!(
                source = %source,
                rows_added = table.height() - rows,
                "Expanded node permutations"
            );
        }
        Ok(table)
    }

    /// Load one snapshot file and run the per-file stages
    pub fn load_dataset(&self, path: &Path) -> Result<Table> {
        debug!(path = %path.display(), "Loading dataset");
        let raw = self.reader.read(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let table = self.prepare(raw, &source)?;
        info!(
            path = %path.display(),
            rows = table.height(),
            columns = table.width(),
            "Processed dataset"
        );
        Ok(table)
    }

    /// Merge prepared tables and re-cast the column union
    ///
    /// Columns missing from some inputs are zero filled and then cast
    /// again, so a filled boolean becomes `false`.
    pub fn combine(&self, tables: Vec<Table>) -> Result<Table> {
        let combined = Table::concat(tables)?.fill_null(&Value::Int(0))?;
        let combined = self.engine().apply(combined)?;
        info!(
            rows = combined.height(),
            columns = combined.width(),
            "Combined datasets"
        );
        Ok(combined)
    }

    /// Load every file in order and combine them
    pub fn load_and_combine(&self, paths: &[PathBuf]) -> Result<CombinedDataset> {
        info!(files = paths.len(), "Loading and combining datasets");
        let mut tables = Vec::with_capacity(paths.len());
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let table = self.load_dataset(path)?;
            sources.push(SourceShape {
                file: path.display().to_string(),
                rows: table.height(),
                columns: table.width(),
            });
            tables.push(table);
        }
        let table = self.combine(tables)?;
        Ok(CombinedDataset { table, sources })
    }
}

/// Persist the combined table as `dstdir/file_name`
pub fn write_dataset(table: &Table, dstdir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dstdir)?;
    let path = dstdir.join(file_name);
    write_parquet(table, &path)?;
    info!(
        path = %path.display(),
        rows = table.height(),
        columns = table.width(),
        "Saved dataset"
    );
    Ok(path)
}
