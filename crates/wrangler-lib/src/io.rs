//! Parquet snapshot I/O
//!
//! Collection runs are stored as parquet files (typically written by
//! pandas/pyarrow). Reading keeps the stored arrow arrays as they are;
//! writing casts each column to the storage type of its resolved semantic
//! type and compresses with snappy.

use crate::coerce::arrow_type;
use crate::error::{Result, WrangleError};
use crate::table::{Column, Table};
use arrow::array::ArrayRef;
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Prefix of the index columns pandas stores alongside the data
const PANDAS_INDEX_PREFIX: &str = "__index_level_";

/// Source of raw snapshot tables
pub trait SnapshotReader {
    /// Load one snapshot file as a table
    fn read(&self, path: &Path) -> Result<Table>;
}

/// Reads parquet snapshot files
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetReader;

impl SnapshotReader for ParquetReader {
    fn read(&self, path: &Path) -> Result<Table> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<std::result::Result<Vec<_>, _>>()?;
        let batch = concat_batches(&schema, &batches)?;

        let mut columns = Vec::with_capacity(schema.fields().len());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            if field.name().starts_with(PANDAS_INDEX_PREFIX) {
                continue;
            }
            if field.data_type().is_nested() {
                return Err(WrangleError::UnsupportedArrowType {
                    column: field.name().clone(),
                    data_type: field.data_type().to_string(),
                });
            }
            columns.push(Column::from_array(field.name().clone(), array.clone()));
        }

        let table = Table::from_columns(columns)?;
        debug!(
            path = %path.display(),
            rows = table.height(),
            columns = table.width(),
            "Read parquet file"
        );
        Ok(table)
    }
}

/// Storage type written for a column
///
/// Typed columns use their semantic type; untyped columns keep their arrow
/// type, except all-null columns which are written as text.
fn storage_type(column: &Column) -> DataType {
    match (column.dtype, column.array.data_type()) {
        (Some(dtype), _) => arrow_type(dtype),
        (None, DataType::Null) => DataType::Utf8,
        (None, data_type) => data_type.clone(),
    }
}

fn column_to_arrow(column: &Column) -> Result<(Field, ArrayRef)> {
    let data_type = storage_type(column);
    let array = if column.array.data_type() == &data_type {
        column.array.clone()
    } else {
        cast(&column.array, &data_type)?
    };
    Ok((Field::new(column.name.clone(), data_type, true), array))
}

/// Write a table as a snappy-compressed parquet file
pub fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) = table
        .columns()
        .iter()
        .map(column_to_arrow)
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .unzip();

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(table.height()));
    let batch = RecordBatch::try_new_with_options(schema.clone(), arrays, &options)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    debug!(
        path = %path.display(),
        rows = table.height(),
        columns = table.width(),
        "Wrote parquet file"
    );
    Ok(())
}
