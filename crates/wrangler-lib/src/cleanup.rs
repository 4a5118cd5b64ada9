//! Post-assembly cleanup of the combined dataset

use crate::error::Result;
use crate::table::{Column, Table};
use arrow::array::StringArray;
use arrow::compute::cast;
use tracing::{debug, info};

/// Name fragments of transient, derived and raw block-device columns
pub const TRANSIENT_COLUMN_MARKERS: [&str; 13] = [
    "yy", "total_y_", "run_id", "_vda", "_vdb", "_sda", "_sdb", "_sr1", "_sr0", "_attach",
    "_nvme", "_version", "_master",
];

/// Column carrying the collection-run tag of each row
pub const SOURCE_COLUMN: &str = "source";

fn is_transient(column: &str) -> bool {
    TRANSIENT_COLUMN_MARKERS
        .iter()
        .any(|marker| column.contains(marker))
}

/// Drop transient columns, then duplicate rows
pub fn clean(table: Table) -> Result<Table> {
    let (rows, columns) = table.shape();
    let table = table.drop_columns_where(is_transient).dedup_rows()?;
    info!(
        dropped_columns = columns - table.width(),
        dropped_rows = rows - table.height(),
        rows = table.height(),
        columns = table.width(),
        "Cleaned combined dataset"
    );
    Ok(table)
}

/// Collapse a source tag onto its cluster topology family
pub fn source_family(tag: &str) -> Option<&'static str> {
    let lower = tag.to_lowercase();
    if lower.contains("compact") || lower.contains("promql") {
        Some("compact")
    } else if lower.contains("mno") {
        Some("mno")
    } else {
        None
    }
}

/// Rewrite the `source` column to topology families; other tags are kept
pub fn normalize_sources(table: Table) -> Result<Table> {
    let Some(column) = table.column(SOURCE_COLUMN) else {
        debug!("No source column, skipping source normalization");
        return Ok(table);
    };

    let tags: StringArray = column
        .to_text()?
        .iter()
        .map(|tag| tag.map(|tag| source_family(tag).unwrap_or(tag)))
        .collect();
    let normalized = Column {
        name: column.name.clone(),
        array: cast(&tags, column.array.data_type())?,
        dtype: column.dtype,
    };
    table.with_column(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::arrow_type;
    use crate::models::{SemanticType, Value};

    fn floats(name: &str, values: &[f64]) -> Column {
        Column::new(name, values.iter().map(|v| Value::Float(*v)).collect())
    }

    fn ints(name: &str, values: &[i64]) -> Column {
        Column::new(name, values.iter().map(|v| Value::Int(*v)).collect())
    }

    #[test]
    fn test_transient_columns_and_duplicates_removed() {
        let table = Table::from_columns(vec![
            floats("node1_cpu_busy", &[1.0, 1.0, 2.0]),
            ints("node1_disk_io_vda", &[7, 8, 9]),
            ints("total_y_label_red", &[0; 3]),
            ints("alert_yy_etcd", &[1, 0, 0]),
            Column::new("cluster_version", vec![Value::from("4.14"); 3]),
            ints("run_id", &[1, 2, 3]),
        ])
        .unwrap();

        let cleaned = clean(table).unwrap();
        let names: Vec<_> = cleaned.column_names().collect();
        assert_eq!(names, vec!["node1_cpu_busy"]);
        assert_eq!(cleaned.height(), 2);
    }

    #[test]
    fn test_source_families() {
        assert_eq!(source_family("Compact-run-3"), Some("compact"));
        assert_eq!(source_family("promql_export"), Some("compact"));
        assert_eq!(source_family("mno-20240301"), Some("mno"));
        assert_eq!(source_family("sno"), None);
    }

    #[test]
    fn test_normalize_sources_keeps_unknown_tags() {
        let table = Table::from_columns(vec![Column::new(
            SOURCE_COLUMN,
            vec![Value::from("compact-a"), Value::from("mno-b"), Value::from("lab"), Value::Null],
        )])
        .unwrap();
        let table = normalize_sources(table).unwrap();
        assert_eq!(
            table.column(SOURCE_COLUMN).unwrap().values(),
            vec![Value::from("compact"), Value::from("mno"), Value::from("lab"), Value::Null]
        );
    }

    #[test]
    fn test_normalize_keeps_category_storage() {
        let tags = Column::new(SOURCE_COLUMN, vec![Value::from("compact-a"); 2]);
        let dictionary = cast(&tags.array, &arrow_type(SemanticType::Category)).unwrap();
        let table = Table::from_columns(vec![Column::typed(
            SOURCE_COLUMN,
            dictionary,
            SemanticType::Category,
        )])
        .unwrap();

        let column = normalize_sources(table).unwrap().column(SOURCE_COLUMN).unwrap().clone();
        assert_eq!(column.dtype, Some(SemanticType::Category));
        assert_eq!(column.array.data_type(), &arrow_type(SemanticType::Category));
        assert_eq!(column.values(), vec![Value::from("compact"); 2]);
    }

    #[test]
    fn test_normalize_without_source_column_is_noop() {
        let table = Table::from_columns(vec![ints("x", &[1])]).unwrap();
        assert_eq!(normalize_sources(table.clone()).unwrap(), table);
    }
}
