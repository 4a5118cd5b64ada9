//! Type coercion
//!
//! Casts every column to the semantic type the registry declares for its
//! canonical name. Columns without a mapping fall back to `string` with a
//! warning, or fail under the strict policy. A cell that cannot be
//! represented in its target type fails the whole cast; there is no
//! per-row recovery.

use crate::error::{Result, WrangleError};
use crate::models::{SemanticType, TIMESTAMP_DISPLAY_FORMAT};
use crate::registry::TypeRegistry;
use crate::table::{Column, Table};
use arrow::array::{ArrayRef, AsArray, Int64Array, Scalar, TimestampMicrosecondArray};
use arrow::compute::kernels::numeric::mul;
use arrow::compute::{cast, cast_with_options, CastOptions};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::util::display::{array_value_to_string, FormatOptions};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, warn};

/// Timestamp layout used by the collection runs, e.g. `20240131-235959`
pub const COLLECTION_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Overflow and unparseable cells are errors rather than nulls
const STRICT_CAST: CastOptions<'static> = CastOptions {
    safe: false,
    format_options: FormatOptions::new(),
};

/// How to treat columns without a dtype mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoercionPolicy {
    /// Fail instead of defaulting unmapped columns to `string`
    pub strict_unmapped: bool,
}

impl CoercionPolicy {
    pub fn strict() -> Self {
        Self {
            strict_unmapped: true,
        }
    }
}

/// Arrow storage type of a semantic type
pub fn arrow_type(dtype: SemanticType) -> DataType {
    match dtype {
        SemanticType::Bool => DataType::Boolean,
        SemanticType::Int(8) => DataType::Int8,
        SemanticType::Int(16) => DataType::Int16,
        SemanticType::Int(32) => DataType::Int32,
        SemanticType::Int(_) => DataType::Int64,
        SemanticType::UInt(8) => DataType::UInt8,
        SemanticType::UInt(16) => DataType::UInt16,
        SemanticType::UInt(32) => DataType::UInt32,
        SemanticType::UInt(_) => DataType::UInt64,
        SemanticType::Float => DataType::Float64,
        SemanticType::String => DataType::Utf8,
        SemanticType::Category => {
            DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
        }
        SemanticType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

/// Applies a [`TypeRegistry`] to whole tables
pub struct TypeCoercionEngine<'a> {
    registry: &'a TypeRegistry,
    policy: CoercionPolicy,
}

impl<'a> TypeCoercionEngine<'a> {
    pub fn new(registry: &'a TypeRegistry, policy: CoercionPolicy) -> Self {
        Self { registry, policy }
    }

    /// Cast every column of the table to its declared type
    pub fn apply(&self, table: Table) -> Result<Table> {
        debug!(rows = table.height(), columns = table.width(), "Starting dtype conversion");
        let columns = table
            .into_columns()
            .into_iter()
            .map(|column| self.coerce_column(column))
            .collect::<Result<Vec<_>>>()?;
        debug!("Dtype conversion completed");
        Table::from_columns(columns)
    }

    /// Resolve the target type of one column name
    pub fn target_for(&self, column: &str) -> Result<SemanticType> {
        let (canonical, dtype) = self.registry.resolve(column);
        match dtype {
            Some(dtype) => Ok(dtype),
            None if self.policy.strict_unmapped => Err(WrangleError::UnmappedColumn {
                column: column.to_string(),
                canonical,
            }),
            None => {
                warn!(
                    column = %column,
                    canonical = %canonical,
                    "Missing dtype map, using `string`"
                );
                Ok(SemanticType::String)
            }
        }
    }

    fn coerce_column(&self, column: Column) -> Result<Column> {
        let target = self.target_for(&column.name)?;
        match cast_array(&column.array, target) {
            Ok(array) => Ok(Column::typed(column.name, array, target)),
            Err(reason) => Err(WrangleError::Cast {
                value: first_rejected_cell(&column.array, target),
                column: column.name,
                target,
                reason,
            }),
        }
    }
}

/// Parse a collection-run timestamp (`YYYYMMDD-HHMMSS`)
pub fn parse_collection_timestamp(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, COLLECTION_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, TIMESTAMP_DISPLAY_FORMAT))
        .map_err(|e| format!("not a {} timestamp: {}", COLLECTION_TIMESTAMP_FORMAT, e))
}

/// Cast a whole array to the storage type of `target`; nulls stay null
pub fn cast_array(array: &ArrayRef, target: SemanticType) -> std::result::Result<ArrayRef, String> {
    let to = arrow_type(target);
    if array.data_type() == &to {
        return Ok(array.clone());
    }
    let cast = match target {
        SemanticType::DateTime => to_timestamp(array),
        _ => cast_with_options(array, &to, &STRICT_CAST),
    };
    cast.map_err(|e| e.to_string())
}

/// Timestamps from collection-run text or integer epoch seconds
fn to_timestamp(array: &ArrayRef) -> std::result::Result<ArrayRef, arrow::error::ArrowError> {
    let to = arrow_type(SemanticType::DateTime);
    let source = array.data_type();
    if matches!(source, DataType::Utf8 | DataType::LargeUtf8 | DataType::Dictionary(_, _)) {
        let text = cast(array, &DataType::Utf8)?;
        let parsed = text
            .as_string::<i32>()
            .iter()
            .map(|cell| {
                cell.map(parse_collection_timestamp)
                    .transpose()
                    .map(|ts| ts.map(|ts| ts.and_utc().timestamp_micros()))
            })
            .collect::<std::result::Result<TimestampMicrosecondArray, String>>()
            .map_err(arrow::error::ArrowError::CastError)?;
        return Ok(Arc::new(parsed));
    }
    if source.is_integer() {
        let seconds = cast_with_options(array, &DataType::Int64, &STRICT_CAST)?;
        let micros = mul(&seconds, &Scalar::new(Int64Array::from(vec![MICROS_PER_SECOND])))?;
        return cast_with_options(&micros, &to, &STRICT_CAST);
    }
    cast_with_options(array, &to, &STRICT_CAST)
}

/// Rendering of the first cell that fails to cast on its own
fn first_rejected_cell(array: &ArrayRef, target: SemanticType) -> String {
    (0..array.len())
        .filter(|idx| array.is_valid(*idx))
        .find(|idx| cast_array(&array.slice(*idx, 1), target).is_err())
        .and_then(|idx| array_value_to_string(array, idx).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use chrono::NaiveDate;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_yaml_str(
            r#"
- names: [node0_control_plane]
  dtype: bool
- names: [node0_pods]
  dtype: uint8
- names: [node0_cpu_busy]
  dtype: float64
- names: [timestamp, started]
  dtype: datetime64
- names: [cluster_version]
  dtype: category
- names: [delta]
  dtype: int16
"#,
            "[]",
        )
        .unwrap()
    }

    fn table() -> Table {
        Table::from_columns(vec![
            Column::new("node2_control_plane", vec![Value::Int(1), Value::Int(0)]),
            Column::new("node4_pods", vec![Value::Float(12.0), Value::Float(200.0)]),
            Column::new("node1_cpu_busy", vec![Value::from("3"), Value::from("0.25")]),
            Column::new(
                "timestamp",
                vec![Value::from("20240131-235959"), Value::from("20240201-000010")],
            ),
            Column::new("started", vec![Value::Int(86_400), Value::Null]),
            Column::new("cluster_version", vec![Value::from("4.14"), Value::from("4.15")]),
            Column::new("delta", vec![Value::Int(-5), Value::Int(7)]),
            Column::new("unmapped_note", vec![Value::Int(7), Value::Null]),
        ])
        .unwrap()
    }

    #[test]
    fn test_casts_declared_types() {
        let registry = registry();
        let engine = TypeCoercionEngine::new(&registry, CoercionPolicy::default());
        let cast = engine.apply(table()).unwrap();

        assert_eq!(
            cast.column("node2_control_plane").unwrap().values(),
            vec![Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(
            cast.column("node4_pods").unwrap().values(),
            vec![Value::UInt(12), Value::UInt(200)]
        );
        assert_eq!(
            cast.column("node1_cpu_busy").unwrap().values(),
            vec![Value::Float(3.0), Value::Float(0.25)]
        );
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            cast.column("timestamp").unwrap().value(0),
            Value::Timestamp(expected)
        );
        let epoch_day = NaiveDate::from_ymd_opt(1970, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            cast.column("started").unwrap().values(),
            vec![Value::Timestamp(epoch_day), Value::Null]
        );
        let version = cast.column("cluster_version").unwrap();
        assert_eq!(version.dtype, Some(SemanticType::Category));
        assert!(matches!(version.array.data_type(), DataType::Dictionary(_, _)));
        assert_eq!(
            cast.column("delta").unwrap().array.data_type(),
            &DataType::Int16
        );
        assert_eq!(
            cast.column("unmapped_note").unwrap().values(),
            vec![Value::from("7"), Value::Null]
        );
        assert_eq!(
            cast.column("unmapped_note").unwrap().dtype,
            Some(SemanticType::String)
        );
    }

    #[test]
    fn test_casting_twice_is_a_no_op() {
        let registry = registry();
        let engine = TypeCoercionEngine::new(&registry, CoercionPolicy::default());
        let once = engine.apply(table()).unwrap();
        let twice = engine.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_strict_policy_rejects_unmapped_columns() {
        let registry = registry();
        let engine = TypeCoercionEngine::new(&registry, CoercionPolicy::strict());
        match engine.apply(table()) {
            Err(WrangleError::UnmappedColumn { column, canonical }) => {
                assert_eq!(column, "unmapped_note");
                assert_eq!(canonical, "unmapped_note");
            }
            other => panic!("expected unmapped column error, got {:?}", other.map(|t| t.shape())),
        }
    }

    #[test]
    fn test_out_of_range_integer_is_fatal() {
        let registry = registry();
        let engine = TypeCoercionEngine::new(&registry, CoercionPolicy::default());
        let table = Table::from_columns(vec![Column::new(
            "node1_pods",
            vec![Value::Int(3), Value::Int(256)],
        )])
        .unwrap();
        match engine.apply(table) {
            Err(WrangleError::Cast { value, target, .. }) => {
                assert_eq!(value, "256");
                assert_eq!(target, SemanticType::UInt(8));
            }
            other => panic!("expected cast error, got {:?}", other.map(|t| t.shape())),
        }
    }

    #[test]
    fn test_bad_timestamp_is_fatal() {
        let registry = registry();
        let engine = TypeCoercionEngine::new(&registry, CoercionPolicy::default());
        let table =
            Table::from_columns(vec![Column::new("timestamp", vec![Value::from("yesterday")])])
                .unwrap();
        assert!(matches!(engine.apply(table), Err(WrangleError::Cast { .. })));
    }

    fn cast_cells(
        values: Vec<Value>,
        target: SemanticType,
    ) -> std::result::Result<Vec<Value>, String> {
        let column = Column::new("x", values);
        cast_array(&column.array, target).map(|array| Column::from_array("x", array).values())
    }

    #[test]
    fn test_zero_fill_becomes_false() {
        assert_eq!(
            cast_cells(vec![Value::Int(0)], SemanticType::Bool).unwrap(),
            vec![Value::Bool(false)]
        );
        assert_eq!(
            cast_cells(vec![Value::from("true")], SemanticType::Bool).unwrap(),
            vec![Value::Bool(true)]
        );
        assert!(cast_cells(vec![Value::from("maybe")], SemanticType::Bool).is_err());
    }

    #[test]
    fn test_integer_bounds() {
        assert!(cast_cells(vec![Value::Int(-32768)], SemanticType::Int(16)).is_ok());
        assert!(cast_cells(vec![Value::Int(-32769)], SemanticType::Int(16)).is_err());
        assert!(cast_cells(vec![Value::Int(-1)], SemanticType::UInt(64)).is_err());
        assert_eq!(
            cast_cells(vec![Value::UInt(u64::MAX)], SemanticType::UInt(64)).unwrap(),
            vec![Value::UInt(u64::MAX)]
        );
        assert_eq!(
            cast_cells(vec![Value::Float(7.9)], SemanticType::Int(64)).unwrap(),
            vec![Value::Int(7)]
        );
        assert!(cast_cells(vec![Value::Float(f64::NAN)], SemanticType::Int(32)).is_err());
    }
}
