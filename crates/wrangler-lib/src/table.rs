//! In-memory telemetry table
//!
//! A table is an ordered set of named arrow columns of equal length; each
//! row is one collection snapshot. Transform stages take a table by value
//! and return a new one, so no stage observes another stage's partial
//! renames. Column data is only touched through arrow compute kernels.

use crate::error::{Result, WrangleError};
use crate::models::{SemanticType, Value};
use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, Scalar,
    StringArray, TimestampMicrosecondArray, UInt64Array,
};
use arrow::compute::kernels::zip::zip;
use arrow::compute::{cast, concat, filter, is_null};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::row::{RowConverter, SortField};
use arrow::util::display::array_value_to_string;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A named column with an optional resolved semantic type
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub array: ArrayRef,
    /// Set once the column has been cast by the coercion engine
    pub dtype: Option<SemanticType>,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.array.as_ref() == other.array.as_ref()
            && self.dtype == other.dtype
    }
}

impl Column {
    /// Build a column from cells; the arrow type is inferred from them
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self::from_array(name, values_to_array(&values))
    }

    pub fn from_array(name: impl Into<String>, array: ArrayRef) -> Self {
        Self {
            name: name.into(),
            array,
            dtype: None,
        }
    }

    pub fn typed(name: impl Into<String>, array: ArrayRef, dtype: SemanticType) -> Self {
        Self {
            name: name.into(),
            array,
            dtype: Some(dtype),
        }
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Cell at `idx`
    pub fn value(&self, idx: usize) -> Value {
        value_at(self.array.as_ref(), idx)
    }

    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|idx| self.value(idx)).collect()
    }

    /// Numeric view; booleans count as 0/1 and unparseable cells are null
    pub fn to_f64(&self) -> Result<Float64Array> {
        let numeric = cast(&self.array, &DataType::Float64)?;
        Ok(numeric.as_primitive::<Float64Type>().clone())
    }

    /// Text view of every cell
    pub fn to_text(&self) -> Result<StringArray> {
        let text = cast(&self.array, &DataType::Utf8)?;
        Ok(text.as_string::<i32>().clone())
    }
}

/// Arrow array holding `values`
///
/// Homogeneous cells keep their natural arrow type; a mix of numbers is
/// widened to float64 and any other mix is rendered as text.
pub(crate) fn values_to_array(values: &[Value]) -> ArrayRef {
    let all = |accept: fn(&Value) -> bool| values.iter().all(|v| v.is_null() || accept(v));
    match values.iter().find(|v| !v.is_null()) {
        None => new_null_array(&DataType::Null, values.len()),
        Some(Value::Bool(_)) if all(|v| matches!(v, Value::Bool(_))) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        Some(Value::Int(_)) if all(|v| matches!(v, Value::Int(_))) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        Some(Value::UInt(_)) if all(|v| matches!(v, Value::UInt(_))) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::UInt(u) => Some(*u),
                    _ => None,
                })
                .collect::<UInt64Array>(),
        ),
        Some(Value::Int(_) | Value::UInt(_) | Value::Float(_))
            if all(|v| matches!(v, Value::Int(_) | Value::UInt(_) | Value::Float(_))) =>
        {
            Arc::new(values.iter().map(Value::as_f64).collect::<Float64Array>())
        }
        Some(Value::Timestamp(_)) if all(|v| matches!(v, Value::Timestamp(_))) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<TimestampMicrosecondArray>(),
        ),
        Some(_) => Arc::new(
            values
                .iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::Str(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect::<StringArray>(),
        ),
    }
}

fn value_at(array: &dyn Array, idx: usize) -> Value {
    if array.is_null(idx) {
        return Value::Null;
    }
    match array.data_type() {
        DataType::Null => Value::Null,
        DataType::Boolean => Value::Bool(array.as_boolean().value(idx)),
        DataType::Int8 => Value::Int(array.as_primitive::<Int8Type>().value(idx).into()),
        DataType::Int16 => Value::Int(array.as_primitive::<Int16Type>().value(idx).into()),
        DataType::Int32 => Value::Int(array.as_primitive::<Int32Type>().value(idx).into()),
        DataType::Int64 => Value::Int(array.as_primitive::<Int64Type>().value(idx)),
        DataType::UInt8 => Value::UInt(array.as_primitive::<UInt8Type>().value(idx).into()),
        DataType::UInt16 => Value::UInt(array.as_primitive::<UInt16Type>().value(idx).into()),
        DataType::UInt32 => Value::UInt(array.as_primitive::<UInt32Type>().value(idx).into()),
        DataType::UInt64 => Value::UInt(array.as_primitive::<UInt64Type>().value(idx)),
        DataType::Float32 => Value::Float(array.as_primitive::<Float32Type>().value(idx).into()),
        DataType::Float64 => Value::Float(array.as_primitive::<Float64Type>().value(idx)),
        DataType::Utf8 => Value::from(array.as_string::<i32>().value(idx)),
        DataType::LargeUtf8 => Value::from(array.as_string::<i64>().value(idx)),
        DataType::Timestamp(unit, _) => {
            let ts = match unit {
                TimeUnit::Second => array
                    .as_primitive::<TimestampSecondType>()
                    .value_as_datetime(idx),
                TimeUnit::Millisecond => array
                    .as_primitive::<TimestampMillisecondType>()
                    .value_as_datetime(idx),
                TimeUnit::Microsecond => array
                    .as_primitive::<TimestampMicrosecondType>()
                    .value_as_datetime(idx),
                TimeUnit::Nanosecond => array
                    .as_primitive::<TimestampNanosecondType>()
                    .value_as_datetime(idx),
            };
            ts.map(Value::Timestamp).unwrap_or(Value::Null)
        }
        DataType::Date32 => array
            .as_primitive::<Date32Type>()
            .value_as_datetime(idx)
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        DataType::Date64 => array
            .as_primitive::<Date64Type>()
            .value_as_datetime(idx)
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        _ => array_value_to_string(array, idx)
            .map(Value::Str)
            .unwrap_or(Value::Null),
    }
}

/// Replace the nulls of `array` with `value` cast to the array's type
fn fill_array(array: &ArrayRef, value: &Value) -> Result<ArrayRef> {
    match array.data_type() {
        DataType::Null => Ok(values_to_array(&vec![value.clone(); array.len()])),
        _ if array.null_count() == 0 => Ok(array.clone()),
        DataType::Dictionary(_, inner) => {
            let plain = cast(array, inner)?;
            let filled = fill_array(&plain, value)?;
            Ok(cast(&filled, array.data_type())?)
        }
        data_type => {
            let fill = cast(&values_to_array(std::slice::from_ref(value)), data_type)?;
            let mask = is_null(array)?;
            Ok(zip(&mask, &Scalar::new(fill), array)?)
        }
    }
}

/// Arrow type shared by the pieces of one column during concatenation
///
/// Pieces that agree keep their type; numeric and boolean pieces widen to
/// float64; anything else is stacked as text for the coercion pass to
/// resolve.
fn common_type<'a>(types: impl Iterator<Item = &'a DataType> + Clone) -> DataType {
    let mut present = types.filter(|t| **t != DataType::Null);
    let Some(first) = present.clone().next() else {
        return DataType::Null;
    };
    if present.clone().all(|t| t == first) {
        first.clone()
    } else if present.all(|t| t.is_numeric() || *t == DataType::Boolean) {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, rejecting duplicate names and ragged columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        let expected = columns.first().map(Column::len).unwrap_or(0);
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(WrangleError::DuplicateColumn(column.name.clone()));
            }
            if column.len() != expected {
                return Err(WrangleError::RaggedColumn {
                    column: column.name.clone(),
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Add a column, or replace the column with the same name in place
    pub fn with_column(mut self, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.height() {
            return Err(WrangleError::RaggedColumn {
                expected: self.height(),
                found: column.len(),
                column: column.name,
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(self)
    }

    /// Apply a rename map atomically
    ///
    /// All renames are resolved against the original names, so a map that
    /// exchanges two names (`a -> b`, `b -> a`) is applied without collision.
    pub fn rename(self, renames: &HashMap<String, String>) -> Result<Self> {
        if renames.is_empty() {
            return Ok(self);
        }
        let columns = self
            .columns
            .into_iter()
            .map(|mut column| {
                if let Some(new_name) = renames.get(&column.name) {
                    column.name = new_name.clone();
                }
                column
            })
            .collect();
        Self::from_columns(columns)
    }

    /// Remove every column whose name satisfies the predicate
    pub fn drop_columns_where<F>(mut self, mut predicate: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        self.columns.retain(|c| !predicate(&c.name));
        self
    }

    /// Replace missing cells with `value`
    ///
    /// The fill value is cast to each column's arrow type, so a zero fill
    /// becomes `false` in boolean columns and `"0"` in text columns.
    /// All-null columns without a type take the fill value's own type.
    pub fn fill_null(self, value: &Value) -> Result<Self> {
        let columns = self
            .columns
            .into_iter()
            .map(|column| {
                let array = fill_array(&column.array, value)?;
                Ok(Column { array, ..column })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    /// Stack tables vertically over the union of their columns
    ///
    /// Columns keep their first-appearance order. Cells of a column absent
    /// from one of the inputs are null. A column keeps its resolved type
    /// only when every input that carries it agrees on that type.
    pub fn concat(tables: Vec<Table>) -> Result<Table> {
        let mut order: Vec<String> = Vec::new();
        let mut dtypes: HashMap<String, Option<SemanticType>> = HashMap::new();
        for table in &tables {
            for column in &table.columns {
                match dtypes.get_mut(&column.name) {
                    Some(dtype) => {
                        if *dtype != column.dtype {
                            *dtype = None;
                        }
                    }
                    None => {
                        order.push(column.name.clone());
                        dtypes.insert(column.name.clone(), column.dtype);
                    }
                }
            }
        }

        let columns = order
            .into_iter()
            .map(|name| {
                let data_type = common_type(
                    tables
                        .iter()
                        .filter_map(|t| t.column(&name))
                        .map(|c| c.array.data_type()),
                );
                let arrays = tables
                    .iter()
                    .map(|table| match table.column(&name) {
                        Some(column) if column.array.data_type() == &data_type => {
                            Ok(column.array.clone())
                        }
                        Some(column) => Ok(cast(&column.array, &data_type)?),
                        None => Ok(new_null_array(&data_type, table.height())),
                    })
                    .collect::<Result<Vec<ArrayRef>>>()?;
                let refs: Vec<&dyn Array> = arrays.iter().map(|a| a.as_ref()).collect();
                let dtype = dtypes.get(&name).copied().flatten();
                Ok(Column {
                    array: concat(&refs)?,
                    name,
                    dtype,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Table { columns })
    }

    /// Remove duplicate rows, keeping the first occurrence
    pub fn dedup_rows(self) -> Result<Self> {
        if self.columns.is_empty() {
            return Ok(self);
        }
        let fields = self
            .columns
            .iter()
            .map(|c| SortField::new(c.array.data_type().clone()))
            .collect();
        let converter = RowConverter::new(fields)?;
        let arrays: Vec<ArrayRef> = self.columns.iter().map(|c| c.array.clone()).collect();
        let rows = converter.convert_columns(&arrays)?;

        let mut seen = HashSet::with_capacity(rows.num_rows());
        let keep: BooleanArray = rows.iter().map(|row| Some(seen.insert(row))).collect();

        let columns = self
            .columns
            .into_iter()
            .map(|column| {
                let array = filter(&column.array, &keep)?;
                Ok(Column { array, ..column })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(name: &str, values: &[i64]) -> Column {
        Column::new(name, values.iter().map(|v| Value::Int(*v)).collect())
    }

    #[test]
    fn test_rejects_duplicate_columns() {
        let result = Table::from_columns(vec![ints("a", &[1]), ints("a", &[2])]);
        assert!(matches!(result, Err(WrangleError::DuplicateColumn(name)) if name == "a"));
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = Table::from_columns(vec![ints("a", &[1, 2]), ints("b", &[2])]);
        assert!(matches!(result, Err(WrangleError::RaggedColumn { .. })));
    }

    #[test]
    fn test_cells_infer_arrow_types() {
        let mixed = Column::new("a", vec![Value::Int(1), Value::from("n/a")]);
        assert_eq!(mixed.array.data_type(), &DataType::Utf8);
        assert_eq!(mixed.values(), vec![Value::from("1"), Value::from("n/a")]);

        let numbers = Column::new("b", vec![Value::Null, Value::Int(2), Value::Float(0.5)]);
        assert_eq!(numbers.array.data_type(), &DataType::Float64);
        assert_eq!(
            numbers.values(),
            vec![Value::Null, Value::Float(2.0), Value::Float(0.5)]
        );

        let empty = Column::new("c", vec![Value::Null; 2]);
        assert_eq!(empty.array.data_type(), &DataType::Null);
    }

    #[test]
    fn test_rename_exchanges_names_atomically() {
        let table = Table::from_columns(vec![ints("a", &[1]), ints("b", &[2])]).unwrap();
        let renames = HashMap::from([
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "a".to_string()),
        ]);
        let renamed = table.rename(&renames).unwrap();
        assert_eq!(renamed.column("a").unwrap().values(), vec![Value::Int(2)]);
        assert_eq!(renamed.column("b").unwrap().values(), vec![Value::Int(1)]);
    }

    #[test]
    fn test_rename_collision_is_an_error() {
        let table = Table::from_columns(vec![ints("a", &[1]), ints("b", &[2])]).unwrap();
        let renames = HashMap::from([("a".to_string(), "b".to_string())]);
        assert!(matches!(
            table.rename(&renames),
            Err(WrangleError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn test_concat_unions_columns() {
        let left = Table::from_columns(vec![ints("a", &[1, 2]), ints("b", &[3, 4])]).unwrap();
        let right = Table::from_columns(vec![ints("b", &[5]), ints("c", &[6])]).unwrap();
        let merged = Table::concat(vec![left, right]).unwrap();

        assert_eq!(merged.shape(), (3, 3));
        let names: Vec<_> = merged.column_names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(
            merged.column("a").unwrap().values(),
            vec![Value::Int(1), Value::Int(2), Value::Null]
        );
        assert_eq!(
            merged.column("c").unwrap().values(),
            vec![Value::Null, Value::Null, Value::Int(6)]
        );
    }

    #[test]
    fn test_concat_widens_disagreeing_pieces() {
        let left = Table::from_columns(vec![
            ints("a", &[1]),
            Column::new("b", vec![Value::Bool(true)]),
        ])
        .unwrap();
        let right = Table::from_columns(vec![
            Column::new("a", vec![Value::Float(0.5)]),
            Column::new("b", vec![Value::from("x")]),
        ])
        .unwrap();
        let merged = Table::concat(vec![left, right]).unwrap();
        assert_eq!(
            merged.column("a").unwrap().values(),
            vec![Value::Float(1.0), Value::Float(0.5)]
        );
        assert_eq!(
            merged.column("b").unwrap().values(),
            vec![Value::from("true"), Value::from("x")]
        );
    }

    #[test]
    fn test_concat_drops_disagreeing_dtypes() {
        let left = Table::from_columns(vec![Column::typed(
            "a",
            Arc::new(BooleanArray::from(vec![true])),
            SemanticType::Bool,
        )])
        .unwrap();
        let right = Table::from_columns(vec![ints("a", &[0])]).unwrap();
        let merged = Table::concat(vec![left, right]).unwrap();
        assert_eq!(merged.column("a").unwrap().dtype, None);
    }

    #[test]
    fn test_fill_null_casts_fill_to_column_type() {
        let table = Table::from_columns(vec![
            Column::new("a", vec![Value::Null, Value::Int(2)]),
            Column::new("b", vec![Value::Bool(true), Value::Null]),
            Column::new("c", vec![Value::Null, Value::from("x")]),
            Column::new("d", vec![Value::Null, Value::Null]),
        ])
        .unwrap()
        .fill_null(&Value::Int(0))
        .unwrap();

        assert_eq!(
            table.column("a").unwrap().values(),
            vec![Value::Int(0), Value::Int(2)]
        );
        assert_eq!(
            table.column("b").unwrap().values(),
            vec![Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(
            table.column("c").unwrap().values(),
            vec![Value::from("0"), Value::from("x")]
        );
        assert_eq!(table.column("d").unwrap().values(), vec![Value::Int(0); 2]);
    }

    #[test]
    fn test_dedup_rows_keeps_first() {
        let table = Table::from_columns(vec![
            ints("a", &[1, 1, 2, 1]),
            Column::new(
                "b",
                vec![
                    Value::Float(0.5),
                    Value::Float(0.5),
                    Value::Float(0.5),
                    Value::Float(1.5),
                ],
            ),
        ])
        .unwrap()
        .dedup_rows()
        .unwrap();

        assert_eq!(table.height(), 3);
        assert_eq!(
            table.column("b").unwrap().values(),
            vec![Value::Float(0.5), Value::Float(0.5), Value::Float(1.5)]
        );
    }

    #[test]
    fn test_with_column_replaces_in_place() {
        let table = Table::from_columns(vec![ints("a", &[1]), ints("b", &[2])])
            .unwrap()
            .with_column(ints("a", &[9]))
            .unwrap();
        let names: Vec<_> = table.column_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(table.column("a").unwrap().values(), vec![Value::Int(9)]);
    }
}
