/// Tabular result container.
///
/// A `DataTable` holds the column metadata introspected from a result set and
/// the rows materialized from it. Driver NULLs are stored as `Value::Null` and
/// surface through the typed getters as `None`; they are never replaced by a
/// zero value of the column's scan type.
use crate::core::{DataHelperError, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// A single database value, used both for bound parameters and result cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    DateTime(NaiveDateTime),
}

/// The scan type of a column, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    Bool,
    DateTime,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Text(_) => ValueKind::Text,
            Value::Blob(_) => ValueKind::Blob,
            Value::Bool(_) => ValueKind::Bool,
            Value::DateTime(_) => ValueKind::DateTime,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reads the value as text. Numbers and booleans are formatted, blobs are
    /// decoded lossily.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "t" | "yes" | "y" => Some(true),
                "0" | "false" | "f" | "no" | "n" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Blob(b) => write!(f, "<BLOB: {} bytes>", b.len()),
            other => write!(f, "{}", other.as_string().unwrap_or_default()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds a `Vec<Value>` of statement arguments.
///
/// ```
/// use datahelper::{args, Value};
/// let a = args![1, "abc", None::<i64>];
/// assert_eq!(a[2], Value::Null);
/// ```
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::Value>::new() };
    ($($arg:expr),+ $(,)?) => { vec![$($crate::Value::from($arg)),+] };
}

/// Column metadata introspected from a result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub scan_type: ValueKind,
    /// Declared length for variable-length types, when the driver reports one
    pub length: Option<i64>,
    pub database_type_name: String,
}

/// One value of a row, tagged with its position and column name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub column_index: usize,
    pub column_name: String,
    pub value: Value,
}

/// Addresses a cell in a row either by ordinal or by column name.
pub trait ColumnRef {
    fn position(&self, row: &Row) -> Option<usize>;
}

impl ColumnRef for usize {
    fn position(&self, row: &Row) -> Option<usize> {
        (*self < row.cells.len()).then_some(*self)
    }
}

// Bare integer literals default to i32.
impl ColumnRef for i32 {
    fn position(&self, row: &Row) -> Option<usize> {
        usize::try_from(*self).ok().and_then(|i| i.position(row))
    }
}

impl ColumnRef for &str {
    fn position(&self, row: &Row) -> Option<usize> {
        row.cells
            .iter()
            .position(|c| c.column_name.eq_ignore_ascii_case(self))
    }
}

/// A row of cells, one per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub row_index: usize,
}

impl Row {
    pub fn column_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the raw value, `None` when the column does not exist.
    pub fn value<C: ColumnRef>(&self, column: C) -> Option<&Value> {
        column.position(self).map(|i| &self.cells[i].value)
    }

    pub fn is_null<C: ColumnRef>(&self, column: C) -> bool {
        self.value(column).map_or(true, Value::is_null)
    }

    pub fn string<C: ColumnRef>(&self, column: C) -> Option<String> {
        self.value(column).and_then(Value::as_string)
    }

    pub fn int64<C: ColumnRef>(&self, column: C) -> Option<i64> {
        self.value(column).and_then(Value::as_i64)
    }

    pub fn float64<C: ColumnRef>(&self, column: C) -> Option<f64> {
        self.value(column).and_then(Value::as_f64)
    }

    pub fn bool<C: ColumnRef>(&self, column: C) -> Option<bool> {
        self.value(column).and_then(Value::as_bool)
    }

    pub fn datetime<C: ColumnRef>(&self, column: C) -> Option<NaiveDateTime> {
        self.value(column).and_then(Value::as_datetime)
    }
}

/// Ordered columns plus the rows materialized against them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl DataTable {
    pub fn new(name: &str) -> Self {
        DataTable {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn add_column(&mut self, name: &str, scan_type: ValueKind, length: Option<i64>, database_type_name: &str) {
        self.columns.push(Column {
            name: name.to_string(),
            scan_type,
            length,
            database_type_name: database_type_name.to_string(),
        });
    }

    /// Creates an empty row shaped to the current columns, every cell NULL.
    pub fn new_row(&self) -> Row {
        Row {
            cells: self
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| Cell {
                    column_index: i,
                    column_name: c.name.clone(),
                    value: Value::Null,
                })
                .collect(),
            row_index: self.rows.len(),
        }
    }

    /// Appends a row; it must carry exactly one cell per column.
    pub fn add_row(&mut self, mut row: Row) -> Result<()> {
        if row.cells.len() != self.columns.len() {
            return Err(DataHelperError::Validation(format!(
                "row has {} cells but table '{}' has {} columns",
                row.cells.len(),
                self.name,
                self.columns.len()
            )));
        }
        row.row_index = self.rows.len();
        self.rows.push(row);
        Ok(())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
