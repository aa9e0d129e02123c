use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Pre-calculated contents of a worksheet cell.
///
/// Formulas are never evaluated; loaders hand over the cached result.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    /// Empty / unset cell.
    #[default]
    Empty,
    /// IEEE-754 double precision number.
    Number(f64),
    String(String),
    Boolean(bool),
    /// Excel error literal such as `#DIV/0!`.
    Error(String),
    /// A number the workbook formats as a date or time, stored as a serial in
    /// the sheet's [`crate::DateSystem`].
    DateTime(f64),
}

impl CellValue {
    /// Returns true if the value is [`CellValue::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// True when the cell carries something other than null or `""`.
    pub fn has_value(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, CellValue::DateTime(_))
    }

    /// Text used when the cell is read as a header label.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Number(n) | CellValue::DateTime(n) => format_number(*n),
            CellValue::String(s) => s.clone(),
            CellValue::Boolean(true) => "TRUE".to_owned(),
            CellValue::Boolean(false) => "FALSE".to_owned(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_owned())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn format_number(n: f64) -> String {
    // Integral values print without a trailing `.0` so `2024` reads like the
    // cell Excel shows.
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// A value stored on a record field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Explicitly cleared field (written when write-nulls is enabled).
    Null,
    Number(f64),
    String(String),
    Boolean(bool),
    Error(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}
