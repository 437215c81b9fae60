//! Schema derivation and row flattening for nested JSON records
//!
//! Header paths are dot-separated field paths (`"amount.value"`). Arrays never
//! add a path segment: their shape is taken from the first element, and at
//! resolution time the rest of the path is mapped over every element.
//!
//! Records in one array are assumed to share a shape. Fields that only appear
//! in later records are not added as columns.

mod headers;
mod rows;

pub use headers::{derive_headers, diff_headers, display_name_for, HeaderDiff, HeaderMapping};
pub use rows::{resolve_row, resolve_row_with, spread_lists};

use chrono::{DateTime, FixedOffset};
use std::fmt;

/// Maximum nesting followed when deriving headers or rendering objects
pub const MAX_DEPTH: usize = 64;

/// Separator used when a list is rendered into one cell
pub const LIST_SEPARATOR: &str = ", ";

/// One resolved cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing or null
    Empty,
    /// Text
    Text(String),
    /// JSON number, kept exact
    Number(serde_json::Number),
    /// Boolean
    Bool(bool),
    /// RFC 3339 timestamp, rendered as the text it was parsed from
    Date {
        /// Parsed instant
        instant: DateTime<FixedOffset>,
        /// Source text
        source: String,
    },
    /// Values collected through an array, kept for column spreading
    List(Vec<CellValue>),
}

impl CellValue {
    /// Whether the cell renders as an empty string
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.is_empty(),
            CellValue::List(values) => values.iter().all(CellValue::is_empty),
            _ => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(text) => write!(f, "{text}"),
            CellValue::Number(number) => write!(f, "{number}"),
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::Date { source, .. } => write!(f, "{source}"),
            CellValue::List(values) => {
                let rendered: Vec<String> = values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(ToString::to_string)
                    .collect();
                write!(f, "{}", rendered.join(LIST_SEPARATOR))
            }
        }
    }
}

/// One output row, aligned with a header list
pub type Row = Vec<CellValue>;

/// How values reached through arrays are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayMode {
    /// One cell, elements joined with `", "`
    #[default]
    Join,
    /// Keep [`CellValue::List`] so [`spread_lists`] can widen the column
    Spread,
}
