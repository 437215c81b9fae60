//! Row resolution against a header list

use chrono::DateTime;
use serde_json::Value;

use super::{ArrayMode, CellValue, HeaderMapping, Row, LIST_SEPARATOR, MAX_DEPTH};

/// Resolve `record` against `headers`, joining array values into one cell
pub fn resolve_row(record: &Value, headers: &[String]) -> Row {
    resolve_row_with(record, headers, ArrayMode::Join)
}

/// Resolve `record` against `headers`
///
/// The row always has one cell per header. Missing fields and nulls are
/// [`CellValue::Empty`]. Inside an array every element yields one value, so
/// sibling columns stay aligned by position. Join mode skips the empty
/// elements when rendering, spread mode keeps them as empty columns.
pub fn resolve_row_with(record: &Value, headers: &[String], mode: ArrayMode) -> Row {
    headers
        .iter()
        .map(|header| resolve_cell(record, header, mode))
        .collect()
}

fn resolve_cell(record: &Value, header: &str, mode: ArrayMode) -> CellValue {
    let segments: Vec<&str> = header.split('.').collect();
    let mut found = Vec::new();
    let mut through_array = false;
    walk(record, &segments, &mut found, &mut through_array);

    if !through_array {
        return found.first().map(|v| to_cell(v)).unwrap_or(CellValue::Empty);
    }

    let cells: Vec<CellValue> = found.iter().map(|v| to_cell(v)).collect();
    match mode {
        ArrayMode::Spread => CellValue::List(cells),
        ArrayMode::Join => join_cells(cells),
    }
}

static NULL: Value = Value::Null;

/// Follow `segments` from `value`, mapping over every array met on the way
///
/// Each array element contributes at least one value; an element without the
/// path contributes `null`.
fn walk<'a>(value: &'a Value, segments: &[&str], found: &mut Vec<&'a Value>, through_array: &mut bool) {
    if let Value::Array(items) = value {
        *through_array = true;
        for item in items {
            let before = found.len();
            walk(item, segments, found, through_array);
            if found.len() == before {
                found.push(&NULL);
            }
        }
        return;
    }

    match segments.split_first() {
        None => found.push(value),
        Some((head, rest)) => {
            if let Value::Object(fields) = value {
                if let Some(child) = fields.get(*head) {
                    walk(child, rest, found, through_array);
                }
            }
        }
    }
}

fn join_cells(cells: Vec<CellValue>) -> CellValue {
    let mut present: Vec<CellValue> = cells.into_iter().filter(|c| !c.is_empty()).collect();
    match present.len() {
        0 => CellValue::Empty,
        1 => present.remove(0),
        _ => CellValue::Text(
            present
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR),
        ),
    }
}

fn to_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => CellValue::Bool(*b),
        Value::Number(n) => CellValue::Number(n.clone()),
        Value::String(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(instant) => CellValue::Date {
                instant,
                source: s.clone(),
            },
            Err(_) => CellValue::Text(s.clone()),
        },
        Value::Object(_) | Value::Array(_) => {
            let mut leaves = Vec::new();
            collect_leaves(value, 0, &mut leaves);
            if leaves.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(leaves.join(LIST_SEPARATOR))
            }
        }
    }
}

fn collect_leaves(value: &Value, depth: usize, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Object(fields) if depth < MAX_DEPTH => {
            for child in fields.values() {
                collect_leaves(child, depth + 1, out);
            }
        }
        Value::Array(items) if depth < MAX_DEPTH => {
            for child in items {
                collect_leaves(child, depth + 1, out);
            }
        }
        Value::String(s) => out.push(s.clone()),
        other => out.push(other.to_string()),
    }
}

/// Widen every list column to the longest list seen in `rows`
///
/// A column holding a list in any row becomes `path.0 .. path.{n-1}`; shorter
/// lists and scalar cells are padded with [`CellValue::Empty`]. Columns that
/// never hold a list are left untouched.
pub fn spread_lists(columns: &[HeaderMapping], rows: Vec<Row>) -> (Vec<HeaderMapping>, Vec<Row>) {
    let widths: Vec<Option<usize>> = (0..columns.len())
        .map(|index| {
            rows.iter()
                .filter_map(|row| match row.get(index) {
                    Some(CellValue::List(values)) => Some(values.len().max(1)),
                    _ => None,
                })
                .max()
        })
        .collect();

    let mut spread_columns = Vec::new();
    for (column, width) in columns.iter().zip(&widths) {
        match width {
            None => spread_columns.push(column.clone()),
            Some(width) => {
                for position in 0..*width {
                    spread_columns.push(HeaderMapping {
                        original_path: format!("{}.{position}", column.original_path),
                        display_name: format!("{} {}", column.display_name, position + 1),
                        is_user_override: column.is_user_override,
                    });
                }
            }
        }
    }

    let spread_rows = rows
        .into_iter()
        .map(|row| {
            let mut cells = Vec::with_capacity(spread_columns.len());
            let mut row = row.into_iter();
            for width in &widths {
                let cell = row.next().unwrap_or(CellValue::Empty);
                match (width, cell) {
                    (None, CellValue::List(values)) => cells.push(join_cells(values)),
                    (None, cell) => cells.push(cell),
                    (Some(width), CellValue::List(values)) => {
                        let len = values.len();
                        cells.extend(values);
                        cells.extend(std::iter::repeat(CellValue::Empty).take(width - len.min(*width)));
                    }
                    (Some(width), cell) => {
                        cells.push(cell);
                        cells.extend(std::iter::repeat(CellValue::Empty).take(width - 1));
                    }
                }
            }
            cells
        })
        .collect();

    (spread_columns, spread_rows)
}
