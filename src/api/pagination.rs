//! Page extraction from API response bodies
//!
//! Accepted shapes:
//! - `{"items": [...], "nextPagePath": "/api/v0/...?cursor=..."}` (cursor page)
//! - a top-level JSON array (every element is an item, no next page)
//! - any other value (one item, no next page)

use serde_json::Value;

/// Field holding a page's items
const ITEMS_FIELD: &str = "items";

/// Field holding the next page's path
const NEXT_PAGE_FIELD: &str = "nextPagePath";

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Items on this page, in response order
    pub items: Vec<Value>,
    /// Path of the next page; `None` when this is the last one
    pub next_page_path: Option<String>,
}

impl Page {
    /// Split a response body into items and next-page path
    ///
    /// A null, empty or non-string `nextPagePath` ends pagination.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) if matches!(map.get(ITEMS_FIELD), Some(Value::Array(_))) => {
                let next_page_path = match map.remove(NEXT_PAGE_FIELD) {
                    Some(Value::String(path)) if !path.trim().is_empty() => Some(path),
                    _ => None,
                };
                let items = match map.remove(ITEMS_FIELD) {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                Self {
                    items,
                    next_page_path,
                }
            }
            Value::Array(items) => Self {
                items,
                next_page_path: None,
            },
            Value::Null => Self {
                items: Vec::new(),
                next_page_path: None,
            },
            other => Self {
                items: vec![other],
                next_page_path: None,
            },
        }
    }

    /// Whether another page follows
    pub fn has_next(&self) -> bool {
        self.next_page_path.is_some()
    }
}
