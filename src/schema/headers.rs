//! Header derivation, display names and header drift detection

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::MAX_DEPTH;

/// Derive the leaf paths of `sample`, depth-first in field order
///
/// A top-level array is described by its first element. Empty arrays and
/// empty objects keep their own path as a column. When nothing can be
/// derived, `fallback` is returned.
pub fn derive_headers(sample: &Value, fallback: &[String]) -> Vec<String> {
    let root = match sample {
        Value::Array(items) => items.first(),
        other => Some(other),
    };

    let mut headers = Vec::new();
    if let Some(Value::Object(fields)) = root {
        for (name, value) in fields {
            collect_paths(value, name.clone(), 1, &mut headers);
        }
    }

    let mut seen = HashSet::new();
    headers.retain(|path| seen.insert(path.clone()));

    if headers.is_empty() {
        fallback.to_vec()
    } else {
        headers
    }
}

fn collect_paths(value: &Value, path: String, depth: usize, out: &mut Vec<String>) {
    if depth >= MAX_DEPTH {
        out.push(path);
        return;
    }

    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (name, child) in fields {
                collect_paths(child, format!("{path}.{name}"), depth + 1, out);
            }
        }
        Value::Array(items) => match items.first() {
            Some(first) => collect_paths(first, path, depth + 1, out),
            None => out.push(path),
        },
        _ => out.push(path),
    }
}

/// Column definition persisted per resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMapping {
    /// Dot-separated source path
    pub original_path: String,
    /// Column title
    pub display_name: String,
    /// Whether the title was set by the user rather than generated
    #[serde(default)]
    pub is_user_override: bool,
}

impl HeaderMapping {
    /// Mapping with a generated display name
    pub fn new(original_path: impl Into<String>) -> Self {
        let original_path = original_path.into();
        Self {
            display_name: display_name_for(&original_path),
            original_path,
            is_user_override: false,
        }
    }

    /// Mapping with a user-chosen display name
    pub fn with_display_name(
        original_path: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            original_path: original_path.into(),
            display_name: display_name.into(),
            is_user_override: true,
        }
    }

    /// Generated mappings for a header list
    pub fn from_paths(paths: &[String]) -> Vec<Self> {
        paths.iter().map(Self::new).collect()
    }
}

/// Readable column title for a header path
///
/// Segments and camelCase words become capitalized words:
/// `"amount.value"` gives `"Amount Value"`, `"dateTime"` gives `"Date Time"`.
pub fn display_name_for(path: &str) -> String {
    let mut words: Vec<String> = Vec::new();

    for segment in path.split(['.', '_']) {
        let mut current = String::new();
        let mut previous: Option<char> = None;
        for ch in segment.chars() {
            let boundary = ch.is_uppercase()
                && previous.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit());
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(ch);
            previous = Some(ch);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }

    words
        .iter()
        .map(|word| capitalize(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Paths that appeared or disappeared relative to a stored header list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderDiff {
    /// Observed paths missing from the stored list, in observed order
    pub added: Vec<String>,
    /// Stored paths no longer observed, in stored order
    pub removed: Vec<String>,
}

impl HeaderDiff {
    /// Whether the lists contain the same paths
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare a stored header list with the paths observed in fresh data
pub fn diff_headers(stored: &[String], observed: &[String]) -> HeaderDiff {
    let stored_set: HashSet<&str> = stored.iter().map(String::as_str).collect();
    let observed_set: HashSet<&str> = observed.iter().map(String::as_str).collect();

    HeaderDiff {
        added: observed
            .iter()
            .filter(|path| !stored_set.contains(path.as_str()))
            .cloned()
            .collect(),
        removed: stored
            .iter()
            .filter(|path| !observed_set.contains(path.as_str()))
            .cloned()
            .collect(),
    }
}
