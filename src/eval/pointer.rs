//! Pointer lookups against the current data cursor.
//!
//! Pointers follow RFC 6901 (`/a/0/b`, `~1` for `/`, `~0` for `~`). Lookups are
//! total: a path that does not exist resolves to `null`.

use serde_json::Value;

pub const ROOT: &str = "/";

pub fn is_pointer(s: &str) -> bool {
    s.starts_with('/')
}

pub fn lookup(root: &Value, pointer: &str) -> Value {
    if pointer == ROOT {
        return root.clone();
    }
    root.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Builds a pointer from raw segments, escaping `~` and `/`.
pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> String {
    if segments.is_empty() {
        return ROOT.to_string();
    }
    segments
        .iter()
        .map(|segment| format!("/{}", segment.as_ref().replace('~', "~0").replace('/', "~1")))
        .collect()
}
