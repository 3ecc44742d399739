//! Names the context owns

/// Transient binding for the live session handle
pub const SESSION_BINDING: &str = "srv";

/// Type object for session handles
pub const SESSION_TYPE_BINDING: &str = "Session";

/// Library namespaces installed on every reset
pub const LIBRARY_BINDINGS: &[&str] = &["math", "json", "time"];

/// Longest preview a snapshot reports, in characters
pub const PREVIEW_LIMIT: usize = 80;

/// Whether `name` belongs to the context rather than to user code
pub fn is_reserved(name: &str) -> bool {
    name.starts_with("__")
        || name == SESSION_BINDING
        || name == SESSION_TYPE_BINDING
        || LIBRARY_BINDINGS.contains(&name)
}

/// Cut `text` to [`PREVIEW_LIMIT`] characters, ending in `...` when shortened
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
    preview.push_str("...");
    preview
}
