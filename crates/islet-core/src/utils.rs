//! Small shared utilities.

/// Truncate a string to at most `max_bytes`, respecting char boundaries.
///
/// Appends an ellipsis marker when truncation occurred.
#[must_use]
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    format!("{}…", &s[..end])
}
