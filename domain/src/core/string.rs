//! String helpers for log lines and transcripts.

/// One-line preview of `s`, at most `max_bytes` long plus an ellipsis.
///
/// Newlines and runs of whitespace collapse to single spaces. The cut
/// always falls on a UTF-8 character boundary.
pub fn preview(s: &str, max_bytes: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= max_bytes {
        return flat;
    }
    let mut end = max_bytes;
    while end > 0 && !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}
