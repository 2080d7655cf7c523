pub mod gemini;
pub mod serpapi;

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
