use once_cell::sync::Lazy;
use regex::Regex;

static WS_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws run"));

/// Trim and collapse every internal whitespace run to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    WS_RUN_RE.replace_all(text.trim(), " ").into_owned()
}

/// A token body made only of underscores and spaces is a blank, not a name.
pub fn is_blank_token(inner: &str) -> bool {
    inner.chars().all(|c| c == '_' || c.is_whitespace())
}

pub fn floor_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Byte offset `max_chars` characters before `end` (clamped to 0).
pub fn char_window_start(text: &str, end: usize, max_chars: usize) -> usize {
    let end = floor_char_boundary(text, end);
    if max_chars == 0 {
        return end;
    }
    text[..end]
        .char_indices()
        .rev()
        .nth(max_chars - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Byte offset `max_chars` characters after `start` (clamped to the end).
pub fn char_window_end(text: &str, start: usize, max_chars: usize) -> usize {
    let start = floor_char_boundary(text, start);
    text[start..]
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len())
}

/// True when the two byte offsets are at most `limit` characters apart.
pub fn within_chars(text: &str, a: usize, b: usize, limit: usize) -> bool {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let lo = floor_char_boundary(text, lo);
    let hi = floor_char_boundary(text, hi);
    let bytes = hi - lo;
    if bytes <= limit {
        return true;
    }
    // A char is at most 4 bytes in UTF-8.
    if bytes > limit.saturating_mul(4) {
        return false;
    }
    text[lo..hi].chars().count() <= limit
}
