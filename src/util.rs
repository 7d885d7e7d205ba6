/// Truncate a string to at most `max_chars` characters (Unicode-safe, no marker)
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Truncate for display, appending `...` when anything was cut
pub fn truncate(s: &str, max: usize) -> String {
    if max == 0 {
        return String::new();
    }

    let char_count = s.chars().count();
    if char_count <= max {
        return s.to_string();
    }

    if max <= 3 {
        return s.chars().take(max).collect();
    }

    let truncated: String = s.chars().take(max - 3).collect();
    format!("{}...", truncated)
}

/// Split a pasted error into its headline and the remaining trace lines.
///
/// The headline is the first non-blank line. Returns `None` for the trace
/// when nothing follows it.
pub fn split_headline(text: &str) -> (String, Option<String>) {
    let trimmed = text.trim();
    match trimmed.split_once('\n') {
        Some((head, rest)) if !rest.trim().is_empty() => {
            (head.trim().to_string(), Some(rest.trim_end().to_string()))
        }
        Some((head, _)) => (head.trim().to_string(), None),
        None => (trimmed.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_is_char_safe() {
        assert_eq!(truncate_str("héllo", 2), "hé");
        assert_eq!(truncate_str("abc", 10), "abc");
        assert_eq!(truncate_str("abc", 0), "");
    }

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("abcdefgh", 6), "abc...");
        assert_eq!(truncate("abc", 6), "abc");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_split_headline() {
        let (head, trace) = split_headline("\nTypeError: boom\n    at f (a.js:1:1)\n");
        assert_eq!(head, "TypeError: boom");
        assert_eq!(trace.as_deref(), Some("    at f (a.js:1:1)"));

        let (head, trace) = split_headline("just one line");
        assert_eq!(head, "just one line");
        assert!(trace.is_none());
    }
}
