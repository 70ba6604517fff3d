use std::borrow::Cow;

/// Ellipsis appended by [`truncate_chars`].
const ELLIPSIS: &str = "...";

fn is_stripped(c: char) -> bool {
    c == '\u{7f}' || (c.is_control() && c != '\t' && c != '\n' && c != '\r')
}

/// Removes control characters from imported text.
///
/// Tab, newline and carriage return are kept. Everything else in the C0 range,
/// DEL and the C1 range is dropped. Titles and folder names come straight out of
/// user-supplied documents and end up in logs and exported OPML, so they are
/// passed through here first.
///
/// Returns `Cow::Borrowed` when nothing needed removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|&c| !is_stripped(c)).collect())
}

/// Cleans a title pulled out of an OPML or reader document.
///
/// Control characters are stripped, runs of whitespace collapse to a single
/// space and the result is trimmed. Returns `None` when nothing is left.
pub fn clean_title(s: &str) -> Option<String> {
    let stripped = strip_control_chars(s);
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

/// Truncates to at most `max_chars` characters, appending "..." when cut.
///
/// Used for log lines, which only show the head of long story titles.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        None => Cow::Borrowed(s),
        Some((idx, _)) => Cow::Owned(format!("{}{}", &s[..idx], ELLIPSIS)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Hello, world! This is clean text.";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_control_chars_removes_controls() {
        let input = "he\x00ll\x07o\x08 w\x0bor\x0cld\x01!\x7f";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Owned(_)));
        assert_eq!(result, "hello world!");
    }

    #[test]
    fn test_clean_title_collapses_whitespace() {
        assert_eq!(
            clean_title("  Tech \n\t News  ").as_deref(),
            Some("Tech News")
        );
    }

    #[test]
    fn test_clean_title_empty_is_none() {
        assert_eq!(clean_title("   "), None);
        assert_eq!(clean_title("\x01\x02"), None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("Short", 10), "Short");
        assert_eq!(truncate_chars("Hello World", 5), "Hello...");
        // Multi-byte characters are counted, not bytes
        assert_eq!(truncate_chars("héllo wörld", 7), "héllo w...");
    }
}
