//! Normalization of raw OCR output.

use std::sync::LazyLock;

use regex::Regex;

/// Returned when OCR produced no usable text.
pub const NO_TEXT_PLACEHOLDER: &str = "No text detected in document";

static INLINE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Tidy raw OCR text.
///
/// Lines are trimmed and their internal whitespace runs collapsed, blank
/// lines are dropped, and the result is trimmed. Empty output becomes
/// [`NO_TEXT_PLACEHOLDER`].
pub fn clean_ocr_text(raw: &str) -> String {
    let lines: Vec<String> = raw
        .lines()
        .map(|line| INLINE_WHITESPACE.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect();

    let joined = lines.join("\n");
    let cleaned = EXCESS_NEWLINES.replace_all(&joined, "\n\n");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        NO_TEXT_PLACEHOLDER.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_blank_lines() {
        assert_eq!(
            clean_ocr_text("Line one   \n\n\n\nLine   two\n\n\n"),
            "Line one\nLine two"
        );
    }

    #[test]
    fn test_tabs_and_crlf() {
        assert_eq!(
            clean_ocr_text("  Anno\t\tDomini \r\n\r\n 1723\r\n"),
            "Anno Domini\n1723"
        );
    }

    #[test]
    fn test_empty_yields_placeholder() {
        assert_eq!(clean_ocr_text(""), NO_TEXT_PLACEHOLDER);
        assert_eq!(clean_ocr_text(" \n\t\n "), NO_TEXT_PLACEHOLDER);
    }
}
