//! Heading classification for plain paragraphs.

use std::sync::LazyLock;

use regex::Regex;

use super::types::UNKNOWN;

static OUTLINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*\.?\s+.+").unwrap());
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+(?:\.\d+)*)\.?").unwrap());

const SHORT_HEADING_CHARS: usize = 100;

/// A paragraph is a heading when it is a numbered outline entry, is all
/// upper-case and longer than 3 characters, or is short and does not end a
/// sentence.
#[must_use]
pub fn is_heading(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() {
        return false;
    }
    if OUTLINE_RE.is_match(text) {
        return true;
    }
    if text.chars().count() > 3 && is_upper(text) {
        return true;
    }
    text.chars().count() < SHORT_HEADING_CHARS && !text.ends_with(['.', '!', '?'])
}

/// Leading dotted number of a heading, without a trailing period.
///
/// Returns `"Unknown"` when the heading is not numbered.
#[must_use]
pub fn extract_section_number(text: &str) -> String {
    SECTION_RE
        .captures(text.trim())
        .and_then(|c| c.get(1))
        .map_or_else(|| UNKNOWN.to_owned(), |m| m.as_str().to_owned())
}

/// True when the text has cased letters and none of them are lower-case.
fn is_upper(text: &str) -> bool {
    let mut has_cased = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            has_cased = true;
        }
    }
    has_cased
}
