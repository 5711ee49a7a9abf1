//! Filename derivation for fetched items.
//!
//! Filenames are a pure function of the catalog row, so a second run over
//! the same catalog lands on the same path and finds the file already there.

use super::constants::{DEFAULT_EXTENSION, MAX_STEM_LEN};

/// Derives the on-disk filename for an item.
///
/// Keeps ASCII letters, digits, space, `.`, `_` and `-`; collapses runs of
/// spaces; trims surrounding spaces and dots; then appends the lowercase
/// file type (`bin` when empty). An empty stem falls back to the key.
///
/// ```
/// use catalog_dl::fetch::derive_filename;
///
/// assert_eq!(derive_filename("Sci-Fi: Foundation?", "epub", "9b2d"), "Sci-Fi Foundation.epub");
/// assert_eq!(derive_filename("???", "PDF", "9b2d"), "9b2d.pdf");
/// ```
#[must_use]
pub fn derive_filename(title: &str, file_type: &str, key: &str) -> String {
    let mut stem = sanitize_stem(title);
    if stem.is_empty() {
        stem = sanitize_stem(key);
    }
    if stem.is_empty() {
        stem = "item".to_string();
    }

    let extension: String = file_type
        .trim()
        .trim_start_matches('.')
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let extension = if extension.is_empty() {
        DEFAULT_EXTENSION.to_string()
    } else {
        extension
    };

    format!("{stem}.{extension}")
}

/// Returns the temporary file name used while `filename` is being written.
pub(crate) fn part_filename(filename: &str, tag: &str) -> String {
    let tag: String = tag
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    format!(".{filename}.{tag}.{}", super::constants::PART_SUFFIX)
}

fn sanitize_stem(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_space = false;
    for c in value.chars() {
        let keep = c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-');
        if !keep {
            continue;
        }
        if c == ' ' {
            if last_space {
                continue;
            }
            last_space = true;
        } else {
            last_space = false;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == ' ' || c == '.');
    let mut stem: String = trimmed.chars().take(MAX_STEM_LEN).collect();
    // Truncation can expose a trailing space or dot again.
    while stem.ends_with([' ', '.']) {
        stem.pop();
    }
    stem
}
