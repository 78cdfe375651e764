//! Name normalization for uniqueness checks.
//!
//! Names are compared on a folded key: trimmed, internal whitespace
//! collapsed, lowercased, and with diacritics removed ("Sódica" and
//! "SODICA" collide). The stored display name is never altered.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Folds a display name into its comparison key.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when two display names fold to the same key.
pub fn same_name(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// Trims and collapses whitespace, keeping case and accents.
pub fn tidy_display_name(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}
