//! Free-text canonicalization for company, provider, and address strings.
//!
//! Every comparison in the resolver runs on the output of [`normalize`] or
//! [`normalize_address`], never on raw oracle text.

mod address;
mod brand;

pub use address::{
    extract_postal_code, house_number, normalize_address, street_name, STREET_ABBREVIATIONS,
};
pub use brand::{brand_family, brand_variants, BrandFamily, BRAND_FAMILIES};

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Remove combining accents: "Chalon-sur-Saône" becomes "Chalon-sur-Saone".
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Canonical form of a name.
///
/// Lower-cases, strips diacritics, drops apostrophes (so "McDonald's" and
/// "McDonalds" agree), turns other punctuation into spaces, and collapses
/// whitespace. `&` survives because it distinguishes trading names.
pub fn normalize(text: &str) -> String {
    let folded = strip_diacritics(&text.to_lowercase());
    let mut out = String::with_capacity(folded.len());

    for c in folded.chars() {
        match c {
            '\'' | '\u{2019}' | '`' => {}
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            c if c.is_alphanumeric() || c == '&' => out.push(c),
            _ => out.push(' '),
        }
    }

    collapse_whitespace(&out)
}

/// Split normalized text into word tokens.
///
/// Hyphens and periods are already spaces after [`normalize`], so
/// "VEOLIA-PROPRETE" and "veolia.proprete" both give `["veolia", "proprete"]`.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Join runs of whitespace with a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
