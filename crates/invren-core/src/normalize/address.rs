//! Address canonicalization and postal-code extraction.

use crate::patterns::POSTAL_CODE;

use super::normalize;

/// Whole-word street-type abbreviations applied before comparing addresses.
pub const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("avenue", "av"),
    ("boulevard", "bd"),
    ("saint", "st"),
    ("sainte", "ste"),
    ("place", "pl"),
    ("route", "rte"),
    ("chemin", "ch"),
    ("allee", "all"),
    ("impasse", "imp"),
    ("faubourg", "fg"),
    ("square", "sq"),
    ("quai", "qu"),
    ("residence", "res"),
];

/// Canonical form of an address.
///
/// Same folding as [`normalize`], then every word found in
/// [`STREET_ABBREVIATIONS`] is replaced by its abbreviation.
pub fn normalize_address(address: &str) -> String {
    normalize(address)
        .split_whitespace()
        .map(|word| {
            STREET_ABBREVIATIONS
                .iter()
                .find(|(long, _)| *long == word)
                .map(|(_, short)| *short)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First standalone five-digit token in an address.
pub fn extract_postal_code(address: &str) -> Option<String> {
    POSTAL_CODE
        .captures(address)
        .map(|caps| caps[1].to_string())
}

/// Leading street number of a normalized address ("34", "12bis").
pub fn house_number(normalized: &str) -> Option<&str> {
    let first = normalized.split_whitespace().next()?;
    let digits = first.chars().take_while(|c| c.is_ascii_digit()).count();
    (1..=4).contains(&digits).then_some(first)
}

/// Street part of a normalized address: the words between the house
/// number and the postal code.
pub fn street_name(normalized: &str) -> String {
    let mut words = normalized.split_whitespace().peekable();
    if words.peek().is_some_and(|w| house_number(w).is_some()) {
        words.next();
    }
    words
        .take_while(|w| !(w.len() == 5 && w.chars().all(|c| c.is_ascii_digit())))
        .collect::<Vec<_>>()
        .join(" ")
}
