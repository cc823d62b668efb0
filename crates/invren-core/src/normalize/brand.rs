//! Brand families: franchises whose name reaches us in several spellings.
//!
//! A family is pure data. Adding a franchise means adding a row to
//! [`BRAND_FAMILIES`]; nothing in the resolver branches on a brand name.

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::{collapse_whitespace, strip_diacritics};

/// One franchise and the ways it gets written.
#[derive(Debug)]
pub struct BrandFamily {
    /// Family identifier.
    pub name: &'static str,
    /// Location extractors, tried in order. Capture group 1 is the location.
    pub location_patterns: Vec<Regex>,
    /// Spellings generated in front of an extracted location.
    pub spellings: &'static [&'static str],
    /// The brand token as a whole word, in any spelling.
    brand_token: Regex,
}

impl BrandFamily {
    fn new(
        name: &'static str,
        location_patterns: &[&str],
        spellings: &'static [&'static str],
        brand_token: &str,
    ) -> Self {
        Self {
            name,
            location_patterns: location_patterns
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
            spellings,
            brand_token: Regex::new(brand_token).unwrap(),
        }
    }

    /// Whether a lower-cased name mentions this family.
    pub fn is_member(&self, lowered: &str) -> bool {
        self.brand_token.is_match(lowered)
    }

    /// Trailing location of a lower-cased name, from the first pattern that matches.
    pub fn location(&self, lowered: &str) -> Option<String> {
        self.location_patterns
            .iter()
            .find_map(|p| p.captures(lowered))
            .map(|caps| collapse_whitespace(&caps[1]))
            .filter(|loc| !loc.is_empty())
    }

    /// Normalized name with the brand token removed.
    pub fn strip(&self, normalized: &str) -> String {
        collapse_whitespace(&self.brand_token.replace_all(normalized, " "))
    }
}

lazy_static! {
    /// Known families, in lookup order.
    pub static ref BRAND_FAMILIES: Vec<BrandFamily> = vec![
        BrandFamily::new(
            "mcdonalds",
            &[
                r"mc\s*donald'?s?\s+(.+)",
                r"mac\s*do\s+(.+)",
                r"mac\s*donald'?s?\s+(.+)",
            ],
            &["mcdonald's", "mcdonalds", "mac do", "macdonald's", "macdonalds"],
            r"\b(?:mc\s*donald'?s?|mac\s*donald'?s?|mac\s*do)\b",
        ),
    ];
}

/// Family a name belongs to, if any.
pub fn brand_family(text: &str) -> Option<&'static BrandFamily> {
    let lowered = text.to_lowercase();
    BRAND_FAMILIES.iter().find(|f| f.is_member(&lowered))
}

/// Every lookup key a name can be indexed or queried under.
///
/// Always contains the lower-cased name itself. For a brand-family name
/// with a location it adds each family spelling followed by the location,
/// and the bare location. Any key holding an apostrophe also appears
/// without it.
pub fn brand_variants(name: &str) -> BTreeSet<String> {
    let lowered = collapse_whitespace(&strip_diacritics(&name.to_lowercase()).replace('\u{2019}', "'"));
    let mut variants = vec![lowered.clone()];

    if let Some(family) = BRAND_FAMILIES.iter().find(|f| f.is_member(&lowered)) {
        if let Some(location) = family.location(&lowered) {
            variants.extend(family.spellings.iter().map(|s| format!("{s} {location}")));
            variants.push(location);
        }
    }

    let mut keys = BTreeSet::new();
    for variant in variants {
        let cleaned = collapse_whitespace(&variant);
        if cleaned.is_empty() {
            continue;
        }
        if cleaned.contains('\'') {
            keys.insert(cleaned.replace('\'', ""));
        }
        keys.insert(cleaned);
    }
    keys
}
