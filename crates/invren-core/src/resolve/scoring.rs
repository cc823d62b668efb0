//! Similarity measures shared by both resolution steps.

use strsim::normalized_levenshtein;

use crate::catalog::SiteRecord;
use crate::models::config::ResolutionConfig;
use crate::normalize::{
    brand_family, extract_postal_code, house_number, normalize_address, street_name,
};

/// Edit-distance ratio in 0.0 - 1.0. Empty input never matches.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    normalized_levenshtein(a, b)
}

/// Both names with the brand token removed when they share a family.
fn comparable(query: &str, candidate: &str) -> (String, String) {
    match (brand_family(query), brand_family(candidate)) {
        (Some(a), Some(b)) if a.name == b.name => (a.strip(query), b.strip(candidate)),
        _ => (query.to_string(), candidate.to_string()),
    }
}

/// Brand-aware name test used to collect step-B name matches.
///
/// Both arguments are normalized names.
pub fn names_match(query: &str, candidate: &str) -> bool {
    if query.is_empty() || candidate.is_empty() {
        return false;
    }

    match (brand_family(query), brand_family(candidate)) {
        (Some(a), Some(b)) if a.name == b.name => {
            let q = a.strip(query);
            let c = b.strip(candidate);
            if q.is_empty() || c.is_empty() {
                return false;
            }
            if q.contains(&c) || c.contains(&q) {
                return true;
            }
            q.split_whitespace()
                .filter(|t| t.len() > 2)
                .any(|t| c.split_whitespace().any(|u| u == t))
        }
        _ => query == candidate || query.contains(candidate) || candidate.contains(query),
    }
}

/// Name similarity with the exact-match boost and superstring penalty.
///
/// May exceed 1.0 on an exact match; callers weighting it clamp first.
pub fn name_similarity(query: &str, candidate: &str, config: &ResolutionConfig) -> f64 {
    let (q, c) = comparable(query, candidate);
    let mut score = ratio(&q, &c);
    if q.is_empty() || c.is_empty() {
        return score;
    }
    if q == c {
        score += config.exact_name_boost;
    } else if c.contains(&q) {
        score -= config.superstring_penalty;
    }
    score.max(0.0)
}

/// Similarity between an already normalized invoice address and a site's.
pub fn address_similarity(normalized_address: &str, site: &SiteRecord) -> f64 {
    ratio(normalized_address, site.normalized_address())
}

/// Whether two addresses describe the same place.
///
/// Outside an exact match, both need the same house number and a street
/// name at `threshold` or above; postal codes must agree when both carry one.
pub fn same_address(a: &str, b: &str, threshold: f64) -> bool {
    let a = normalize_address(a);
    let b = normalize_address(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    match (house_number(&a), house_number(&b)) {
        (Some(x), Some(y)) if x == y => {}
        _ => return false,
    }
    if let (Some(x), Some(y)) = (extract_postal_code(&a), extract_postal_code(&b)) {
        if x != y {
            return false;
        }
    }

    let (street_a, street_b) = (street_name(&a), street_name(&b));
    street_a == street_b || ratio(&street_a, &street_b) >= threshold
}
