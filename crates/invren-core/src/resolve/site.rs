//! Step B: company name and address to site id.
//!
//! Name matches are collected first. The stages below then run in order;
//! each declares when it applies and either settles the outcome or passes.

use std::collections::BTreeSet;

use crate::catalog::{ReferenceCatalog, SiteRecord};
use crate::error::SiteResolutionError;
use crate::models::config::ResolutionConfig;
use crate::normalize::{brand_variants, extract_postal_code, normalize, normalize_address};

use super::scoring::{address_similarity, name_similarity, names_match};
use super::{Candidate, SiteStrategy};

/// A resolved site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMatch {
    pub site_id: String,
    pub strategy: SiteStrategy,
    /// Score of the deciding comparison, when there was one.
    pub score: Option<f64>,
}

impl SiteMatch {
    fn new(site: &SiteRecord, strategy: SiteStrategy, score: Option<f64>) -> Self {
        Self {
            site_id: site.site_id.clone(),
            strategy,
            score,
        }
    }
}

/// Everything a stage may look at.
struct SiteQuery<'a> {
    entreprise: &'a str,
    normalized: String,
    address: Option<String>,
    postal_code: Option<String>,
    eligible: Vec<&'a SiteRecord>,
    matches: Vec<&'a SiteRecord>,
    config: &'a ResolutionConfig,
}

impl SiteQuery<'_> {
    fn postal_conflict(&self, site: &SiteRecord) -> bool {
        matches!(
            (&self.postal_code, &site.postal_code),
            (Some(ours), Some(theirs)) if ours != theirs
        )
    }

    fn address_score(&self, site: &SiteRecord) -> f64 {
        self.address
            .as_deref()
            .map(|a| address_similarity(a, site))
            .unwrap_or(0.0)
    }

    fn name_score(&self, site: &SiteRecord) -> f64 {
        name_similarity(&self.normalized, site.normalized_name(), self.config)
    }

    fn same_postal(&self) -> Vec<&SiteRecord> {
        match &self.postal_code {
            Some(code) => self
                .eligible
                .iter()
                .copied()
                .filter(|s| s.postal_code.as_deref() == Some(code.as_str()))
                .collect(),
            None => Vec::new(),
        }
    }
}

type StageOutcome = Option<Result<SiteMatch, SiteResolutionError>>;

struct Stage {
    strategy: SiteStrategy,
    applies: fn(&SiteQuery<'_>) -> bool,
    run: fn(&SiteQuery<'_>, SiteStrategy) -> StageOutcome,
}

const STAGES: [Stage; 7] = [
    Stage {
        strategy: SiteStrategy::AddressSimilarity,
        applies: |q| q.matches.is_empty() && q.address.is_some(),
        run: by_address,
    },
    Stage {
        strategy: SiteStrategy::PostalCode,
        applies: |q| q.matches.is_empty() && q.postal_code.is_some(),
        run: by_postal_code,
    },
    Stage {
        strategy: SiteStrategy::SingleCorroborated,
        applies: |q| q.matches.len() == 1 && (q.postal_code.is_some() || q.address.is_some()),
        run: corroborate_single,
    },
    Stage {
        strategy: SiteStrategy::AddressDisambiguation,
        applies: |q| q.matches.len() > 1 && q.address.is_some(),
        run: disambiguate_by_address,
    },
    Stage {
        strategy: SiteStrategy::PostalScore,
        applies: |q| !q.matches.is_empty() && q.postal_code.is_some(),
        run: by_postal_score,
    },
    Stage {
        strategy: SiteStrategy::NameRanking,
        applies: |q| {
            q.matches.len() > 1
                && (q.postal_code.is_none() || q.matches.iter().all(|s| s.postal_code.is_none()))
        },
        run: by_name_rank,
    },
    Stage {
        strategy: SiteStrategy::UnvalidatedFallback,
        applies: |q| {
            q.matches.len() == 1
                && q.config.allow_unvalidated
                && (q.postal_code.is_none() || !q.matches[0].has_location())
        },
        run: |q, strategy| Some(Ok(SiteMatch::new(q.matches[0], strategy, None))),
    },
];

fn by_address(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    let mut scored: Vec<(&SiteRecord, f64)> = q
        .eligible
        .iter()
        .map(|&s| (s, q.address_score(s)))
        .filter(|(_, score)| *score >= q.config.address_match)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .first()
        .map(|&(site, score)| Ok(SiteMatch::new(site, strategy, Some(score))))
}

fn by_postal_code(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    let candidates = q.same_postal();
    if candidates.is_empty() {
        return None;
    }
    if q.normalized.is_empty() {
        return Some(match candidates.as_slice() {
            [only] => Ok(SiteMatch::new(only, strategy, None)),
            _ => Err(SiteResolutionError::AmbiguousSiteMatch {
                entreprise: q.entreprise.to_string(),
                candidates: candidates
                    .iter()
                    .map(|s| Candidate::new(&s.site_id, &s.canonical_name, 0.0))
                    .collect(),
            }),
        });
    }
    Some(pick_ranked(q, &candidates, strategy))
}

fn corroborate_single(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    let site = q.matches[0];
    if q.postal_code.is_some() && q.postal_code == site.postal_code {
        return Some(Ok(SiteMatch::new(site, strategy, Some(1.0))));
    }
    let score = q.address_score(site);
    (score >= q.config.single_match_address)
        .then(|| Ok(SiteMatch::new(site, strategy, Some(score))))
}

fn disambiguate_by_address(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    let mut scored: Vec<(&SiteRecord, f64)> =
        q.matches.iter().map(|&s| (s, q.address_score(s))).collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .find(|(site, score)| {
            *score >= q.config.address_override
                || (*score >= q.config.address_disambiguation && !q.postal_conflict(site))
        })
        .map(|(site, score)| Ok(SiteMatch::new(site, strategy, Some(score))))
}

fn by_postal_score(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    let mut scored: Vec<(&SiteRecord, f64)> = q
        .same_postal()
        .into_iter()
        .map(|s| {
            let name = q.name_score(s).min(1.0);
            let address = q.address_score(s);
            (s, q.config.name_weight * name + q.config.address_weight * address)
        })
        .filter(|(_, score)| *score >= q.config.combined_threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .first()
        .map(|&(site, score)| Ok(SiteMatch::new(site, strategy, Some(score))))
}

fn by_name_rank(q: &SiteQuery<'_>, strategy: SiteStrategy) -> StageOutcome {
    Some(pick_ranked(q, &q.matches, strategy))
}

/// Best candidate by name similarity, then shorter catalog name.
///
/// Equal on both counts is ambiguous.
fn pick_ranked(
    q: &SiteQuery<'_>,
    candidates: &[&SiteRecord],
    strategy: SiteStrategy,
) -> Result<SiteMatch, SiteResolutionError> {
    let mut scored: Vec<(&SiteRecord, f64)> =
        candidates.iter().map(|&s| (s, q.name_score(s))).collect();
    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| a.0.canonical_name.len().cmp(&b.0.canonical_name.len()))
    });

    let (best, best_score) = scored[0];
    let tied: Vec<Candidate> = scored
        .iter()
        .take_while(|(s, score)| {
            (score - best_score).abs() < 1e-9 && s.canonical_name.len() == best.canonical_name.len()
        })
        .map(|(s, score)| Candidate::new(&s.site_id, &s.canonical_name, *score))
        .collect();

    if tied.len() > 1 {
        return Err(SiteResolutionError::AmbiguousSiteMatch {
            entreprise: q.entreprise.to_string(),
            candidates: tied,
        });
    }
    Ok(SiteMatch::new(best, strategy, Some(best_score)))
}

/// Sites whose name matches, exact variant lookup first, then the
/// brand-aware containment test. Catalog order is preserved.
fn name_matches<'a>(
    entreprise: &str,
    normalized: &str,
    eligible: &[&'a SiteRecord],
    catalog: &ReferenceCatalog,
) -> Vec<&'a SiteRecord> {
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut keys = brand_variants(entreprise);
    let folded: Vec<String> = keys.iter().map(|k| normalize(k)).collect();
    keys.extend(folded);
    keys.insert(normalized.to_string());

    let exact: BTreeSet<&str> = keys
        .iter()
        .flat_map(|k| catalog.sites_for_key(k))
        .map(|s| s.site_id.as_str())
        .collect();

    let exact_matches: Vec<&SiteRecord> = eligible
        .iter()
        .copied()
        .filter(|s| exact.contains(s.site_id.as_str()))
        .collect();
    if !exact_matches.is_empty() {
        return exact_matches;
    }

    eligible
        .iter()
        .copied()
        .filter(|s| names_match(normalized, s.normalized_name()))
        .collect()
}

fn near_misses(q: &SiteQuery<'_>) -> Vec<Candidate> {
    let pool = if q.matches.is_empty() {
        &q.eligible
    } else {
        &q.matches
    };
    let mut scored: Vec<Candidate> = pool
        .iter()
        .map(|s| {
            let score = if q.normalized.is_empty() {
                q.address_score(s)
            } else {
                q.name_score(s).min(1.0)
            };
            Candidate::new(&s.site_id, &s.canonical_name, score)
        })
        .filter(|c| c.score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(q.config.near_miss_limit);
    scored
}

/// Run step B for sites served by `collector_key`.
///
/// `address` must already have the operator's own address removed.
pub fn resolve_site(
    entreprise: &str,
    collector_key: &str,
    address: Option<&str>,
    catalog: &ReferenceCatalog,
    config: &ResolutionConfig,
) -> Result<SiteMatch, SiteResolutionError> {
    let address = address.map(str::trim).filter(|a| !a.is_empty());
    let normalized = normalize(entreprise);
    let eligible: Vec<&SiteRecord> = catalog
        .sites()
        .iter()
        .filter(|s| s.serves(collector_key))
        .collect();
    let matches = name_matches(entreprise, &normalized, &eligible, catalog);

    let query = SiteQuery {
        entreprise,
        address: address.map(normalize_address).filter(|a| !a.is_empty()),
        postal_code: address.and_then(extract_postal_code),
        normalized,
        eligible,
        matches,
        config,
    };

    for stage in &STAGES {
        if !(stage.applies)(&query) {
            continue;
        }
        if let Some(outcome) = (stage.run)(&query, stage.strategy) {
            return outcome;
        }
    }

    Err(SiteResolutionError::NoSiteMatch {
        entreprise: entreprise.to_string(),
        address: address.map(str::to_string),
        postal_code: query.postal_code.clone(),
        near_misses: near_misses(&query),
    })
}
