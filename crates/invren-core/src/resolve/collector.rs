//! Step A: provider text to canonical collector key.
//!
//! Four tiers run in a fixed order over the directory's recognisable names
//! (longest first). The first tier to produce a name wins.

use std::collections::BTreeSet;

use crate::catalog::{CollectorDirectory, CollectorName};
use crate::error::CollectorResolutionError;
use crate::models::config::ResolutionConfig;
use crate::normalize::{collapse_whitespace, normalize};

use super::scoring::ratio;
use super::{Candidate, CollectorStrategy};

/// A recognised collector.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorMatch {
    pub key: String,
    pub strategy: CollectorStrategy,
    /// The directory spelling that matched.
    pub matched: String,
}

/// Provider text prepared for matching.
struct ProviderText {
    normalized: String,
    words: Vec<String>,
    word_set: BTreeSet<String>,
}

impl ProviderText {
    fn new(normalized: String) -> Self {
        let words: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
        let word_set = words.iter().cloned().collect();
        Self {
            normalized,
            words,
            word_set,
        }
    }
}

/// Names the tiers may pick from, with the directory they came from.
struct NamePool<'a> {
    directory: &'a CollectorDirectory,
    names: Vec<&'a CollectorName>,
}

type Tier = for<'a> fn(&ProviderText, &NamePool<'a>, &ResolutionConfig) -> Option<&'a CollectorName>;

const TIERS: [(CollectorStrategy, Tier); 4] = [
    (CollectorStrategy::ExactAlias, exact_alias),
    (CollectorStrategy::WordSet, word_set),
    (CollectorStrategy::Substring, substring),
    (CollectorStrategy::Similarity, similarity),
];

fn exact_alias<'a>(
    text: &ProviderText,
    pool: &NamePool<'a>,
    _config: &ResolutionConfig,
) -> Option<&'a CollectorName> {
    let key = pool.directory.lookup(&text.normalized)?;
    pool.names
        .iter()
        .copied()
        .find(|n| n.key == key && n.normalized == text.normalized)
}

fn word_set<'a>(
    text: &ProviderText,
    pool: &NamePool<'a>,
    _config: &ResolutionConfig,
) -> Option<&'a CollectorName> {
    pool.names
        .iter()
        .copied()
        .find(|n| !n.words.is_empty() && n.words.iter().all(|w| text.word_set.contains(w)))
}

fn substring<'a>(
    text: &ProviderText,
    pool: &NamePool<'a>,
    _config: &ResolutionConfig,
) -> Option<&'a CollectorName> {
    pool.names
        .iter()
        .copied()
        .find(|n| !n.normalized.is_empty() && text.normalized.contains(&n.normalized))
}

fn similarity<'a>(
    text: &ProviderText,
    pool: &NamePool<'a>,
    config: &ResolutionConfig,
) -> Option<&'a CollectorName> {
    let mut best: Option<(&'a CollectorName, f64)> = None;
    for &name in &pool.names {
        let score = similarity_score(text, name);
        // strict comparison keeps the earlier (longer) name on ties
        if score >= config.collector_similarity && best.is_none_or(|(_, s)| score > s) {
            best = Some((name, score));
        }
    }
    best.map(|(name, _)| name)
}

/// Best ratio of a name against the whole text, each token, and each run
/// of as many tokens as the name has words.
fn similarity_score(text: &ProviderText, name: &CollectorName) -> f64 {
    let mut best = ratio(&text.normalized, &name.normalized);
    for word in &text.words {
        best = best.max(ratio(word, &name.normalized));
    }
    let width = name.words.len();
    if width > 1 && text.words.len() >= width {
        for window in text.words.windows(width) {
            best = best.max(ratio(&window.join(" "), &name.normalized));
        }
    }
    best
}

/// Remove the operator's own names from the provider text.
fn strip_operator(normalized: &str, operator_names: &[String]) -> String {
    let mut padded = format!(" {normalized} ");
    for name in operator_names {
        if name.is_empty() {
            continue;
        }
        padded = padded.replace(&format!(" {name} "), " ");
    }
    collapse_whitespace(&padded)
}

fn is_operator_name(name: &CollectorName, operator_names: &[String]) -> bool {
    operator_names
        .iter()
        .any(|op| !op.is_empty() && (name.normalized == *op || name.normalized.contains(op.as_str())))
}

/// Run the tiers against `provider`.
///
/// `operator_names` must already be normalized.
pub fn resolve_collector(
    provider: &str,
    directory: &CollectorDirectory,
    operator_names: &[String],
    config: &ResolutionConfig,
) -> Result<CollectorMatch, CollectorResolutionError> {
    let normalized = normalize(provider);
    let remaining = strip_operator(&normalized, operator_names);

    if remaining.is_empty() {
        return Err(CollectorResolutionError::NoCollectorMatch {
            provider: provider.to_string(),
            near_misses: Vec::new(),
            operator_excluded: !normalized.is_empty(),
        });
    }

    let pool = NamePool {
        directory,
        names: directory
            .names()
            .iter()
            .filter(|n| !is_operator_name(n, operator_names))
            .collect(),
    };
    let text = ProviderText::new(remaining);

    let found = TIERS
        .iter()
        .find_map(|(strategy, tier)| tier(&text, &pool, config).map(|name| (*strategy, name)));

    match found {
        Some((strategy, name)) => {
            if !directory.is_approved(&name.key) {
                return Err(CollectorResolutionError::UnapprovedCollector {
                    provider: provider.to_string(),
                    key: name.key.clone(),
                    strategy,
                });
            }
            Ok(CollectorMatch {
                key: name.key.clone(),
                strategy,
                matched: name.normalized.clone(),
            })
        }
        None => Err(CollectorResolutionError::NoCollectorMatch {
            provider: provider.to_string(),
            near_misses: near_misses(&text, &pool.names, 3),
            operator_excluded: false,
        }),
    }
}

fn near_misses(text: &ProviderText, names: &[&CollectorName], limit: usize) -> Vec<Candidate> {
    let mut scored: Vec<Candidate> = names
        .iter()
        .map(|n| Candidate::new(&n.key, &n.normalized, similarity_score(text, n)))
        .filter(|c| c.score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.label.cmp(&b.label))
    });

    let mut seen = BTreeSet::new();
    scored.retain(|c| seen.insert(c.id.clone()));
    scored.truncate(limit);
    scored
}
