//! Entity resolution: noisy (company, provider, address) to canonical ids.

mod collector;
mod scoring;
mod site;

pub use collector::{resolve_collector, CollectorMatch};
pub use scoring::{address_similarity, name_similarity, names_match, ratio, same_address};
pub use site::{resolve_site, SiteMatch};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::ReferenceCatalog;
use crate::error::{CollectorResolutionError, ResolutionError, SiteResolutionError};
use crate::models::config::{OperatorConfig, ResolutionConfig};
use crate::normalize::normalize;
use crate::observe::{Observer, ResolutionEvent, TracingObserver};

/// Step A tiers, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorStrategy {
    ExactAlias,
    WordSet,
    Substring,
    Similarity,
}

impl fmt::Display for CollectorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectorStrategy::ExactAlias => "exact alias",
            CollectorStrategy::WordSet => "word set",
            CollectorStrategy::Substring => "substring",
            CollectorStrategy::Similarity => "similarity",
        };
        f.write_str(name)
    }
}

/// How step B settled on a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStrategy {
    /// The invoice printed the site id.
    SiteHint,
    AddressSimilarity,
    PostalCode,
    SingleCorroborated,
    AddressDisambiguation,
    PostalScore,
    NameRanking,
    UnvalidatedFallback,
}

impl SiteStrategy {
    pub fn confidence(self) -> MatchConfidence {
        match self {
            SiteStrategy::SiteHint
            | SiteStrategy::SingleCorroborated
            | SiteStrategy::AddressDisambiguation
            | SiteStrategy::PostalScore => MatchConfidence::Corroborated,
            SiteStrategy::AddressSimilarity | SiteStrategy::PostalCode => {
                MatchConfidence::LocationOnly
            }
            SiteStrategy::NameRanking => MatchConfidence::NameRanked,
            SiteStrategy::UnvalidatedFallback => MatchConfidence::Unvalidated,
        }
    }
}

impl fmt::Display for SiteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SiteStrategy::SiteHint => "site hint",
            SiteStrategy::AddressSimilarity => "address similarity",
            SiteStrategy::PostalCode => "postal code",
            SiteStrategy::SingleCorroborated => "corroborated name",
            SiteStrategy::AddressDisambiguation => "address disambiguation",
            SiteStrategy::PostalScore => "postal code score",
            SiteStrategy::NameRanking => "name ranking",
            SiteStrategy::UnvalidatedFallback => "unvalidated fallback",
        };
        f.write_str(name)
    }
}

/// Confidence tier reported alongside every resolved site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// Name and location agree.
    Corroborated,
    /// Found by location, the name did not help.
    LocationOnly,
    /// Several names matched; the closest was taken.
    NameRanked,
    /// A single name match nothing could confirm or contradict.
    Unvalidated,
}

impl fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchConfidence::Corroborated => "corroborated",
            MatchConfidence::LocationOnly => "location only",
            MatchConfidence::NameRanked => "name ranked",
            MatchConfidence::Unvalidated => "unvalidated",
        };
        f.write_str(name)
    }
}

/// A ranked near miss carried by failures for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Site id or collector key.
    pub id: String,
    /// Name the score was computed against.
    pub label: String,
    pub score: f64,
}

impl Candidate {
    pub fn new(id: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            score,
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:.2})", self.id, self.label, self.score)
    }
}

/// A successful resolution. Never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub site_id: String,
    pub collector_key: String,
    pub collector_strategy: CollectorStrategy,
    pub site_strategy: SiteStrategy,
}

impl Resolution {
    pub fn confidence(&self) -> MatchConfidence {
        self.site_strategy.confidence()
    }
}

pub type ResolutionOutcome = Result<Resolution, ResolutionError>;

/// Resolves extraction fields against an immutable catalog.
///
/// Cheap to clone and safe to share between workers.
#[derive(Clone)]
pub struct EntityResolver {
    catalog: Arc<ReferenceCatalog>,
    config: ResolutionConfig,
    operator_names: Vec<String>,
    operator_addresses: Vec<String>,
    observer: Arc<dyn Observer>,
}

impl EntityResolver {
    pub fn new(catalog: Arc<ReferenceCatalog>) -> Self {
        Self {
            catalog,
            config: ResolutionConfig::default(),
            operator_names: Vec::new(),
            operator_addresses: Vec::new(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_config(mut self, config: ResolutionConfig) -> Self {
        self.config = config;
        self
    }

    /// Names and addresses that belong to the operator, never to a collector or site.
    pub fn with_operator(mut self, operator: &OperatorConfig) -> Self {
        self.operator_names = operator
            .names
            .iter()
            .map(|n| normalize(n))
            .filter(|n| !n.is_empty())
            .collect();
        self.operator_addresses = operator
            .addresses
            .iter()
            .filter(|a| !a.trim().is_empty())
            .cloned()
            .collect();
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Run step A then step B.
    pub fn resolve(
        &self,
        entreprise: &str,
        provider: &str,
        address: Option<&str>,
    ) -> ResolutionOutcome {
        let collector = self.resolve_collector(provider)?;
        let site = self.resolve_site(entreprise, &collector.key, address)?;

        Ok(Resolution {
            site_id: site.site_id,
            collector_key: collector.key,
            collector_strategy: collector.strategy,
            site_strategy: site.strategy,
        })
    }

    /// Step A only.
    pub fn resolve_collector(
        &self,
        provider: &str,
    ) -> Result<CollectorMatch, CollectorResolutionError> {
        let found = resolve_collector(
            provider,
            self.catalog.collectors(),
            &self.operator_names,
            &self.config,
        )?;

        self.observer
            .on_resolution(&ResolutionEvent::CollectorResolved {
                provider: provider.to_string(),
                key: found.key.clone(),
                strategy: found.strategy,
            });
        Ok(found)
    }

    /// Step B only, for sites served by `collector_key`.
    pub fn resolve_site(
        &self,
        entreprise: &str,
        collector_key: &str,
        address: Option<&str>,
    ) -> Result<SiteMatch, SiteResolutionError> {
        let address = self.screen_address(address);
        let found = resolve_site(
            entreprise,
            collector_key,
            address,
            &self.catalog,
            &self.config,
        )?;

        if found.strategy == SiteStrategy::UnvalidatedFallback {
            self.observer
                .on_resolution(&ResolutionEvent::UnvalidatedFallback {
                    entreprise: entreprise.to_string(),
                    site_id: found.site_id.clone(),
                });
        }
        self.observer.on_resolution(&ResolutionEvent::SiteResolved {
            entreprise: entreprise.to_string(),
            site_id: found.site_id.clone(),
            strategy: found.strategy,
        });
        Ok(found)
    }

    /// Drop the address when it is the operator's own.
    fn screen_address<'a>(&self, address: Option<&'a str>) -> Option<&'a str> {
        let address = address?;
        let own = self
            .operator_addresses
            .iter()
            .any(|own| same_address(address, own, 0.9));
        if own {
            self.observer
                .on_resolution(&ResolutionEvent::OperatorAddressDiscarded {
                    address: address.to_string(),
                });
            return None;
        }
        Some(address)
    }
}

impl fmt::Debug for EntityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityResolver")
            .field("sites", &self.catalog.len())
            .field("collectors", &self.catalog.collectors().len())
            .field("operator_names", &self.operator_names)
            .finish()
    }
}
