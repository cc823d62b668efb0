//! Per-document planning: extraction fields in, target filename out.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::catalog::canonical_key;
use crate::compose::{choose_period_source, collector_label, compose_parts, site_hint_component, FilenameParts};
use crate::error::DocumentError;
use crate::models::config::NamingConfig;
use crate::models::extraction::ExtractionResult;
use crate::resolve::{EntityResolver, MatchConfidence, Resolution, SiteStrategy};

/// The computed name for one document. Renaming is left to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedName {
    pub filename: String,
    pub parts: FilenameParts,
    pub resolution: Resolution,
    pub confidence: MatchConfidence,
}

/// Turns extraction results into target filenames.
#[derive(Debug, Clone)]
pub struct Renamer {
    resolver: EntityResolver,
    naming: NamingConfig,
    hint_collectors: BTreeSet<String>,
}

impl Renamer {
    pub fn new(resolver: EntityResolver) -> Self {
        Self {
            resolver,
            naming: NamingConfig::default(),
            hint_collectors: BTreeSet::new(),
        }
    }

    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.hint_collectors = naming
            .site_hint_collectors
            .iter()
            .map(|key| canonical_key(key))
            .filter(|key| !key.is_empty())
            .collect();
        self.naming = naming;
        self
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    /// Resolve and compose the name for one document.
    pub fn plan(&self, extraction: &ExtractionResult) -> Result<PlannedName, DocumentError> {
        let provider = ExtractionResult::required(&extraction.provider, "provider")?;
        let date_source = choose_period_source(
            extraction.period.as_deref(),
            extraction.date.as_deref(),
        )
        .ok_or(DocumentError::MissingField("date"))?;
        let invoice_number =
            ExtractionResult::required(&extraction.invoice_number, "invoice_number")?;

        let collector = self.resolver.resolve_collector(provider)?;

        let hint = extraction
            .site_hint
            .as_deref()
            .filter(|_| self.hint_collectors.contains(&collector.key));
        let (site_id, site_strategy) = match hint {
            Some(hint) => {
                debug!("Using printed site id {:?} for {}", hint, collector.key);
                (site_hint_component(hint)?, SiteStrategy::SiteHint)
            }
            None => {
                let entreprise = ExtractionResult::required(&extraction.entreprise, "entreprise")?;
                let site = self.resolver.resolve_site(
                    entreprise,
                    &collector.key,
                    extraction.address.as_deref(),
                )?;
                (site.site_id, site.strategy)
            }
        };

        let label = if self.naming.waste_suffix {
            collector_label(
                &collector.key,
                self.resolver.catalog().collectors().combinations(&collector.key),
                &extraction.waste_types,
            )
        } else {
            collector.key.clone()
        };

        let parts = compose_parts(&site_id, &label, date_source, invoice_number)?;
        let filename = parts.with_extension(&self.naming.extension);

        let resolution = Resolution {
            site_id,
            collector_key: collector.key,
            collector_strategy: collector.strategy,
            site_strategy,
        };
        Ok(PlannedName {
            filename,
            parts,
            confidence: resolution.confidence(),
            resolution,
        })
    }
}
