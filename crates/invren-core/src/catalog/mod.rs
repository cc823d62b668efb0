//! Reference catalog: the site directory and the collector directory.
//!
//! Both are loaded once at startup and never mutated afterwards, which is
//! what lets the resolver run from several workers without locking.

mod loader;

pub use loader::{load_collectors, load_sites};

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::CatalogError;
use crate::models::config::CatalogConfig;
use crate::normalize::{
    brand_variants, collapse_whitespace, extract_postal_code, normalize, normalize_address, tokens,
};

/// Canonical spelling of a collector key: trimmed, single-spaced, upper-case.
pub fn canonical_key(key: &str) -> String {
    collapse_whitespace(key).to_uppercase()
}

/// One restaurant site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    /// Unique site identifier.
    pub site_id: String,
    /// Name as written in the site directory.
    pub canonical_name: String,
    /// Street address, possibly empty.
    pub address: String,
    /// Postal code, from its own column or read out of the address.
    pub postal_code: Option<String>,
    /// Collectors serving this site. Empty means any collector.
    pub collectors: BTreeSet<String>,
    normalized_name: String,
    normalized_address: String,
}

impl SiteRecord {
    pub fn new(
        site_id: impl Into<String>,
        canonical_name: impl Into<String>,
        address: impl Into<String>,
        postal_code: Option<String>,
    ) -> Self {
        let canonical_name = canonical_name.into();
        let address = address.into();
        let postal_code = postal_code
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .or_else(|| extract_postal_code(&address));

        Self {
            site_id: site_id.into().trim().to_string(),
            normalized_name: normalize(&canonical_name),
            normalized_address: normalize_address(&address),
            canonical_name,
            address,
            postal_code,
            collectors: BTreeSet::new(),
        }
    }

    /// Restrict the site to a collector (may be called repeatedly).
    pub fn with_collector(mut self, key: &str) -> Self {
        let key = canonical_key(key);
        if !key.is_empty() {
            self.collectors.insert(key);
        }
        self
    }

    pub fn normalized_name(&self) -> &str {
        &self.normalized_name
    }

    pub fn normalized_address(&self) -> &str {
        &self.normalized_address
    }

    /// Whether the site may be billed by `collector_key`.
    pub fn serves(&self, collector_key: &str) -> bool {
        self.collectors.is_empty() || self.collectors.contains(&canonical_key(collector_key))
    }

    /// Whether the directory knows anything about where the site is.
    pub fn has_location(&self) -> bool {
        self.postal_code.is_some() || !self.normalized_address.is_empty()
    }

    fn merge(&mut self, other: SiteRecord) -> Result<(), CatalogError> {
        if self.normalized_name != other.normalized_name {
            return Err(CatalogError::ConflictingSite {
                site_id: self.site_id.clone(),
                first: self.canonical_name.clone(),
                second: other.canonical_name,
            });
        }
        if self.normalized_address.is_empty() && !other.normalized_address.is_empty() {
            self.address = other.address;
            self.normalized_address = other.normalized_address;
        }
        if self.postal_code.is_none() {
            self.postal_code = other.postal_code;
        }
        self.collectors.extend(other.collectors);
        Ok(())
    }
}

/// A name the collector matcher may recognise, tied to its canonical key.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorName {
    /// Normalized spelling.
    pub normalized: String,
    /// Words of the normalized spelling.
    pub words: Vec<String>,
    /// Canonical key the name stands for.
    pub key: String,
}

/// Canonical collector keys, their aliases, and waste-stream combinations.
#[derive(Debug, Clone, Default)]
pub struct CollectorDirectory {
    approved: BTreeSet<String>,
    recognised: BTreeSet<String>,
    aliases: BTreeMap<String, String>,
    combinations: BTreeMap<String, Vec<String>>,
    names: Vec<CollectorName>,
}

impl CollectorDirectory {
    pub fn builder() -> CollectorDirectoryBuilder {
        CollectorDirectoryBuilder::default()
    }

    /// Whether `key` is in the approved catalog.
    pub fn is_approved(&self, key: &str) -> bool {
        self.approved.contains(&canonical_key(key))
    }

    /// Whether `key` is known by name without being approved.
    pub fn is_recognised(&self, key: &str) -> bool {
        self.recognised.contains(&canonical_key(key))
    }

    pub fn approved(&self) -> impl Iterator<Item = &str> {
        self.approved.iter().map(String::as_str)
    }

    /// Canonical key for an exact (normalized) alias or key spelling.
    pub fn lookup(&self, normalized: &str) -> Option<&str> {
        self.aliases.get(normalized).map(String::as_str)
    }

    /// Every recognisable name, longest first, ties in byte order.
    pub fn names(&self) -> &[CollectorName] {
        &self.names
    }

    /// Valid waste-stream combinations for a collector (e.g. `SUEZDIBBIO`).
    pub fn combinations(&self, key: &str) -> &[String] {
        self.combinations
            .get(&canonical_key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.approved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approved.is_empty()
    }
}

/// Builds a [`CollectorDirectory`] and checks its alias invariants.
#[derive(Debug, Default)]
pub struct CollectorDirectoryBuilder {
    approved: BTreeSet<String>,
    recognised: BTreeSet<String>,
    aliases: Vec<(String, String)>,
    combinations: BTreeMap<String, Vec<String>>,
}

impl CollectorDirectoryBuilder {
    /// Add an approved canonical key.
    pub fn approve(mut self, key: &str) -> Self {
        let key = canonical_key(key);
        if !key.is_empty() {
            self.approved.insert(key);
        }
        self
    }

    /// Add a key the matcher can recognise without it being approved.
    pub fn recognise(mut self, key: &str) -> Self {
        let key = canonical_key(key);
        if !key.is_empty() {
            self.recognised.insert(key);
        }
        self
    }

    /// Map an alias (subsidiary, brand variant) to a canonical key.
    pub fn alias(mut self, alias: &str, key: &str) -> Self {
        let key = canonical_key(key);
        let alias = normalize(alias);
        if !alias.is_empty() && !key.is_empty() {
            self.aliases.push((alias, key));
        }
        self
    }

    /// Record the valid waste-stream combinations for a key.
    pub fn combinations<I, S>(mut self, key: &str, combos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.combinations.entry(canonical_key(key)).or_default();
        for combo in combos {
            let combo = canonical_key(combo.as_ref()).replace(' ', "");
            if !combo.is_empty() && !entry.contains(&combo) {
                entry.push(combo);
            }
        }
        self
    }

    pub fn build(self) -> Result<CollectorDirectory, CatalogError> {
        let mut recognised = self.recognised;
        recognised.retain(|k| !self.approved.contains(k));

        let all_keys: Vec<&String> = self.approved.iter().chain(recognised.iter()).collect();
        let normalized_keys: BTreeMap<String, &String> =
            all_keys.iter().map(|k| (normalize(k), *k)).collect();

        let mut aliases = BTreeMap::new();
        for key in &all_keys {
            aliases.insert(normalize(key), (*key).clone());
        }

        let mut extra_recognised = Vec::new();
        for (alias, key) in &self.aliases {
            if let Some(other) = normalized_keys.get(alias) {
                if *other != key {
                    return Err(CatalogError::AliasCycle {
                        alias: alias.clone(),
                        key: key.clone(),
                        other: (*other).clone(),
                    });
                }
                continue;
            }
            if !self.approved.contains(key) && !recognised.contains(key) {
                extra_recognised.push(key.clone());
            }
            aliases.entry(alias.clone()).or_insert_with(|| key.clone());
        }
        recognised.extend(extra_recognised);

        let mut names: Vec<CollectorName> = aliases
            .iter()
            .map(|(normalized, key)| CollectorName {
                normalized: normalized.clone(),
                words: tokens(normalized),
                key: key.clone(),
            })
            .collect();
        // newly recognised alias targets need their own spelling too
        for key in &recognised {
            let normalized = normalize(key);
            if !names.iter().any(|n| n.normalized == normalized) {
                aliases.insert(normalized.clone(), key.clone());
                names.push(CollectorName {
                    words: tokens(&normalized),
                    normalized,
                    key: key.clone(),
                });
            }
        }
        names.sort_by(|a, b| {
            b.normalized
                .len()
                .cmp(&a.normalized.len())
                .then_with(|| a.normalized.cmp(&b.normalized))
        });

        Ok(CollectorDirectory {
            approved: self.approved,
            recognised,
            aliases,
            combinations: self.combinations,
            names,
        })
    }
}

/// Indexed site and collector directories.
#[derive(Debug, Clone)]
pub struct ReferenceCatalog {
    sites: Vec<SiteRecord>,
    by_id: BTreeMap<String, usize>,
    variant_index: BTreeMap<String, Vec<usize>>,
    collectors: CollectorDirectory,
}

impl ReferenceCatalog {
    /// Index sites, merging rows that share a site id.
    pub fn new<I>(sites: I, collectors: CollectorDirectory) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = SiteRecord>,
    {
        let mut merged: Vec<SiteRecord> = Vec::new();
        let mut by_id = BTreeMap::new();

        for site in sites {
            match by_id.get(&site.site_id) {
                Some(&idx) => {
                    let existing: &mut SiteRecord = &mut merged[idx];
                    existing.merge(site)?;
                }
                None => {
                    by_id.insert(site.site_id.clone(), merged.len());
                    merged.push(site);
                }
            }
        }

        let mut variant_index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, site) in merged.iter().enumerate() {
            let mut keys = brand_variants(&site.canonical_name);
            let normalized: Vec<String> = keys.iter().map(|k| normalize(k)).collect();
            keys.extend(normalized);
            for key in keys {
                variant_index.entry(key).or_default().push(idx);
            }
        }

        Ok(Self {
            sites: merged,
            by_id,
            variant_index,
            collectors,
        })
    }

    /// Load both directories from the configured files.
    pub fn load(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let sites = load_sites(&config.sites_path(), config.delimiter)?;
        let collectors = load_collectors(&config.collectors_path(), config)?;
        let catalog = Self::new(sites, collectors)?;

        info!(
            "Loaded {} sites and {} approved collectors",
            catalog.sites.len(),
            catalog.collectors.len()
        );

        Ok(catalog)
    }

    pub fn sites(&self) -> &[SiteRecord] {
        &self.sites
    }

    pub fn site(&self, site_id: &str) -> Option<&SiteRecord> {
        self.by_id.get(site_id.trim()).map(|&idx| &self.sites[idx])
    }

    /// Sites indexed under an exact lookup key, in directory order.
    pub fn sites_for_key(&self, key: &str) -> Vec<&SiteRecord> {
        self.variant_index
            .get(key)
            .map(|idxs| idxs.iter().map(|&i| &self.sites[i]).collect())
            .unwrap_or_default()
    }

    pub fn collectors(&self) -> &CollectorDirectory {
        &self.collectors
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> CollectorDirectory {
        CollectorDirectory::builder()
            .approve("SUEZ")
            .approve("Veolia")
            .alias("SITA", "SUEZ")
            .alias("Onyx Est", "VEOLIA")
            .alias("Paprec Grand Est", "PAPREC")
            .combinations("SUEZ", ["SUEZDIB", "SUEZ DIB BIO"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_keys_are_canonical() {
        let dir = directory();
        assert!(dir.is_approved("veolia"));
        assert!(dir.is_approved(" Suez "));
        assert!(!dir.is_approved("PAPREC"));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let dir = directory();
        assert_eq!(dir.lookup(&normalize("sita")), Some("SUEZ"));
        assert_eq!(dir.lookup(&normalize("ONYX-EST")), Some("VEOLIA"));
        assert_eq!(dir.lookup("suez"), Some("SUEZ"));
    }

    #[test]
    fn test_alias_target_becomes_recognised() {
        let dir = directory();
        assert_eq!(dir.lookup("paprec"), Some("PAPREC"));
        assert!(dir.is_recognised("Paprec"));
        assert!(!dir.is_recognised("SUEZ"));
        assert!(dir.names().iter().any(|n| n.normalized == "paprec"));
    }

    #[test]
    fn test_names_are_longest_first() {
        let dir = directory();
        let lengths: Vec<usize> = dir.names().iter().map(|n| n.normalized.len()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn test_alias_naming_other_key_is_rejected() {
        let result = CollectorDirectory::builder()
            .approve("SUEZ")
            .approve("VEOLIA")
            .alias("veolia", "SUEZ")
            .build();
        assert!(matches!(result, Err(CatalogError::AliasCycle { .. })));
    }

    #[test]
    fn test_combinations_are_compacted() {
        let dir = directory();
        assert_eq!(dir.combinations("suez"), ["SUEZDIB", "SUEZDIBBIO"]);
        assert!(dir.combinations("VEOLIA").is_empty());
    }

    #[test]
    fn test_duplicate_rows_merge_collectors() {
        let catalog = ReferenceCatalog::new(
            vec![
                SiteRecord::new("1173", "Mcdonald's CHALON SUR SAONE", "", None).with_collector("SUEZ"),
                SiteRecord::new("1173", "McDonalds Chalon-sur-Saône", "Rue A 71100 Chalon", None)
                    .with_collector("VEOLIA"),
            ],
            directory(),
        )
        .unwrap();

        assert_eq!(catalog.len(), 1);
        let site = catalog.site("1173").unwrap();
        assert!(site.serves("suez"));
        assert!(site.serves("VEOLIA"));
        assert!(!site.serves("PAPREC"));
        assert_eq!(site.postal_code.as_deref(), Some("71100"));
    }

    #[test]
    fn test_conflicting_duplicate_is_fatal() {
        let result = ReferenceCatalog::new(
            vec![
                SiteRecord::new("1", "Mcdonald's LYON", "", None),
                SiteRecord::new("1", "Mcdonald's DIJON", "", None),
            ],
            directory(),
        );
        assert!(matches!(result, Err(CatalogError::ConflictingSite { .. })));
    }

    #[test]
    fn test_variant_index() {
        let catalog = ReferenceCatalog::new(
            vec![SiteRecord::new("42", "Mcdonald's LYON PART DIEU", "", None)],
            directory(),
        )
        .unwrap();

        for key in ["mac do lyon part dieu", "mcdonalds lyon part dieu", "lyon part dieu"] {
            assert_eq!(catalog.sites_for_key(key).len(), 1, "{key}");
        }
        assert!(catalog.sites_for_key("lyon").is_empty());
    }
}
