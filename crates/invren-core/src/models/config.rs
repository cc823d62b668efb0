//! Configuration structures for the renaming pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::InvrenError;

/// Environment variable overriding the per-minute ceiling.
pub const ENV_MAX_PER_MINUTE: &str = "MAX_REQUESTS_PER_MINUTE";

/// Environment variable overriding the daily ceiling.
pub const ENV_MAX_PER_DAY: &str = "MAX_REQUESTS_PER_DAY";

/// Main configuration for invren.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvrenConfig {
    /// Reference catalog files.
    pub catalog: CatalogConfig,

    /// Entity resolver thresholds and weights.
    pub resolution: ResolutionConfig,

    /// Call governor ceilings and ledger location.
    pub governor: GovernorConfig,

    /// The operator's own identity, never a collector or invoice address.
    pub operator: OperatorConfig,

    /// Target filename options.
    pub naming: NamingConfig,
}

/// Where the site and collector directories live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory holding both files.
    pub dir: PathBuf,

    /// Site directory file name.
    pub sites_file: String,

    /// Collector directory file name.
    pub collectors_file: String,

    /// Field delimiter of both files.
    pub delimiter: char,

    /// Collectors recognised by name even when not approved, so an invoice
    /// from them fails as unapproved instead of unmatched.
    pub known_collectors: Vec<String>,

    /// Extra alias -> canonical key mappings (subsidiaries, former names).
    pub aliases: BTreeMap<String, String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let known_collectors = [
            "SUEZ",
            "VEOLIA",
            "REFOOD",
            "PAPREC",
            "ELISE",
            "DERICHEBOURG",
            "ORTEC",
            "ATESIS",
            "BRANGEON",
            "COLLECTEA",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let aliases = [
            ("SITA", "SUEZ"),
            ("Suez RV", "SUEZ"),
            ("Onyx", "VEOLIA"),
            ("Veolia Propreté", "VEOLIA"),
        ]
        .iter()
        .map(|(a, k)| (a.to_string(), k.to_string()))
        .collect();

        Self {
            dir: PathBuf::from("."),
            sites_file: "Restaurants.csv".to_string(),
            collectors_file: "Prestataires.csv".to_string(),
            delimiter: ';',
            known_collectors,
            aliases,
        }
    }
}

impl CatalogConfig {
    pub fn sites_path(&self) -> PathBuf {
        self.dir.join(&self.sites_file)
    }

    pub fn collectors_path(&self) -> PathBuf {
        self.dir.join(&self.collectors_file)
    }
}

/// Entity resolver thresholds. All ratios are in 0.0 - 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Minimum edit-distance ratio for the collector similarity tier.
    pub collector_similarity: f64,

    /// Minimum address similarity when no name matched.
    pub address_match: f64,

    /// Minimum address similarity to pick among several name matches.
    pub address_disambiguation: f64,

    /// Address similarity accepted even when postal codes disagree.
    pub address_override: f64,

    /// Minimum address similarity corroborating a single name match.
    pub single_match_address: f64,

    /// Weight of name similarity in the postal-code score.
    pub name_weight: f64,

    /// Weight of address similarity in the postal-code score.
    pub address_weight: f64,

    /// Minimum postal-code score.
    pub combined_threshold: f64,

    /// Added to name similarity on an exact name match.
    pub exact_name_boost: f64,

    /// Subtracted when the catalog name is a strict superstring of the query.
    pub superstring_penalty: f64,

    /// Accept a lone uncorroborated name match as a low-confidence result.
    pub allow_unvalidated: bool,

    /// How many near misses a failure reports.
    pub near_miss_limit: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            collector_similarity: 0.8,
            address_match: 0.7,
            address_disambiguation: 0.6,
            address_override: 0.8,
            single_match_address: 0.6,
            name_weight: 0.7,
            address_weight: 0.3,
            combined_threshold: 0.5,
            exact_name_boost: 0.2,
            superstring_penalty: 0.1,
            allow_unvalidated: true,
            near_miss_limit: 5,
        }
    }
}

/// Call governor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Calls allowed in any rolling 60-second window.
    pub max_requests_per_minute: u32,

    /// Calls allowed per calendar day.
    pub max_requests_per_day: u32,

    /// Ledger file. Defaults to the user data directory.
    pub ledger_path: Option<PathBuf>,

    /// Days of daily counts kept in the ledger.
    pub retention_days: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 15,
            max_requests_per_day: 1500,
            ledger_path: None,
            retention_days: 7,
        }
    }
}

/// The operator's own names and addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Company names of the operator (e.g. "SOCIETE RUBO").
    pub names: Vec<String>,

    /// Head-office addresses printed on every invoice.
    pub addresses: Vec<String>,
}

/// Target filename options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Extension appended to the composed name.
    pub extension: String,

    /// Collectors that print the site id on their invoices.
    pub site_hint_collectors: Vec<String>,

    /// Append detected waste streams to the collector component.
    pub waste_suffix: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            extension: "pdf".to_string(),
            site_hint_collectors: Vec::new(),
            waste_suffix: true,
        }
    }
}

impl InvrenConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Apply `MAX_REQUESTS_PER_MINUTE` / `MAX_REQUESTS_PER_DAY` from the environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), InvrenError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), InvrenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_PER_MINUTE) {
            self.governor.max_requests_per_minute = parse_ceiling(ENV_MAX_PER_MINUTE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_PER_DAY) {
            self.governor.max_requests_per_day = parse_ceiling(ENV_MAX_PER_DAY, &value)?;
        }
        Ok(())
    }
}

fn parse_ceiling(name: &str, value: &str) -> Result<u32, InvrenError> {
    value
        .trim()
        .parse()
        .map_err(|_| InvrenError::Config(format!("{name} must be a positive integer, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InvrenConfig::default();
        assert_eq!(config.governor.max_requests_per_minute, 15);
        assert_eq!(config.governor.max_requests_per_day, 1500);
        assert_eq!(config.catalog.delimiter, ';');
        assert_eq!(config.catalog.sites_path(), PathBuf::from("./Restaurants.csv"));
        assert!(config.catalog.known_collectors.contains(&"REFOOD".to_string()));
        assert!((config.resolution.collector_similarity - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: InvrenConfig =
            serde_json::from_str(r#"{"governor": {"max_requests_per_minute": 5}}"#).unwrap();
        assert_eq!(config.governor.max_requests_per_minute, 5);
        assert_eq!(config.governor.max_requests_per_day, 1500);
        assert_eq!(config.naming.extension, "pdf");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = InvrenConfig::default();
        config.operator.names.push("SOCIETE RUBO".to_string());
        config.save(&path).unwrap();

        let loaded = InvrenConfig::from_file(&path).unwrap();
        assert_eq!(loaded.operator.names, vec!["SOCIETE RUBO".to_string()]);
    }

    #[test]
    fn test_overrides() {
        let mut config = InvrenConfig::default();
        config
            .apply_overrides(|name| match name {
                ENV_MAX_PER_MINUTE => Some("3".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.governor.max_requests_per_minute, 3);
        assert_eq!(config.governor.max_requests_per_day, 1500);
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = InvrenConfig::default();
        let err = config
            .apply_overrides(|_| Some("lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, InvrenError::Config(_)));
    }
}
