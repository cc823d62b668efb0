//! Delimited-text loaders for the site and collector directories.

use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::error::CatalogError;
use crate::models::config::CatalogConfig;
use crate::normalize::normalize;

use super::{CollectorDirectory, SiteRecord};

const SITE_ID_COLUMNS: &[&str] = &["site", "site id", "siteid", "site_id"];
const SITE_NAME_COLUMNS: &[&str] = &["entreprise", "nom", "name", "restaurant"];
const ADDRESS_COLUMNS: &[&str] = &["adresse", "address"];
const POSTAL_COLUMNS: &[&str] = &["code postal", "codepostal", "cp", "postal code", "postal_code"];
const COLLECTOR_COLUMNS: &[&str] = &["collecte", "collector", "prestataire"];
const ALIAS_COLUMNS: &[&str] = &["aliases", "alias"];
const COMBINATION_COLUMNS: &[&str] = &["combinations", "combinaisons"];

/// Read the site directory.
///
/// Required columns: site id and name. Address, postal code and collector
/// are optional; a collector column scopes each row to that collector.
pub fn load_sites(path: &Path, delimiter: char) -> Result<Vec<SiteRecord>, CatalogError> {
    let (headers, rows) = read_table(path, delimiter)?;

    let id_col = require_column(path, &headers, SITE_ID_COLUMNS, "Site")?;
    let name_col = require_column(path, &headers, SITE_NAME_COLUMNS, "Entreprise")?;
    let address_col = find_column(&headers, ADDRESS_COLUMNS);
    let postal_col = find_column(&headers, POSTAL_COLUMNS);
    let collector_col = find_column(&headers, COLLECTOR_COLUMNS);

    let mut sites = Vec::with_capacity(rows.len());
    for (line, row) in rows {
        let site_id = require_cell(path, &row, id_col, line, "Site")?;
        let name = require_cell(path, &row, name_col, line, "Entreprise")?;
        let address = cell(&row, address_col).unwrap_or_default();
        let postal = cell(&row, postal_col);

        let mut site = SiteRecord::new(site_id, name, address, postal);
        if let Some(collector) = cell(&row, collector_col) {
            site = site.with_collector(&collector);
        }
        sites.push(site);
    }

    debug!("Read {} site rows from {}", sites.len(), path.display());
    Ok(sites)
}

/// Read the collector directory and fold in configured extras.
///
/// Required column: the canonical collector key. Optional comma-separated
/// alias and waste-stream combination columns.
pub fn load_collectors(
    path: &Path,
    config: &CatalogConfig,
) -> Result<CollectorDirectory, CatalogError> {
    let (headers, rows) = read_table(path, config.delimiter)?;

    let key_col = require_column(path, &headers, COLLECTOR_COLUMNS, "Collecte")?;
    let alias_col = find_column(&headers, ALIAS_COLUMNS);
    let combo_col = find_column(&headers, COMBINATION_COLUMNS);

    let mut builder = CollectorDirectory::builder();
    for (line, row) in rows {
        let key = require_cell(path, &row, key_col, line, "Collecte")?;
        builder = builder.approve(&key);

        for alias in split_list(cell(&row, alias_col)) {
            builder = builder.alias(&alias, &key);
        }
        builder = builder.combinations(&key, split_list(cell(&row, combo_col)));
    }

    for key in &config.known_collectors {
        builder = builder.recognise(key);
    }
    for (alias, key) in &config.aliases {
        builder = builder.alias(alias, key);
    }

    builder.build()
}

fn read_table(
    path: &Path,
    delimiter: char,
) -> Result<(StringRecord, Vec<(u64, StringRecord)>), CatalogError> {
    if !path.exists() {
        return Err(CatalogError::Missing {
            path: path.to_path_buf(),
        });
    }

    let csv_err = |source| CatalogError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?.clone();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        if record.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 2);
        rows.push((line, record));
    }

    if rows.is_empty() {
        return Err(CatalogError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok((headers, rows))
}

fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = normalize(h.trim_start_matches('\u{feff}'));
        names.iter().any(|n| normalize(n) == h)
    })
}

fn require_column(
    path: &Path,
    headers: &StringRecord,
    names: &[&str],
    display: &str,
) -> Result<usize, CatalogError> {
    find_column(headers, names).ok_or_else(|| CatalogError::MissingColumn {
        path: path.to_path_buf(),
        column: display.to_string(),
    })
}

fn cell(row: &StringRecord, col: Option<usize>) -> Option<String> {
    col.and_then(|c| row.get(c))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_cell(
    path: &Path,
    row: &StringRecord,
    col: usize,
    line: u64,
    field: &str,
) -> Result<String, CatalogError> {
    cell(row, Some(col)).ok_or_else(|| CatalogError::EmptyField {
        path: path.to_path_buf(),
        line,
        field: field.to_string(),
    })
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_sites_with_bom_and_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Restaurants.csv",
            "\u{feff}Site ; Entreprise ; Collecte ; Adresse\n\
             1173;Mcdonald's CHALON SUR SAONE;SUEZ;Av. de Paris 71100 Chalon\n\
             161;Mcdonald's CHALON SUR SAONE OBELISQUE;SUEZ;\n\
             ;;;\n",
        );

        let sites = load_sites(&path, ';').unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].site_id, "1173");
        assert_eq!(sites[0].postal_code.as_deref(), Some("71100"));
        assert!(sites[1].serves("SUEZ"));
        assert!(!sites[1].serves("VEOLIA"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_sites(Path::new("/nonexistent/Restaurants.csv"), ';').unwrap_err();
        assert!(matches!(err, CatalogError::Missing { .. }));
    }

    #[test]
    fn test_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sites.csv", "Nom;Adresse\nA;B\n");
        let err = load_sites(&path, ';').unwrap_err();
        assert!(matches!(err, CatalogError::MissingColumn { ref column, .. } if column == "Site"));
    }

    #[test]
    fn test_empty_required_cell_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sites.csv", "Site;Entreprise\n1;A\n2;\n");
        let err = load_sites(&path, ';').unwrap_err();
        assert!(matches!(err, CatalogError::EmptyField { line: 3, .. }));
    }

    #[test]
    fn test_header_only_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "sites.csv", "Site;Entreprise\n");
        assert!(matches!(
            load_sites(&path, ';').unwrap_err(),
            CatalogError::Empty { .. }
        ));
    }

    #[test]
    fn test_load_collectors_with_aliases_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "Prestataires.csv",
            "Collecte;Aliases;Combinations\n\
             SUEZ;SITA, Suez RV Centre Est;SUEZDIB, SUEZBIO, SUEZDIBBIO\n\
             REFOOD;;\n",
        );
        let mut config = CatalogConfig::default();
        config.known_collectors = vec!["PAPREC".to_string()];
        config.aliases.insert("Onyx".to_string(), "VEOLIA".to_string());

        let collectors = load_collectors(&path, &config).unwrap();
        assert!(collectors.is_approved("SUEZ"));
        assert!(collectors.is_approved("REFOOD"));
        assert!(!collectors.is_approved("PAPREC"));
        assert_eq!(collectors.lookup("suez rv centre est"), Some("SUEZ"));
        assert_eq!(collectors.lookup("onyx"), Some("VEOLIA"));
        assert_eq!(collectors.lookup("paprec"), Some("PAPREC"));
        assert_eq!(collectors.combinations("SUEZ").len(), 3);
    }
}
