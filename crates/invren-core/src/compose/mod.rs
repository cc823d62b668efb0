//! Filename composition: `{site}-{collector}-{MMYYYY}-{invoice number}`.

mod period;
mod sanitize;
mod waste;

pub use period::{choose_period_source, find_dates, period_component, period_start, DateMatch};
pub use sanitize::{
    collector_component, invoice_number_component, site_component, site_hint_component,
};
pub use waste::{collector_label, detect_streams, WasteStream};

use std::fmt;

use serde::Serialize;

use crate::error::ComposeError;

/// The four validated components of a target filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilenameParts {
    pub site: String,
    pub collector: String,
    pub period: String,
    pub invoice_number: String,
}

impl FilenameParts {
    /// The name with `extension` appended (no leading dot needed).
    pub fn with_extension(&self, extension: &str) -> String {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() {
            self.to_string()
        } else {
            format!("{self}.{extension}")
        }
    }
}

impl fmt::Display for FilenameParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.site, self.collector, self.period, self.invoice_number
        )
    }
}

/// Validate and sanitize every component.
pub fn compose_parts(
    site_id: &str,
    collector_key: &str,
    date_str: &str,
    invoice_number: &str,
) -> Result<FilenameParts, ComposeError> {
    Ok(FilenameParts {
        site: site_component(site_id)?,
        collector: collector_component(collector_key)?,
        period: period_component(date_str)?,
        invoice_number: invoice_number_component(invoice_number)?,
    })
}

/// Canonical filename without extension.
pub fn compose(
    site_id: &str,
    collector_key: &str,
    date_str: &str,
    invoice_number: &str,
) -> Result<String, ComposeError> {
    compose_parts(site_id, collector_key, date_str, invoice_number).map(|parts| parts.to_string())
}
