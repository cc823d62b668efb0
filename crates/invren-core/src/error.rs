//! Error types for the invren-core library.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

use crate::resolve::{Candidate, CollectorStrategy};

/// Main error type for the invren library.
#[derive(Error, Debug)]
pub enum InvrenError {
    /// Reference catalog could not be loaded.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Entity resolution failed.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Filename composition failed.
    #[error("compose error: {0}")]
    Compose(#[from] ComposeError),

    /// Call governor refused or failed.
    #[error("governor error: {0}")]
    Governor(#[from] GovernorError),

    /// Oracle payload could not be obtained.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// A single document could not be planned.
    #[error("document error: {0}")]
    Document(#[from] DocumentError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while loading the site and collector directories.
///
/// All of these are fatal at startup.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The directory file does not exist.
    #[error("reference file not found: {}", .path.display())]
    Missing { path: PathBuf },

    /// The file is not valid delimited text.
    #[error("malformed reference file {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the header row.
    #[error("{} has no {column:?} column", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// A required cell is blank.
    #[error("{} line {line}: empty {field:?}", .path.display())]
    EmptyField {
        path: PathBuf,
        line: u64,
        field: String,
    },

    /// The file has a header but no usable rows.
    #[error("{} contains no entries", .path.display())]
    Empty { path: PathBuf },

    /// Two rows share a site id but name different restaurants.
    #[error("site {site_id} is listed as both {first:?} and {second:?}")]
    ConflictingSite {
        site_id: String,
        first: String,
        second: String,
    },

    /// An alias names a different canonical collector.
    #[error("alias {alias:?} of {key} is itself the collector {other}")]
    AliasCycle {
        alias: String,
        key: String,
        other: String,
    },
}

/// Step A failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectorResolutionError {
    /// No strategy recognised the provider text.
    #[error(
        "no collector matches provider {provider:?}{}{}",
        operator_note(.operator_excluded),
        describe_candidates(.near_misses)
    )]
    NoCollectorMatch {
        provider: String,
        near_misses: Vec<Candidate>,
        operator_excluded: bool,
    },

    /// A collector was recognised but is not in the approved catalog.
    #[error("provider {provider:?} resolved to {key} via {strategy}, which is not an approved collector")]
    UnapprovedCollector {
        provider: String,
        key: String,
        strategy: CollectorStrategy,
    },
}

/// Step B failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SiteResolutionError {
    /// No stage produced a site.
    #[error(
        "no site matches {entreprise:?} (address {}, postal code {}){}",
        .address.as_deref().unwrap_or("none"),
        .postal_code.as_deref().unwrap_or("none"),
        describe_candidates(.near_misses)
    )]
    NoSiteMatch {
        entreprise: String,
        address: Option<String>,
        postal_code: Option<String>,
        near_misses: Vec<Candidate>,
    },

    /// Several sites remain and nothing separates them.
    #[error("{entreprise:?} matches several sites equally{}", describe_candidates(.candidates))]
    AmbiguousSiteMatch {
        entreprise: String,
        candidates: Vec<Candidate>,
    },
}

/// Either half of a failed resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error(transparent)]
    Collector(#[from] CollectorResolutionError),

    #[error(transparent)]
    Site(#[from] SiteResolutionError),
}

/// Filename component that failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Site,
    Collector,
    Period,
    InvoiceNumber,
    SiteHint,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::Site => "site id",
            Component::Collector => "collector",
            Component::Period => "period",
            Component::InvoiceNumber => "invoice number",
            Component::SiteHint => "site hint",
        };
        f.write_str(name)
    }
}

/// Errors raised while rendering the target filename.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    /// No day/month/year date could be read.
    #[error("could not parse a date from {value:?}")]
    InvalidDate { value: String },

    /// A component is empty after sanitizing.
    #[error("{component} is empty after sanitizing {value:?}")]
    EmptyComponent { component: Component, value: String },
}

/// Errors raised by the call governor.
#[derive(Error, Debug)]
pub enum GovernorError {
    /// The daily ceiling is reached; no more calls until the date changes.
    #[error("daily limit reached for {date}: {count}/{limit} calls")]
    DailyLimitExceeded {
        date: NaiveDate,
        count: u32,
        limit: u32,
    },

    /// Admission would need to wait past the caller's deadline.
    #[error("not admitted within {:.1}s (next slot in {:.1}s)", .deadline.as_secs_f64(), .next_slot.as_secs_f64())]
    WaitTimeout { deadline: Duration, next_slot: Duration },

    /// Limits are unusable.
    #[error("invalid rate limits: {0}")]
    InvalidLimits(String),

    /// The ledger could not be read, locked, or written.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Ledger persistence errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not lock {} within {:.1}s", .path.display(), .waited.as_secs_f64())]
    Lock { path: PathBuf, waited: Duration },

    #[error("ledger state poisoned by a panicking thread")]
    Poisoned,
}

/// Errors obtaining an extraction result for a document.
#[derive(Error, Debug)]
pub enum OracleError {
    /// No payload exists for the document.
    #[error("no extraction payload for {}", .document.display())]
    MissingPayload { document: PathBuf },

    /// The payload is not the expected JSON shape.
    #[error("unreadable extraction payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-document failure. Never fatal to a batch.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The oracle left a required field blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

impl From<CollectorResolutionError> for DocumentError {
    fn from(err: CollectorResolutionError) -> Self {
        DocumentError::Resolution(err.into())
    }
}

impl From<SiteResolutionError> for DocumentError {
    fn from(err: SiteResolutionError) -> Self {
        DocumentError::Resolution(err.into())
    }
}

fn operator_note(excluded: &bool) -> &'static str {
    if *excluded {
        " (names the operator itself)"
    } else {
        ""
    }
}

fn describe_candidates(candidates: &[Candidate]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let listed: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
    format!("; closest: {}", listed.join(", "))
}

/// Result type for the invren library.
pub type Result<T> = std::result::Result<T, InvrenError>;
