//! Core library for renaming scanned waste-collection invoices.
//!
//! This crate provides:
//! - Reference catalog loading (site directory, approved collectors, aliases)
//! - Name and address normalization, including brand-family handling
//! - Entity resolution of provider text and company name to catalog ids
//! - Filename composition: `{site}-{collector}-{MMYYYY}-{invoice number}`
//! - A persisted, restart-safe governor for rate-limited oracle calls

pub mod catalog;
pub mod compose;
pub mod error;
pub mod governor;
pub mod models;
pub mod normalize;
pub mod observe;
pub mod oracle;
pub mod patterns;
pub mod pipeline;
pub mod resolve;

pub use catalog::{CollectorDirectory, ReferenceCatalog, SiteRecord};
pub use compose::{compose, FilenameParts};
pub use error::{
    CatalogError, CollectorResolutionError, ComposeError, DocumentError, GovernorError,
    InvrenError, LedgerError, OracleError, ResolutionError, Result, SiteResolutionError,
};
pub use governor::{Admission, CallGovernor, GovernorStatus};
pub use models::{ExtractionResult, InvrenConfig};
pub use normalize::normalize;
pub use observe::{NoopObserver, Observer, TracingObserver};
pub use oracle::{Oracle, SidecarOracle};
pub use pipeline::{PlannedName, Renamer};
pub use resolve::{EntityResolver, MatchConfidence, Resolution};
