//! Oracle seam: where extraction results come from.
//!
//! The document-understanding service itself lives outside this crate. The
//! driver only needs something that turns a document path into an
//! [`ExtractionResult`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::OracleError;
use crate::models::extraction::ExtractionResult;
use crate::patterns::CODE_FENCE;

/// Produces extraction fields for one document.
pub trait Oracle: Send + Sync {
    fn extract(&self, document: &Path) -> Result<ExtractionResult, OracleError>;
}

/// Reads a payload stored next to the document as `<stem>.json`, or under
/// a separate payload directory.
#[derive(Debug, Clone, Default)]
pub struct SidecarOracle {
    payload_dir: Option<PathBuf>,
}

impl SidecarOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for payloads in `dir` instead of beside each document.
    pub fn with_payload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.payload_dir = Some(dir.into());
        self
    }

    pub fn payload_path(&self, document: &Path) -> PathBuf {
        let stem = document.file_stem().unwrap_or_default();
        let mut name = stem.to_os_string();
        name.push(".json");
        match &self.payload_dir {
            Some(dir) => dir.join(name),
            None => document.with_file_name(name),
        }
    }
}

impl Oracle for SidecarOracle {
    fn extract(&self, document: &Path) -> Result<ExtractionResult, OracleError> {
        let path = self.payload_path(document);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OracleError::MissingPayload {
                    document: document.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Read extraction payload {}", path.display());
        parse_oracle_payload(&text)
    }
}

/// Parse a raw oracle reply, with or without a ```json fence.
pub fn parse_oracle_payload(text: &str) -> Result<ExtractionResult, OracleError> {
    let body = match CODE_FENCE.captures(text) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => strip_open_fence(text.trim()),
    };
    Ok(serde_json::from_str(body)?)
}

/// Unterminated fence: drop the opening line.
fn strip_open_fence(text: &str) -> &str {
    match text.strip_prefix("```") {
        Some(rest) => rest.split_once('\n').map_or("", |(_, body)| body).trim(),
        None => text,
    }
}
