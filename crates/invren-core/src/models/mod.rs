//! Data models for invren.

pub mod config;
pub mod extraction;

pub use config::InvrenConfig;
pub use extraction::ExtractionResult;
