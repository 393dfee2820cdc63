//! Error taxonomy for the digest pipeline.
//!
//! Most variants never escape the core: each one maps onto a degraded but
//! complete outcome (singleton clusters, longest-summary fallback, an empty
//! source contribution, a fresh state). They exist so the degraded paths can
//! be logged and tested by name.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    /// The local similarity capability could not produce a matrix.
    #[error("clustering unavailable: {0}")]
    ClusteringUnavailable(String),

    /// Transport failure, timeout, or schema mismatch on the merge response.
    #[error("merge call failed: {0}")]
    MergeCallFailed(String),

    #[error("extraction failed for {source_name}: {reason}")]
    ExtractionFailed { source_name: String, reason: String },

    /// Persisted state could not be read or decoded.
    #[error("state file {path} is corrupt: {reason}")]
    StateCorrupt { path: String, reason: String },

    #[error("no sources available for {0}")]
    NoSourcesAvailable(String),

    #[error("invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, DigestError>;
