//! Image-Ledger: polite image collection with a per-page content ledger
//!
//! This crate retrieves every image referenced by a page under global and
//! per-host concurrency ceilings, deduplicates them by content hash, and
//! classifies each image as new or already seen by comparing against a
//! persisted ledger of earlier visits to the same logical page.

pub mod collect;
pub mod config;
pub mod fetch;
pub mod harvester;
pub mod hash;
pub mod ledger;
pub mod url;

use thiserror::Error;

/// Main error type for Image-Ledger operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Invalid page identity: {0}")]
    InvalidIdentity(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("A collection is already running for page {page_id}")]
    CollectionActive { page_id: String },

    #[error("Failed to read candidate file: {0}")]
    CandidateFile(#[from] toml::de::Error),

    #[error("Failed to write failure list: {0}")]
    FailureFile(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors, raised when a page identity cannot be derived
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Image-Ledger operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use collect::{CollectionResult, Collector};
pub use config::Config;
pub use fetch::{Candidate, ErrorKind, FetchScheduler, Outcome};
pub use harvester::{HarvestReport, Harvester};
pub use hash::{digest, ContentHash};
pub use ledger::{DiffEngine, DiffResult, ImageSnapshot, LedgerStore, PageRecord};
pub use url::{derive_page_identity, PageIdentity};
