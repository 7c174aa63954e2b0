//! Configuration module for Image-Ledger
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use image_ledger::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("image-ledger.toml")).unwrap();
//! println!("Per-host ceiling: {}", config.fetch.max_per_host);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetchConfig, IdentityConfig, LedgerConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
