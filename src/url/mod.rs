//! URL handling module for Image-Ledger
//!
//! This module provides admission host keys for image URLs and the
//! canonical page identity used to key ledger records.

mod host;
mod identity;
mod normalize;

// Re-export main functions
pub use host::{host_key, is_inline};
pub use identity::{derive_page_identity, PageIdentity};
pub use normalize::{normalize_path, significant_query_pairs};
