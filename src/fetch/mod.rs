//! Fetch module for polite image retrieval
//!
//! This module contains the retrieval pipeline, including:
//! - Admission control (global and per-host ceilings)
//! - Single-attempt retrieval with a hard timeout and failure classification
//! - Retry policy with exponential backoff
//! - The scheduler that composes them over a batch of candidates

mod admission;
mod executor;
mod media;
mod retry;
mod scheduler;

pub use admission::{AdmissionController, AdmissionError, Slot};
pub use executor::{build_http_client, decode_inline, HttpRetriever, Retriever};
pub use media::{media_type_from_header, sniff_media_type, DEFAULT_MEDIA_TYPE};
pub use retry::RetryPolicy;
pub use scheduler::FetchScheduler;

use crate::hash::{digest, ContentHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the detector found an image reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceHint {
    /// `<img src>`
    #[default]
    Img,
    /// A `srcset` entry
    Srcset,
    /// `<picture><source>`
    Picture,
    /// CSS `background-image`
    CssBackground,
    /// Inline or referenced SVG
    Svg,
    /// Embedded `data:` URL
    Inline,
}

impl SourceHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Img => "img",
            Self::Srcset => "srcset",
            Self::Picture => "picture",
            Self::CssBackground => "css-background",
            Self::Svg => "svg",
            Self::Inline => "inline",
        }
    }
}

/// An image reference awaiting retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,

    #[serde(rename = "source", default)]
    pub source_hint: SourceHint,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl Candidate {
    /// Creates an `<img>` candidate with no size or alt text
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_hint: SourceHint::Img,
            width: None,
            height: None,
            alt: None,
        }
    }
}

/// Retrieval failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The attempt exceeded its deadline
    Timeout,
    /// The server's resource policy forbids cross-origin use
    #[serde(rename = "CORS")]
    CrossOrigin,
    /// Non-success HTTP status
    HttpError,
    /// Connection-level failure
    Network,
    /// Anything unclassified
    Unknown,
    /// Unusable URL or undecodable inline data
    Malformed,
    /// The collection was aborted before the candidate finished
    Cancelled,
}

impl ErrorKind {
    /// Returns true if a later attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Network | Self::Unknown => true,
            Self::CrossOrigin | Self::HttpError | Self::Malformed | Self::Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::CrossOrigin => "CORS",
            Self::HttpError => "HTTP_ERROR",
            Self::Network => "NETWORK",
            Self::Unknown => "UNKNOWN",
            Self::Malformed => "MALFORMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bytes produced by one successful attempt
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// A classified failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Final result for one candidate
#[derive(Debug, Clone)]
pub enum Outcome {
    Success {
        candidate: Candidate,
        bytes: Vec<u8>,
        media_type: String,
        /// Filled in by [`Outcome::hashed`]; the scheduler leaves it empty
        content_hash: Option<ContentHash>,
    },
    Failure {
        candidate: Candidate,
        error_kind: ErrorKind,
        detail: String,
        attempts: u32,
    },
}

impl Outcome {
    pub fn failure(
        candidate: Candidate,
        error_kind: ErrorKind,
        detail: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self::Failure {
            candidate,
            error_kind,
            detail: detail.into(),
            attempts,
        }
    }

    pub fn candidate(&self) -> &Candidate {
        match self {
            Self::Success { candidate, .. } | Self::Failure { candidate, .. } => candidate,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Computes the content hash of a success; failures pass through
    pub fn hashed(self) -> Self {
        match self {
            Self::Success {
                candidate,
                bytes,
                media_type,
                content_hash,
            } => {
                let content_hash = content_hash.or_else(|| Some(digest(&bytes)));
                Self::Success {
                    candidate,
                    bytes,
                    media_type,
                    content_hash,
                }
            }
            failure @ Self::Failure { .. } => failure,
        }
    }
}
