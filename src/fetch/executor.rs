//! Single-attempt image retrieval
//!
//! This module handles one retrieval attempt per call, including:
//! - Building the HTTP client with a proper user agent string
//! - A hard deadline over the request and the full body read
//! - Media type detection (declared header, then sniffed bytes)
//! - Decoding embedded `data:` URLs without touching the network
//! - Classifying failures from structured error signals
//!
//! Hashing is deliberately not done here; see [`crate::hash`].

use crate::config::UserAgentConfig;
use crate::fetch::media::{media_type_from_header, sniff_media_type, DEFAULT_MEDIA_TYPE};
use crate::fetch::{Candidate, ErrorKind, FetchFailure, Fetched};
use crate::url::is_inline;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use url::Url;

const CORP_HEADER: &str = "cross-origin-resource-policy";

/// Performs one retrieval attempt for a candidate
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieves the candidate's bytes once, without retrying
    async fn execute(&self, candidate: &Candidate) -> Result<Fetched, FetchFailure>;
}

/// Builds an HTTP client with proper configuration
///
/// The per-attempt deadline is enforced by [`HttpRetriever`], not by the
/// client, so a slow body read is also covered.
///
/// # Example
///
/// ```no_run
/// use image_ledger::config::UserAgentConfig;
/// use image_ledger::fetch::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Network retriever backed by reqwest
///
/// When constructed with the requesting page's URL, responses whose
/// `Cross-Origin-Resource-Policy` forbids that page are classified as
/// `CORS` failures.
#[derive(Clone)]
pub struct HttpRetriever {
    client: Client,
    timeout: Duration,
    page: Option<Url>,
}

impl HttpRetriever {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            page: None,
        }
    }

    /// Returns a retriever that enforces resource policies on behalf of
    /// `page_url`; an unparseable page URL disables the check
    pub fn for_page(&self, page_url: &str) -> Self {
        Self {
            client: self.client.clone(),
            timeout: self.timeout,
            page: Url::parse(page_url).ok(),
        }
    }

    async fn attempt(&self, url: Url) -> Result<Fetched, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::new(
                ErrorKind::HttpError,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        if let Some(policy) = self.denied_by_resource_policy(response.url(), response.headers()) {
            return Err(FetchFailure::new(
                ErrorKind::CrossOrigin,
                format!("Cross-Origin-Resource-Policy: {}", policy),
            ));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(media_type_from_header);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let media_type = declared.unwrap_or_else(|| {
            sniff_media_type(&bytes)
                .unwrap_or(DEFAULT_MEDIA_TYPE)
                .to_string()
        });

        Ok(Fetched {
            bytes: bytes.to_vec(),
            media_type,
        })
    }

    /// Returns the offending policy value if the response may not be used by
    /// the requesting page
    fn denied_by_resource_policy(&self, image_url: &Url, headers: &HeaderMap) -> Option<String> {
        let page = self.page.as_ref()?;
        let policy = headers
            .get(CORP_HEADER)?
            .to_str()
            .ok()?
            .trim()
            .to_ascii_lowercase();

        let denied = match policy.as_str() {
            "same-origin" => image_url.origin() != page.origin(),
            "same-site" => !same_site(image_url, page),
            _ => false,
        };

        denied.then_some(policy)
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn execute(&self, candidate: &Candidate) -> Result<Fetched, FetchFailure> {
        if is_inline(&candidate.url) {
            return decode_inline(&candidate.url);
        }

        let url = Url::parse(&candidate.url)
            .map_err(|e| FetchFailure::new(ErrorKind::Malformed, format!("Invalid URL: {}", e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FetchFailure::new(
                ErrorKind::Malformed,
                format!("Unsupported scheme: {}", url.scheme()),
            ));
        }

        match tokio::time::timeout(self.timeout, self.attempt(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::new(
                ErrorKind::Timeout,
                format!("No complete response within {:?}", self.timeout),
            )),
        }
    }
}

/// Classifies a reqwest error from its structured flags
fn classify_reqwest_error(error: &reqwest::Error) -> FetchFailure {
    let kind = if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_status() {
        ErrorKind::HttpError
    } else if error.is_builder() {
        ErrorKind::Malformed
    } else if error.is_connect() || error.is_request() || error.is_body() || error.is_redirect() {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    };

    FetchFailure::new(kind, error.to_string())
}

/// Approximates "same site" as sharing the last two host labels
fn same_site(a: &Url, b: &Url) -> bool {
    fn site(url: &Url) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        if host.parse::<std::net::IpAddr>().is_ok() || host.starts_with('[') {
            return Some(host);
        }
        let labels: Vec<&str> = host.split('.').collect();
        let start = labels.len().saturating_sub(2);
        Some(labels[start..].join("."))
    }

    a.scheme() == b.scheme() && site(a).is_some() && site(a) == site(b)
}

/// Decodes an embedded `data:` URL
///
/// Both base64 and percent-encoded payloads are supported. When the URL
/// declares no media type, the bytes are sniffed.
///
/// # Errors
///
/// Returns a `MALFORMED` failure for a missing payload separator or an
/// undecodable payload.
///
/// # Examples
///
/// ```
/// use image_ledger::fetch::decode_inline;
///
/// let fetched = decode_inline("data:image/gif;base64,R0lGODlhAQABAAAAACw=").unwrap();
/// assert_eq!(fetched.media_type, "image/gif");
/// assert!(fetched.bytes.starts_with(b"GIF89a"));
/// ```
pub fn decode_inline(url: &str) -> Result<Fetched, FetchFailure> {
    let body = url.get(5..).unwrap_or("");
    let (meta, payload) = body.split_once(',').ok_or_else(|| {
        FetchFailure::new(ErrorKind::Malformed, "data: URL has no payload separator")
    })?;

    let mut params = meta.split(';').map(str::trim);
    let declared = params.next().and_then(media_type_from_header);
    let is_base64 = params.any(|p| p.eq_ignore_ascii_case("base64"));

    let unescaped: Vec<u8> = percent_decode_str(payload).collect();
    let bytes = if is_base64 {
        let compact: Vec<u8> = unescaped
            .into_iter()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        STANDARD.decode(compact).map_err(|e| {
            FetchFailure::new(ErrorKind::Malformed, format!("Invalid base64 payload: {}", e))
        })?
    } else {
        unescaped
    };

    let media_type = declared.unwrap_or_else(|| {
        sniff_media_type(&bytes)
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string()
    });

    Ok(Fetched { bytes, media_type })
}
