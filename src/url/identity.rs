use crate::config::IdentityConfig;
use crate::hash::digest;
use crate::url::normalize::{normalize_path, significant_query_pairs};
use crate::UrlError;
use url::{form_urlencoded, Url};

/// Canonical identity of a logical page
///
/// Two URLs that differ only in fragments, trailing slashes, dot segments,
/// host case, a `www.` prefix or insignificant query parameters map to the
/// same `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageIdentity {
    /// Hex SHA-256 of `origin + path + "?" + query_signature`
    pub id: String,

    /// Canonical URL: origin, normalized path and sorted significant query
    pub url: String,

    /// `scheme://host[:port]`
    pub origin: String,

    /// Normalized path
    pub path: String,

    /// Hex SHA-256 of the sorted significant pairs; empty when there are none
    pub query_signature: String,

    /// Lowercase host without port
    pub host: String,
}

/// Derives the canonical identity of a page URL
///
/// # Errors
///
/// * `UrlError::Parse` - the string is not a URL
/// * `UrlError::InvalidScheme` - the scheme is not http or https
/// * `UrlError::MissingHost` - the URL has no host
///
/// # Examples
///
/// ```
/// use image_ledger::config::IdentityConfig;
/// use image_ledger::url::derive_page_identity;
///
/// let config = IdentityConfig::default();
/// let a = derive_page_identity("https://shop.example/item?id=7&utm_source=mail", &config).unwrap();
/// let b = derive_page_identity("https://www.shop.example/item/?id=7#reviews", &config).unwrap();
/// assert_eq!(a.id, b.id);
/// ```
pub fn derive_page_identity(
    page_url: &str,
    config: &IdentityConfig,
) -> Result<PageIdentity, UrlError> {
    let url = Url::parse(page_url).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS pages have an identity, got: {}",
            url.scheme()
        )));
    }

    let mut host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    if config.strip_www {
        if let Some(stripped) = host.strip_prefix("www.") {
            host = stripped.to_string();
        }
    }

    let origin = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };

    let path = normalize_path(url.path());

    // Re-encoded so a decoded `&` or `=` inside a value stays part of it.
    let query = significant_query_pairs(&url, &config.significant_params)
        .iter()
        .fold(
            form_urlencoded::Serializer::new(String::new()),
            |mut query, (k, v)| {
                query.append_pair(k, v);
                query
            },
        )
        .finish();

    let query_signature = if query.is_empty() {
        String::new()
    } else {
        digest(query.as_bytes()).into_string()
    };

    let id = digest(format!("{}{}?{}", origin, path, query_signature).as_bytes()).into_string();

    let canonical_url = if query.is_empty() {
        format!("{}{}", origin, path)
    } else {
        format!("{}{}?{}", origin, path, query)
    };

    Ok(PageIdentity {
        id,
        url: canonical_url,
        origin,
        path,
        query_signature,
        host,
    })
}
