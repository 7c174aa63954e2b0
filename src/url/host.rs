use url::Url;

/// Extracts the admission key for a URL: the lowercase host, plus the port
/// when it is not the scheme default
///
/// Returns None if the URL has no host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use image_ledger::url::host_key;
///
/// let url = Url::parse("https://CDN.Example.com/a.png").unwrap();
/// assert_eq!(host_key(&url), Some("cdn.example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/a.png").unwrap();
/// assert_eq!(host_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Returns true for `data:` URLs, whose bytes are embedded in the URL itself
pub fn is_inline(url: &str) -> bool {
    url.get(..5)
        .map_or(false, |scheme| scheme.eq_ignore_ascii_case("data:"))
}
