use url::Url;

/// Normalizes a URL path by removing dot segments, empty segments and
/// trailing slashes
///
/// # Examples
///
/// ```
/// use image_ledger::url::normalize_path;
///
/// assert_eq!(normalize_path("/a/../b/./c/"), "/b/c");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Keeps only the query pairs whose key is in the significant set, sorted
/// by key then value
///
/// Keys are compared case-insensitively and returned lowercased, so
/// `?SKU=1` and `?sku=1` produce the same pairs.
pub fn significant_query_pairs(url: &Url, significant: &[String]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .filter(|(k, _)| significant.iter().any(|s| s.eq_ignore_ascii_case(k)))
        .collect();

    pairs.sort();
    pairs.dedup();
    pairs
}
