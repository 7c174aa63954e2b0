use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Image-Ledger
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Retrieval politeness and retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of retrievals in flight across all hosts
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Maximum number of retrievals in flight against a single host
    #[serde(rename = "max-per-host", default = "default_max_per_host")]
    pub max_per_host: u32,

    /// Hard deadline for one retrieval attempt (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per candidate, including the first
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base of the exponential backoff between attempts (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Number of completions between progress events
    #[serde(rename = "progress-interval", default = "default_progress_interval")]
    pub progress_interval: u32,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_per_host: default_max_per_host(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the collector
    #[serde(rename = "collector-name", default = "default_collector_name")]
    pub collector_name: String,

    /// Version of the collector
    #[serde(rename = "collector-version", default = "default_collector_version")]
    pub collector_version: String,

    /// URL with information about the collector
    #[serde(rename = "contact-url", default = "default_contact_url")]
    pub contact_url: String,

    /// Email address for collector-related contact
    #[serde(rename = "contact-email", default = "default_contact_email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.collector_name, self.collector_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            collector_name: default_collector_name(),
            collector_version: default_collector_version(),
            contact_url: default_contact_url(),
            contact_email: default_contact_email(),
        }
    }
}

/// Ledger persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Path to the SQLite ledger database
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,

    /// Records not rescanned within this many days are eligible for cleanup
    #[serde(rename = "retention-days", default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            retention_days: default_retention_days(),
        }
    }
}

/// Page identity canonicalization rules
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Query keys that change which content a page shows; all others are noise
    #[serde(rename = "significant-params", default = "default_significant_params")]
    pub significant_params: Vec<String>,

    /// Treat `www.example.com` and `example.com` as the same page host
    #[serde(rename = "strip-www", default = "default_strip_www")]
    pub strip_www: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            significant_params: default_significant_params(),
            strip_www: default_strip_www(),
        }
    }
}

fn default_max_concurrent() -> u32 {
    8
}

fn default_max_per_host() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_progress_interval() -> u32 {
    10
}

fn default_collector_name() -> String {
    "Image-Ledger".to_string()
}

fn default_collector_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_contact_url() -> String {
    "https://example.com/image-ledger".to_string()
}

fn default_contact_email() -> String {
    "admin@example.com".to_string()
}

fn default_database_path() -> String {
    "./image-ledger.db".to_string()
}

fn default_retention_days() -> u32 {
    90
}

fn default_strip_www() -> bool {
    true
}

fn default_significant_params() -> Vec<String> {
    [
        "id",
        "pid",
        "product",
        "product_id",
        "productid",
        "item",
        "item_id",
        "sku",
        "variant",
        "article",
        "post",
        "p",
        "page",
        "category",
        "cat",
        "q",
        "query",
        "search",
        "v",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
