use crate::state::Granularity;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Station-Ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub parameters: ParameterConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub run: RunConfig,
    pub storage: StorageConfig,
    pub stations: StationsConfig,
    #[serde(default)]
    pub export: Option<ExportConfig>,
}

impl Config {
    /// Dataset name queried for the given granularity
    pub fn dataset(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Daily => &self.provider.daily_dataset,
            Granularity::Monthly => &self.provider.monthly_dataset,
        }
    }

    /// Parameter catalog (column order) for the given granularity
    pub fn parameters(&self, granularity: Granularity) -> &[String] {
        match granularity {
            Granularity::Daily => &self.parameters.daily,
            Granularity::Monthly => &self.parameters.monthly,
        }
    }

    /// Target table for the given granularity
    pub fn table(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Daily => &self.storage.daily_table,
            Granularity::Monthly => &self.storage.monthly_table,
        }
    }

    /// Crash buffer file for the given granularity
    ///
    /// Each table gets its own file so a reload never mixes column layouts.
    pub fn buffer_path(&self, granularity: Granularity) -> PathBuf {
        PathBuf::from(&self.storage.buffer_dir)
            .join(format!(".{}_buffer.csv", self.table(granularity)))
    }
}

/// Remote dataset API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the dataset API
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    #[serde(rename = "daily-dataset", default = "default_daily_dataset")]
    pub daily_dataset: String,

    #[serde(rename = "monthly-dataset", default = "default_monthly_dataset")]
    pub monthly_dataset: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            daily_dataset: default_daily_dataset(),
            monthly_dataset: default_monthly_dataset(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Parameter catalogs; their order is the stored column order
#[derive(Debug, Clone, Deserialize)]
pub struct ParameterConfig {
    #[serde(default = "default_daily_parameters")]
    pub daily: Vec<String>,

    #[serde(default = "default_monthly_parameters")]
    pub monthly: Vec<String>,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            daily: default_daily_parameters(),
            monthly: default_monthly_parameters(),
        }
    }
}

/// Request budget and pacing
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests inside the short window
    #[serde(rename = "per-second", default = "default_per_second")]
    pub per_second: usize,

    /// Maximum requests inside the long window
    #[serde(rename = "per-hour", default = "default_per_hour")]
    pub per_hour: usize,

    #[serde(rename = "short-window-ms", default = "default_short_window_ms")]
    pub short_window_ms: u64,

    #[serde(rename = "long-window-secs", default = "default_long_window_secs")]
    pub long_window_secs: u64,

    /// Longest wait the run tolerates before aborting (seconds)
    #[serde(rename = "max-wait-secs", default = "default_max_wait_secs")]
    pub max_wait_secs: u64,

    #[serde(rename = "safety-margin-ms", default = "default_safety_margin_ms")]
    pub safety_margin_ms: u64,

    #[serde(rename = "pacing-min-ms", default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,

    #[serde(rename = "pacing-max-ms", default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,

    /// Every n-th request gets the longer pause
    #[serde(rename = "burst-every", default = "default_burst_every")]
    pub burst_every: u64,

    #[serde(rename = "burst-pause-min-ms", default = "default_burst_pause_min_ms")]
    pub burst_pause_min_ms: u64,

    #[serde(rename = "burst-pause-max-ms", default = "default_burst_pause_max_ms")]
    pub burst_pause_max_ms: u64,
}

impl RateLimitConfig {
    pub fn short_window(&self) -> Duration {
        Duration::from_millis(self.short_window_ms)
    }

    pub fn long_window(&self) -> Duration {
        Duration::from_secs(self.long_window_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: default_per_second(),
            per_hour: default_per_hour(),
            short_window_ms: default_short_window_ms(),
            long_window_secs: default_long_window_secs(),
            max_wait_secs: default_max_wait_secs(),
            safety_margin_ms: default_safety_margin_ms(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
            burst_every: default_burst_every(),
            burst_pause_min_ms: default_burst_pause_min_ms(),
            burst_pause_max_ms: default_burst_pause_max_ms(),
        }
    }
}

/// What to do when the provider permanently rejects a request (4xx other than 429)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientErrorPolicy {
    /// Count the block as failed and carry on
    FailBlock,
    /// Abort the whole run immediately
    AbortRun,
}

/// Retry and backoff behavior for a single fetch
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff for attempt n is base * 2^n
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(rename = "backoff-jitter-min-ms", default = "default_backoff_jitter_min_ms")]
    pub backoff_jitter_min_ms: u64,

    #[serde(rename = "backoff-jitter-max-ms", default = "default_backoff_jitter_max_ms")]
    pub backoff_jitter_max_ms: u64,

    #[serde(rename = "rate-limit-jitter-min-ms", default = "default_rate_limit_jitter_min_ms")]
    pub rate_limit_jitter_min_ms: u64,

    #[serde(rename = "rate-limit-jitter-max-ms", default = "default_rate_limit_jitter_max_ms")]
    pub rate_limit_jitter_max_ms: u64,

    /// Assumed cooldown when a 429 carries no usable reset header (seconds)
    #[serde(rename = "default-reset-secs", default = "default_reset_secs")]
    pub default_reset_secs: u64,

    #[serde(rename = "client-error-policy", default = "default_client_error_policy")]
    pub client_error_policy: ClientErrorPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter_min_ms: default_backoff_jitter_min_ms(),
            backoff_jitter_max_ms: default_backoff_jitter_max_ms(),
            rate_limit_jitter_min_ms: default_rate_limit_jitter_min_ms(),
            rate_limit_jitter_max_ms: default_rate_limit_jitter_max_ms(),
            default_reset_secs: default_reset_secs(),
            client_error_policy: default_client_error_policy(),
        }
    }
}

/// Chunking and circuit breaker settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Maximum station ids per request
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Failed blocks per period (and failed periods in a row) before aborting
    #[serde(rename = "max-failed-blocks", default = "default_max_failed_blocks")]
    pub max_failed_blocks: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_failed_blocks: default_max_failed_blocks(),
        }
    }
}

/// Store and crash buffer settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    #[serde(rename = "daily-table", default = "default_daily_table")]
    pub daily_table: String,

    #[serde(rename = "monthly-table", default = "default_monthly_table")]
    pub monthly_table: String,

    /// Directory holding the crash buffer files
    #[serde(rename = "buffer-dir", default = "default_buffer_dir")]
    pub buffer_dir: String,

    /// In-memory row count that triggers a spill to the buffer file
    #[serde(rename = "spill-threshold", default = "default_spill_threshold")]
    pub spill_threshold: usize,
}

/// Station metadata source
#[derive(Debug, Clone, Deserialize)]
pub struct StationsConfig {
    /// Path to the station metadata CSV
    pub path: String,
}

/// Optional static-site export after a successful run
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(rename = "site-dir", default = "default_site_dir")]
    pub site_dir: String,

    /// Export rows dated within this many days of today
    #[serde(rename = "recent-days", default = "default_recent_days")]
    pub recent_days: u32,

    /// HTML template copied to `<site-dir>/index.html` when present
    #[serde(default)]
    pub template: Option<String>,
}

fn default_base_url() -> String {
    "https://dataset.api.hub.geosphere.at/v1".to_string()
}

fn default_daily_dataset() -> String {
    "klima-v2-1d".to_string()
}

fn default_monthly_dataset() -> String {
    "klima-v2-1m".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_user_agent() -> String {
    format!("station-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_daily_parameters() -> Vec<String> {
    [
        "tl_mittel", "tlmax", "tlmin", "tsmin", "rr", "sh", "so_h", "p_mittel", "rf_mittel",
        "vv_mittel", "ffx", "cglo_j",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_monthly_parameters() -> Vec<String> {
    [
        "tl_mittel", "tlmax", "tlmin", "tsmin", "rr", "rr_max", "so_h", "so_r", "p", "rf_mittel",
        "vv_mittel", "tage_frost", "tage_eis", "tage_sommer", "tage_tropen",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_per_second() -> usize {
    5
}

fn default_per_hour() -> usize {
    220
}

fn default_short_window_ms() -> u64 {
    1000
}

fn default_long_window_secs() -> u64 {
    3600
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_safety_margin_ms() -> u64 {
    50
}

fn default_pacing_min_ms() -> u64 {
    300
}

fn default_pacing_max_ms() -> u64 {
    900
}

fn default_burst_every() -> u64 {
    10
}

fn default_burst_pause_min_ms() -> u64 {
    2000
}

fn default_burst_pause_max_ms() -> u64 {
    4000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_jitter_min_ms() -> u64 {
    500
}

fn default_backoff_jitter_max_ms() -> u64 {
    1000
}

fn default_rate_limit_jitter_min_ms() -> u64 {
    1000
}

fn default_rate_limit_jitter_max_ms() -> u64 {
    3000
}

fn default_reset_secs() -> u64 {
    30
}

fn default_client_error_policy() -> ClientErrorPolicy {
    ClientErrorPolicy::FailBlock
}

fn default_chunk_size() -> usize {
    488
}

fn default_max_failed_blocks() -> u32 {
    2
}

fn default_daily_table() -> String {
    "daily".to_string()
}

fn default_monthly_table() -> String {
    "monthly".to_string()
}

fn default_buffer_dir() -> String {
    ".".to_string()
}

fn default_spill_threshold() -> usize {
    250_000
}

fn default_site_dir() -> String {
    "site".to_string()
}

fn default_recent_days() -> u32 {
    7
}
