use std::time::Duration;
use tracing::warn;

/// Days appended past the last observation when forecasting (five years).
pub const FORECAST_HORIZON_DAYS: usize = 1825;

/// Span of the date pickers when the window first opens.
pub const DEFAULT_RANGE_DAYS: i64 = 365;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Pause between live feed reconnect attempts.
pub const LIVE_RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub const WINDOW_TITLE: &str = "Stock Market Analysis and Prediction App";
pub const WINDOW_SIZE: [f32; 2] = [1100.0, 720.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataProviderMode {
    Yahoo,
    Mock,
}

impl DataProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Mock => "mock",
        }
    }

    /// Parses a provider name, falling back to Yahoo for anything unknown.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yahoo" | "yfinance" | "" => Self::Yahoo,
            "mock" | "offline" => Self::Mock,
            other => {
                warn!(
                    "Unknown STOCKSCOPE_DATA_PROVIDER={} ; defaulting to yahoo. Allowed values: yahoo | mock",
                    other
                );
                Self::Yahoo
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub provider: DataProviderMode,
    pub yahoo_base_url: String,
    pub http_timeout: Duration,
    /// Websocket URL with a `{symbol}` placeholder. The live feed stays off when unset.
    pub live_url_template: Option<String>,
    pub forecast_horizon_days: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: DataProviderMode::Yahoo,
            yahoo_base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            live_url_template: None,
            forecast_horizon_days: FORECAST_HORIZON_DAYS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup so it can be exercised without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(provider) = non_empty("STOCKSCOPE_DATA_PROVIDER") {
            config.provider = DataProviderMode::parse(&provider);
        }
        if let Some(base) = non_empty("STOCKSCOPE_YAHOO_BASE_URL") {
            config.yahoo_base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(raw) = non_empty("STOCKSCOPE_HTTP_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.http_timeout = Duration::from_secs(secs),
                _ => warn!(
                    "Ignoring STOCKSCOPE_HTTP_TIMEOUT_SECS={} ; using {}s",
                    raw, DEFAULT_HTTP_TIMEOUT_SECS
                ),
            }
        }
        config.live_url_template = non_empty("STOCKSCOPE_LIVE_URL");
        config
    }
}
