use crate::config::{AppConfig, DataProviderMode};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Weekday};
use rand::prelude::*;
use serde::Deserialize;
use std::future::Future;
use tracing::{debug, info};

/// Represents a single candlestick data point (OHLCV).
#[derive(Clone, Debug, PartialEq)]
#[allow(dead_code)]
pub struct Candle {
    /// Session time in the exchange's own UTC offset.
    pub date: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Holds historical stock data for a specific symbol.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

impl StockData {
    /// Date/close pairs in chronological order.
    pub fn price_series(&self) -> Vec<(NaiveDate, f64)> {
        self.history
            .iter()
            .map(|c| (c.date.date_naive(), c.close))
            .collect()
    }
}

/// Calendar range of a fetch. `end` is exclusive, like a typical history download.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Unix seconds of `start` and `end` at midnight UTC.
    pub fn period_bounds(&self) -> (i64, i64) {
        (
            self.start.and_time(NaiveTime::MIN).and_utc().timestamp(),
            self.end.and_time(NaiveTime::MIN).and_utc().timestamp(),
        )
    }
}

/// Anything that can produce a daily price history for a symbol.
pub trait PriceSource: Send + Sync + 'static {
    fn fetch_history(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> impl Future<Output = Result<StockData>> + Send;
}

// ──────────────────────────────────────────────────────────────────────────────
// Yahoo Finance
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Debug)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct YahooMeta {
    /// Exchange offset from UTC in seconds.
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Deserialize, Debug)]
struct YahooResult {
    #[serde(default)]
    meta: YahooMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn yahoo_response_to_stock_data(symbol: &str, response: YahooChartResponse) -> Result<StockData> {
    if let Some(err) = response.chart.error {
        let description = err
            .description
            .or(err.code)
            .unwrap_or_else(|| "unknown provider error".to_string());
        bail!("{}", description);
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or(anyhow!("No data found for {}", symbol))?;
    let quotes = result
        .indicators
        .quote
        .first()
        .ok_or(anyhow!("No quote data for {}", symbol))?;

    let exchange_offset = FixedOffset::east_opt(result.meta.gmtoffset)
        .ok_or(anyhow!("Invalid exchange offset {} for {}", result.meta.gmtoffset, symbol))?;
    let field = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut history = Vec::with_capacity(result.timestamp.len());
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        if let (Some(open), Some(high), Some(low), Some(close), Some(volume), Some(date)) = (
            field(&quotes.open, i),
            field(&quotes.high, i),
            field(&quotes.low, i),
            field(&quotes.close, i),
            field(&quotes.volume, i),
            exchange_offset.timestamp_opt(timestamp, 0).single(),
        ) {
            history.push(Candle { date, open, high, low, close, volume });
        }
    }

    if history.is_empty() {
        bail!("No price data for {} in the selected date range", symbol);
    }

    Ok(StockData {
        symbol: symbol.to_uppercase(),
        history,
    })
}

pub struct YahooSource {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl YahooSource {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn chart_url(&self, symbol: &str, range: DateRange) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid Yahoo Finance base URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Yahoo Finance base URL {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        let (period1, period2) = range.period_bounds();
        url.query_pairs_mut()
            .append_pair("period1", &period1.to_string())
            .append_pair("period2", &period2.to_string())
            .append_pair("interval", "1d");
        Ok(url)
    }
}

impl PriceSource for YahooSource {
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<StockData> {
        let url = self.chart_url(symbol, range)?;
        info!("Fetching {} from {} to {}", symbol, range.start, range.end);

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("request for {} failed", symbol))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response for {}", symbol))?;

        // Unknown symbols come back as 404 with an error payload worth showing.
        let parsed: YahooChartResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => bail!("HTTP {} for {}", status, symbol),
            Err(e) => return Err(e).with_context(|| format!("malformed response for {}", symbol)),
        };

        let data = yahoo_response_to_stock_data(symbol, parsed)?;
        debug!("Fetched {} rows for {}", data.history.len(), symbol);
        Ok(data)
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Offline mock
// ──────────────────────────────────────────────────────────────────────────────

/// Deterministic random walk per symbol, one candle per weekday.
pub struct MockSource;

impl MockSource {
    pub fn generate(symbol: &str, range: DateRange) -> StockData {
        let symbol = symbol.to_uppercase();
        let seed = symbol
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut current_price: f64 = rng.gen_range(20.0..500.0);
        let mut history = Vec::new();
        let mut day = range.start;

        while day < range.end {
            if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                let volatility = 0.02; // 2% daily volatility
                let change_pct: f64 = rng.gen_range(-volatility..volatility);
                let open = current_price;
                let close = open * (1.0 + change_pct);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
                let volume = rng.gen_range(1000.0..10000.0);

                history.push(Candle {
                    date: day.and_time(NaiveTime::MIN).and_utc().fixed_offset(),
                    open,
                    high,
                    low,
                    close,
                    volume,
                });
                current_price = close;
            }
            day += Duration::days(1);
        }

        StockData { symbol, history }
    }
}

impl PriceSource for MockSource {
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<StockData> {
        let data = Self::generate(symbol, range);
        if data.history.is_empty() {
            bail!("No price data for {} in the selected date range", symbol);
        }
        Ok(data)
    }
}

/// The price source selected by configuration.
pub enum DataProvider {
    Yahoo(YahooSource),
    Mock(MockSource),
}

impl DataProvider {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        info!("Data provider: {}", config.provider.as_str());
        Ok(match config.provider {
            DataProviderMode::Yahoo => {
                Self::Yahoo(YahooSource::new(&config.yahoo_base_url, config.http_timeout)?)
            }
            DataProviderMode::Mock => Self::Mock(MockSource),
        })
    }
}

impl PriceSource for DataProvider {
    async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<StockData> {
        match self {
            Self::Yahoo(source) => source.fetch_history(symbol, range).await,
            Self::Mock(source) => source.fetch_history(symbol, range).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_yahoo_rows_with_nulls_are_dropped() {
        let body = r#"{
            "chart": {
                "result": [{
                    "meta": {"symbol": "AAPL"},
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {"quote": [{
                        "open":   [187.1, null, 182.1],
                        "high":   [188.4, 185.8, 183.0],
                        "low":    [183.8, 183.4, 180.8],
                        "close":  [185.6, 184.2, 181.9],
                        "volume": [82488700, 58414500, 71983600]
                    }]}
                }],
                "error": null
            }
        }"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let data = yahoo_response_to_stock_data("aapl", parsed).unwrap();

        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.history.len(), 2);
        let series = data.price_series();
        assert_eq!(series[0], (date(2024, 1, 2), 185.6));
        assert_eq!(series[1], (date(2024, 1, 4), 181.9));
    }

    #[test]
    fn test_yahoo_rows_dated_in_exchange_time() {
        // 2024-01-03 10:00 AEDT is still 2024-01-02 in UTC.
        let body = r#"{
            "chart": {
                "result": [{
                    "meta": {"symbol": "BHP.AX", "gmtoffset": 39600},
                    "timestamp": [1704236400],
                    "indicators": {"quote": [{
                        "open": [45.1], "high": [45.9], "low": [44.8],
                        "close": [45.5], "volume": [6120000]
                    }]}
                }],
                "error": null
            }
        }"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let data = yahoo_response_to_stock_data("BHP.AX", parsed).unwrap();

        assert_eq!(data.price_series(), vec![(date(2024, 1, 3), 45.5)]);
        assert_eq!(data.history[0].date.timestamp(), 1704236400);
    }

    #[test]
    fn test_yahoo_error_payload_is_a_failure() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        let err = yahoo_response_to_stock_data("NOPE", parsed).unwrap_err();
        assert_eq!(err.to_string(), "No data found, symbol may be delisted");
    }

    #[test]
    fn test_yahoo_empty_range_is_a_failure() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        let parsed: YahooChartResponse = serde_json::from_str(body).unwrap();
        assert!(yahoo_response_to_stock_data("AAPL", parsed).is_err());
    }

    #[test]
    fn test_chart_url_carries_period_bounds() {
        let source = YahooSource::new("https://example.com/", std::time::Duration::from_secs(1)).unwrap();
        let range = DateRange::new(date(2024, 1, 1), date(2024, 2, 1));
        let url = source.chart_url("BRK-B", range).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/v8/finance/chart/BRK-B?period1=1704067200&period2=1706745600&interval=1d"
        );
    }

    #[test]
    fn test_mock_is_deterministic_and_skips_weekends() {
        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 15));
        let a = MockSource::generate("msft", range);
        let b = MockSource::generate("MSFT", range);

        // Jan 1-14 2024 holds ten weekdays.
        assert_eq!(a.history.len(), 10);
        assert_eq!(a.symbol, "MSFT");
        assert_eq!(a.history, b.history);
        assert!(a
            .history
            .iter()
            .all(|c| !matches!(c.date.weekday(), Weekday::Sat | Weekday::Sun)));
    }

    #[tokio::test]
    async fn test_mock_rejects_empty_range() {
        let day = date(2024, 3, 1);
        let result = MockSource.fetch_history("SPY", DateRange::new(day, day)).await;
        assert!(result.is_err());
    }

    /// Answers a single HTTP request with a canned response and returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider_at(base_url: String) -> DataProvider {
        let config = AppConfig::from_lookup(move |key| {
            (key == "STOCKSCOPE_YAHOO_BASE_URL").then(|| base_url.clone())
        });
        DataProvider::from_config(&config).unwrap()
    }

    fn january() -> DateRange {
        DateRange::new(date(2024, 1, 1), date(2024, 2, 1))
    }

    #[tokio::test]
    async fn test_yahoo_fetch_parses_served_history() {
        let base = serve_once(
            "200 OK",
            r#"{"chart":{"result":[{"timestamp":[1704205800],"indicators":{"quote":[{"open":[187.1],"high":[188.4],"low":[183.8],"close":[185.6],"volume":[82488700]}]}}],"error":null}}"#,
        )
        .await;
        let data = provider_at(base).fetch_history("AAPL", january()).await.unwrap();
        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.price_series(), vec![(date(2024, 1, 2), 185.6)]);
    }

    #[tokio::test]
    async fn test_yahoo_not_found_surfaces_provider_description() {
        let base = serve_once(
            "404 Not Found",
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .await;
        let err = provider_at(base).fetch_history("NOPE", january()).await.unwrap_err();
        assert_eq!(err.to_string(), "No data found, symbol may be delisted");
    }

    #[tokio::test]
    async fn test_yahoo_non_json_error_reports_status() {
        let base = serve_once("502 Bad Gateway", "<html>upstream down</html>").await;
        let err = provider_at(base).fetch_history("AAPL", january()).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502 Bad Gateway for AAPL");
    }
}
