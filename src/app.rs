use crate::chart::Chart;
use crate::data::{DateRange, PriceSource, StockData};
use crate::error::ActionError;
use crate::forecast::{self, ForecastConfig};
use crate::portfolio::{normalize_symbol, AddOutcome, Portfolio, EMPTY_PORTFOLIO_MESSAGE};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// User actions, one per button.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Analyze { symbol: String, range: DateRange },
    AddToPortfolio { symbol: String },
    ViewPortfolio,
    AnalyzePortfolio { range: DateRange },
    Predict,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A modal message for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub body: String,
}

impl Notice {
    pub fn info(title: &str, body: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.to_string(),
            body: body.into(),
        }
    }

    pub fn error(err: &ActionError) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "Error".to_string(),
            body: err.to_string(),
        }
    }
}

/// Everything a command produced, delivered to the GUI in one piece.
#[derive(Clone, Debug, Default)]
pub struct Outcome {
    pub notices: Vec<Notice>,
    pub chart: Option<Chart>,
    /// Set after a successful single-symbol analysis.
    pub analyzed_symbol: Option<String>,
}

/// Result of plotting every portfolio symbol on one chart.
#[derive(Clone, Debug)]
pub struct BatchReport {
    pub chart: Chart,
    pub failures: Vec<ActionError>,
}

/// Session state: the portfolio and the most recent single-symbol fetch.
pub struct App<S: PriceSource> {
    source: S,
    portfolio: Portfolio,
    stock_data: Option<Arc<StockData>>,
    forecast_config: ForecastConfig,
}

impl<S: PriceSource> App<S> {
    pub fn new(source: S, forecast_horizon_days: usize) -> Self {
        Self {
            source,
            portfolio: Portfolio::new(),
            stock_data: None,
            forecast_config: ForecastConfig::with_daily_seasonality(forecast_horizon_days),
        }
    }

    #[cfg(test)]
    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn stock_data(&self) -> Option<&StockData> {
        self.stock_data.as_deref()
    }

    /// Fetches one symbol and charts its closing prices. On failure the previously
    /// fetched data is kept.
    pub async fn analyze(&mut self, raw_symbol: &str, range: DateRange) -> Result<Chart, ActionError> {
        let symbol = normalize_symbol(raw_symbol);
        if symbol.is_empty() {
            return Err(ActionError::EmptySymbol);
        }

        let data = self
            .source
            .fetch_history(&symbol, range)
            .await
            .map_err(|e| ActionError::fetch(&symbol, &e))?;
        let chart = Chart::price_history(&data);
        self.stock_data = Some(Arc::new(data));
        Ok(chart)
    }

    pub fn add_to_portfolio(&mut self, raw_symbol: &str) -> Result<AddOutcome, ActionError> {
        self.portfolio.add(raw_symbol)
    }

    pub fn view_portfolio(&self) -> String {
        self.portfolio.list()
    }

    /// Charts every portfolio symbol over the same range. Each failed fetch is
    /// recorded and the remaining symbols still run. `None` when the portfolio is empty.
    pub async fn analyze_portfolio(&self, range: DateRange) -> Option<BatchReport> {
        if self.portfolio.is_empty() {
            return None;
        }

        let mut chart = Chart::portfolio();
        let mut failures = Vec::new();
        for symbol in self.portfolio.symbols() {
            match self.source.fetch_history(symbol, range).await {
                Ok(data) => chart.add_symbol(&data),
                Err(e) => {
                    warn!("Portfolio fetch failed for {}: {:#}", symbol, e);
                    failures.push(ActionError::portfolio_fetch(symbol, &e));
                }
            }
        }
        Some(BatchReport { chart, failures })
    }

    /// Fits the forecast model to the last fetched series and charts actual vs predicted.
    pub fn predict(&self) -> Result<Chart, ActionError> {
        let data = self.stock_data.as_ref().ok_or(ActionError::NoDataFetched)?;
        let forecast = forecast::forecast(&data.price_series(), &self.forecast_config)
            .map_err(|e| ActionError::Forecast(format!("{:#}", e)))?;
        Ok(Chart::prediction(data, &forecast))
    }

    pub async fn handle(&mut self, command: Command) -> Outcome {
        info!("Handling {:?}", command);
        let mut outcome = Outcome::default();
        match command {
            Command::Analyze { symbol, range } => match self.analyze(&symbol, range).await {
                Ok(chart) => {
                    outcome.analyzed_symbol = self.stock_data().map(|d| d.symbol.clone());
                    outcome.chart = Some(chart);
                }
                Err(e) => outcome.notices.push(Notice::error(&e)),
            },
            Command::AddToPortfolio { symbol } => match self.add_to_portfolio(&symbol) {
                Ok(added) => outcome.notices.push(Notice::info("Info", added.message())),
                Err(e) => outcome.notices.push(Notice::error(&e)),
            },
            Command::ViewPortfolio => {
                outcome.notices.push(Notice::info("Portfolio", self.view_portfolio()));
            }
            Command::AnalyzePortfolio { range } => match self.analyze_portfolio(range).await {
                None => outcome.notices.push(Notice::info("Info", EMPTY_PORTFOLIO_MESSAGE)),
                Some(report) => {
                    outcome
                        .notices
                        .extend(report.failures.iter().map(Notice::error));
                    if !report.chart.is_empty() {
                        outcome.chart = Some(report.chart);
                    }
                }
            },
            Command::Predict => match self.predict() {
                Ok(chart) => outcome.chart = Some(chart),
                Err(e) => outcome.notices.push(Notice::error(&e)),
            },
        }
        outcome
    }
}

/// GUI side of a running session.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
}

impl SessionHandle {
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn try_recv(&mut self) -> Option<Outcome> {
        self.outcomes.try_recv().ok()
    }
}

/// Runs the session on its own task. Commands are handled strictly in order with
/// one outcome each; `notify` fires after every outcome so the GUI can repaint.
pub fn spawn_session<S, F>(mut app: App<S>, runtime: &Handle, notify: F) -> SessionHandle
where
    S: PriceSource,
    F: Fn() + Send + Sync + 'static,
{
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<Outcome>();

    runtime.spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let outcome = app.handle(command).await;
            if outcome_tx.send(outcome).is_err() {
                break;
            }
            notify();
        }
        info!("Session task stopped");
    });

    SessionHandle {
        commands: command_tx,
        outcomes: outcome_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::LineKind;
    use crate::data::MockSource;
    use anyhow::{bail, Result};
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Serves mock data, fails for listed symbols and records every call.
    #[derive(Default)]
    struct ScriptedSource {
        failing: HashSet<String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedSource {
        fn failing(symbols: &[&str]) -> Self {
            Self {
                failing: symbols.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    impl PriceSource for ScriptedSource {
        async fn fetch_history(&self, symbol: &str, range: DateRange) -> Result<StockData> {
            self.calls.lock().unwrap().push(symbol.to_string());
            if self.failing.contains(symbol) {
                bail!("symbol not found");
            }
            Ok(MockSource::generate(symbol, range))
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
    }

    fn app_with(source: ScriptedSource) -> (App<ScriptedSource>, Arc<Mutex<Vec<String>>>) {
        let calls = source.calls.clone();
        (App::new(source, 1825), calls)
    }

    #[tokio::test]
    async fn test_empty_symbol_rejected_before_fetch() {
        let (mut app, calls) = app_with(ScriptedSource::default());
        assert_eq!(app.analyze("   ", range()).await, Err(ActionError::EmptySymbol));
        assert!(calls.lock().unwrap().is_empty());
        assert!(app.stock_data().is_none());
    }

    #[tokio::test]
    async fn test_analyze_normalizes_and_stores_data() {
        let (mut app, calls) = app_with(ScriptedSource::default());
        let chart = app.analyze(" nvda", range()).await.unwrap();

        assert_eq!(chart.title, "NVDA Stock Price Analysis");
        assert_eq!(calls.lock().unwrap().as_slice(), ["NVDA"]);
        assert_eq!(app.stock_data().unwrap().symbol, "NVDA");
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_data() {
        let (mut app, _) = app_with(ScriptedSource::failing(&["BAD"]));
        app.analyze("SPY", range()).await.unwrap();

        let err = app.analyze("bad", range()).await.unwrap_err();
        assert_eq!(err.to_string(), "Error fetching data: symbol not found");
        assert_eq!(app.stock_data().unwrap().symbol, "SPY");
    }

    #[test]
    fn test_predict_requires_fetch() {
        let (app, _) = app_with(ScriptedSource::default());
        let err = app.predict().unwrap_err();
        assert_eq!(err, ActionError::NoDataFetched);
        assert_eq!(err.to_string(), "Please fetch data first.");
    }

    #[tokio::test]
    async fn test_predict_after_fetch() {
        let (mut app, _) = app_with(ScriptedSource::default());
        app.analyze("QQQ", range()).await.unwrap();
        let chart = app.predict().unwrap();

        assert_eq!(chart.title, "QQQ Stock Price Prediction");
        assert_eq!(chart.lines.len(), 2);
        assert_eq!(chart.lines[0].name, "Actual Prices");
        assert_eq!(chart.lines[1].name, "Predicted Prices");
        assert_eq!(chart.lines[1].kind, LineKind::Dashed);

        let last_actual = chart.lines[0].points.last().unwrap()[0];
        let last_predicted = chart.lines[1].points.last().unwrap()[0];
        assert_eq!(last_predicted - last_actual, 1825.0 * 86_400.0);
    }

    #[tokio::test]
    async fn test_batch_continues_after_failure() {
        let (mut app, calls) = app_with(ScriptedSource::failing(&["BAD"]));
        for s in ["aapl", "bad", "msft"] {
            app.add_to_portfolio(s).unwrap();
        }

        let report = app.analyze_portfolio(range()).await.unwrap();
        let names: Vec<&str> = report.chart.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["AAPL", "MSFT"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].to_string(),
            "Error fetching data for BAD: symbol not found"
        );
        assert_eq!(calls.lock().unwrap().len(), 3);
        // Batch runs never replace the single-symbol dataset.
        assert!(app.stock_data().is_none());
    }

    #[tokio::test]
    async fn test_empty_portfolio_reports_info() {
        let (mut app, calls) = app_with(ScriptedSource::default());
        let outcome = app.handle(Command::AnalyzePortfolio { range: range() }).await;

        assert_eq!(outcome.notices, [Notice::info("Info", "Portfolio is empty.")]);
        assert!(outcome.chart.is_none());
        assert!(calls.lock().unwrap().is_empty());

        let outcome = app.handle(Command::ViewPortfolio).await;
        assert_eq!(outcome.notices[0].body, "Portfolio is empty.");
    }

    #[tokio::test]
    async fn test_handle_add_twice() {
        let (mut app, _) = app_with(ScriptedSource::default());
        let first = app
            .handle(Command::AddToPortfolio { symbol: "aapl".into() })
            .await;
        let second = app
            .handle(Command::AddToPortfolio { symbol: "AAPL".into() })
            .await;

        assert_eq!(first.notices[0].body, "AAPL added to portfolio.");
        assert_eq!(second.notices[0].body, "AAPL is already in the portfolio.");
        assert_eq!(app.portfolio().symbols(), ["AAPL"]);
    }

    #[tokio::test]
    async fn test_handle_all_failures_shows_no_chart() {
        let (mut app, _) = app_with(ScriptedSource::failing(&["X", "Y"]));
        app.add_to_portfolio("x").unwrap();
        app.add_to_portfolio("y").unwrap();

        let outcome = app.handle(Command::AnalyzePortfolio { range: range() }).await;
        assert!(outcome.chart.is_none());
        assert_eq!(outcome.notices.len(), 2);
        assert!(outcome.notices.iter().all(|n| n.level == NoticeLevel::Error));
    }

    #[tokio::test]
    async fn test_handle_analyze_reports_symbol() {
        let (mut app, _) = app_with(ScriptedSource::default());
        let outcome = app
            .handle(Command::Analyze { symbol: "tsla".into(), range: range() })
            .await;
        assert_eq!(outcome.analyzed_symbol.as_deref(), Some("TSLA"));
        assert!(outcome.chart.is_some());
        assert!(outcome.notices.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_session_answers_in_order() {
        let (app, _) = app_with(ScriptedSource::default());
        let mut handle = spawn_session(app, &Handle::current(), || {});

        assert!(handle.send(Command::AddToPortfolio { symbol: "spy".into() }));
        assert!(handle.send(Command::ViewPortfolio));

        let mut bodies = Vec::new();
        while bodies.len() < 2 {
            match handle.try_recv() {
                Some(outcome) => bodies.push(outcome.notices[0].body.clone()),
                None => tokio::task::yield_now().await,
            }
        }
        assert_eq!(bodies, ["SPY added to portfolio.", "SPY"]);
    }
}
