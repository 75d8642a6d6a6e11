use thiserror::Error;

/// Failures of a user action. The `Display` text is what the user sees in the
/// error dialog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Please enter a stock symbol.")]
    EmptySymbol,

    #[error("Error fetching data: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("Error fetching data for {symbol}: {reason}")]
    PortfolioFetch { symbol: String, reason: String },

    #[error("Please fetch data first.")]
    NoDataFetched,

    #[error("Forecast failed: {0}")]
    Forecast(String),
}

impl ActionError {
    pub fn fetch(symbol: &str, err: &anyhow::Error) -> Self {
        Self::Fetch {
            symbol: symbol.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub fn portfolio_fetch(symbol: &str, err: &anyhow::Error) -> Self {
        Self::PortfolioFetch {
            symbol: symbol.to_string(),
            reason: format!("{:#}", err),
        }
    }
}
