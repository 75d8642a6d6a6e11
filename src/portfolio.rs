use crate::error::ActionError;

/// Shown instead of an empty listing.
pub const EMPTY_PORTFOLIO_MESSAGE: &str = "Portfolio is empty.";

/// Trims and uppercases a ticker as typed by the user.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    AlreadyPresent(String),
}

impl AddOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Added(symbol) => format!("{} added to portfolio.", symbol),
            Self::AlreadyPresent(symbol) => format!("{} is already in the portfolio.", symbol),
        }
    }
}

/// Ordered set of ticker symbols kept for the lifetime of the session.
#[derive(Clone, Debug, Default)]
pub struct Portfolio {
    symbols: Vec<String>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, raw: &str) -> Result<AddOutcome, ActionError> {
        let symbol = normalize_symbol(raw);
        if symbol.is_empty() {
            return Err(ActionError::EmptySymbol);
        }
        if self.symbols.contains(&symbol) {
            return Ok(AddOutcome::AlreadyPresent(symbol));
        }
        self.symbols.push(symbol.clone());
        Ok(AddOutcome::Added(symbol))
    }

    /// One symbol per line, or [`EMPTY_PORTFOLIO_MESSAGE`].
    pub fn list(&self) -> String {
        if self.symbols.is_empty() {
            EMPTY_PORTFOLIO_MESSAGE.to_string()
        } else {
            self.symbols.join("\n")
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
