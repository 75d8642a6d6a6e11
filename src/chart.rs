//! Backend-independent chart descriptions. The GUI turns these into plot windows.

use crate::data::StockData;
use crate::forecast::Forecast;
use chrono::{NaiveDate, NaiveTime};

pub const X_LABEL: &str = "Date";
pub const Y_LABEL: &str = "Price (USD)";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    Solid,
    Dashed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartLine {
    pub name: String,
    /// `[unix seconds, price]`
    pub points: Vec<[f64; 2]>,
    pub kind: LineKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Chart {
    pub title: String,
    pub lines: Vec<ChartLine>,
}

fn x_of(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64
}

fn line_from_series(name: &str, series: &[(NaiveDate, f64)], kind: LineKind) -> ChartLine {
    ChartLine {
        name: name.to_string(),
        points: series.iter().map(|&(d, y)| [x_of(d), y]).collect(),
        kind,
    }
}

/// Legend label for a portfolio member.
pub fn legend_label(symbol: &str) -> String {
    symbol.replace(' ', "_")
}

impl Chart {
    pub fn price_history(data: &StockData) -> Self {
        Self {
            title: format!("{} Stock Price Analysis", data.symbol),
            lines: vec![line_from_series(
                "Historical Prices",
                &data.price_series(),
                LineKind::Solid,
            )],
        }
    }

    pub fn portfolio() -> Self {
        Self {
            title: "Portfolio Stock Price Analysis".to_string(),
            lines: Vec::new(),
        }
    }

    pub fn add_symbol(&mut self, data: &StockData) {
        self.lines.push(line_from_series(
            &legend_label(&data.symbol),
            &data.price_series(),
            LineKind::Solid,
        ));
    }

    pub fn prediction(data: &StockData, forecast: &Forecast) -> Self {
        let predicted: Vec<(NaiveDate, f64)> =
            forecast.points.iter().map(|p| (p.date, p.yhat)).collect();
        Self {
            title: format!("{} Stock Price Prediction", data.symbol),
            lines: vec![
                line_from_series("Actual Prices", &data.price_series(), LineKind::Solid),
                line_from_series("Predicted Prices", &predicted, LineKind::Dashed),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
