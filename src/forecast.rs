//! Additive time-series forecast: piecewise linear trend plus Fourier seasonalities,
//! fit as a ridge regression (MAP under Gaussian priors).

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};
use std::f64::consts::PI;
use tracing::{debug, info};

/// Smallest penalty applied to any coefficient so the normal equations stay solvable.
const PENALTY_FLOOR: f64 = 1e-6;

#[derive(Clone, Debug)]
pub struct ForecastConfig {
    pub horizon_days: usize,
    pub daily_seasonality: bool,
    /// `None` enables weekly seasonality when history spans two weeks or more.
    pub weekly_seasonality: Option<bool>,
    /// `None` enables yearly seasonality when history spans two years or more.
    pub yearly_seasonality: Option<bool>,
    pub n_changepoints: usize,
    /// Fraction of history rows in which changepoints may be placed.
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: crate::config::FORECAST_HORIZON_DAYS,
            daily_seasonality: false,
            weekly_seasonality: None,
            yearly_seasonality: None,
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
        }
    }
}

impl ForecastConfig {
    pub fn with_daily_seasonality(horizon_days: usize) -> Self {
        Self {
            horizon_days,
            daily_seasonality: true,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub yhat: f64,
}

/// Predictions for every day from the first observation to the end of the horizon.
#[derive(Clone, Debug)]
pub struct Forecast {
    pub points: Vec<ForecastPoint>,
}

#[derive(Clone, Copy, Debug)]
struct Seasonality {
    period: f64,
    order: usize,
}

const YEARLY: Seasonality = Seasonality { period: 365.25, order: 10 };
const WEEKLY: Seasonality = Seasonality { period: 7.0, order: 3 };
const DAILY: Seasonality = Seasonality { period: 1.0, order: 4 };

#[derive(Clone, Debug)]
pub struct FittedModel {
    origin: NaiveDate,
    /// Last date the model was fit on.
    last: NaiveDate,
    span_days: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
    coefficients: Vec<f64>,
}

impl FittedModel {
    pub fn fit(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<Self> {
        let mut rows: Vec<(NaiveDate, f64)> =
            series.iter().copied().filter(|(_, y)| y.is_finite()).collect();
        rows.sort_by_key(|(d, _)| *d);

        let n = rows.len();
        if n < 2 {
            bail!("need at least two observations to fit, got {}", n);
        }
        let origin = rows[0].0;
        let last = rows[n - 1].0;
        let span_days = (last - origin).num_days() as f64;
        if span_days <= 0.0 {
            bail!("history must span more than one day");
        }
        let y_scale = match rows.iter().map(|(_, y)| y.abs()).fold(0.0, f64::max) {
            m if m > 0.0 => m,
            _ => 1.0,
        };

        // Changepoints sit on observed rows, evenly spread over the leading share of history.
        let t: Vec<f64> = rows
            .iter()
            .map(|(d, _)| (*d - origin).num_days() as f64 / span_days)
            .collect();
        let hist_size = (n as f64 * config.changepoint_range).floor() as usize;
        let n_cp = config.n_changepoints.min(hist_size.saturating_sub(1));
        let changepoints: Vec<f64> = (1..=n_cp)
            .map(|k| {
                let idx = (k as f64 * (hist_size - 1) as f64 / n_cp as f64).round() as usize;
                t[idx]
            })
            .collect();

        let mut seasonalities = Vec::new();
        if config.yearly_seasonality.unwrap_or(span_days >= 730.0) {
            seasonalities.push(YEARLY);
        }
        if config.weekly_seasonality.unwrap_or(span_days >= 14.0) {
            seasonalities.push(WEEKLY);
        }
        if config.daily_seasonality {
            seasonalities.push(DAILY);
        }

        let mut model = Self {
            origin,
            last,
            span_days,
            y_scale,
            changepoints,
            seasonalities,
            coefficients: Vec::new(),
        };

        let design: Vec<Vec<f64>> = rows.iter().map(|(d, _)| model.features(*d)).collect();
        let targets: Vec<f64> = rows.iter().map(|(_, y)| y / y_scale).collect();
        let width = design[0].len();

        // First pass estimates the noise level that sets the prior penalties.
        let coarse = ridge_solve(&design, &targets, &vec![PENALTY_FLOOR; width])?;
        let rss: f64 = design
            .iter()
            .zip(&targets)
            .map(|(x, y)| (y - dot(x, &coarse)).powi(2))
            .sum();
        let sigma2 = rss / n as f64;

        let penalties: Vec<f64> = (0..width)
            .map(|j| {
                let raw = if j < 2 {
                    0.0
                } else if j < 2 + n_cp {
                    sigma2 / config.changepoint_prior_scale.powi(2)
                } else {
                    sigma2 / config.seasonality_prior_scale.powi(2)
                };
                raw.max(PENALTY_FLOOR)
            })
            .collect();
        model.coefficients = ridge_solve(&design, &targets, &penalties)?;

        info!(
            "Fitted forecast model: rows={} changepoints={} seasonalities={} sigma={:.5}",
            n,
            n_cp,
            model.seasonalities.len(),
            sigma2.sqrt() * y_scale
        );
        Ok(model)
    }

    /// `[1, t, (t - s_j)+ ..., sin/cos terms ...]` for one date.
    fn features(&self, date: NaiveDate) -> Vec<f64> {
        let days = (date - self.origin).num_days() as f64;
        let t = days / self.span_days;

        let mut row = Vec::with_capacity(2 + self.changepoints.len() + 16);
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|&s| (t - s).max(0.0)));
        for season in &self.seasonalities {
            for k in 1..=season.order {
                let angle = 2.0 * PI * k as f64 * days / season.period;
                row.push(angle.sin());
                row.push(angle.cos());
            }
        }
        row
    }

    pub fn predict(&self, date: NaiveDate) -> f64 {
        dot(&self.features(date), &self.coefficients) * self.y_scale
    }
}

/// Fits the series and predicts every day from its first date to `horizon_days`
/// past its last date.
pub fn forecast(series: &[(NaiveDate, f64)], config: &ForecastConfig) -> Result<Forecast> {
    let model = FittedModel::fit(series, config)?;
    let end = model.last + Duration::days(config.horizon_days as i64);

    let mut points = Vec::new();
    let mut day = model.origin;
    while day <= end {
        points.push(ForecastPoint {
            date: day,
            yhat: model.predict(day),
        });
        day += Duration::days(1);
    }
    debug!("Forecast produced {} points through {}", points.len(), end);
    Ok(Forecast { points })
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Solves `(XᵀX + diag(penalties)) β = Xᵀy`.
fn ridge_solve(design: &[Vec<f64>], targets: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    let p = penalties.len();
    let mut a = vec![vec![0.0; p]; p];
    let mut b = vec![0.0; p];
    for (x, y) in design.iter().zip(targets) {
        for i in 0..p {
            b[i] += x[i] * y;
            for j in i..p {
                a[i][j] += x[i] * x[j];
            }
        }
    }
    for i in 0..p {
        for j in 0..i {
            a[i][j] = a[j][i];
        }
        a[i][i] += penalties[i];
    }
    solve_linear(a, b)
}

/// Gaussian elimination with partial pivoting.
fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-300 {
            bail!("singular system while fitting forecast model");
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
