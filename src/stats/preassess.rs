//! # Pre-assessment
//!
//! $$
//! e(p) = \operatorname{E}_j\left[\left(\frac{\hat r_{j,p} - r_{j+\delta}}{s_{j,p}}\right)^2\right]
//! $$
//!
//! Diagnostics run on a single asset before it enters a portfolio: how
//! returns behave with the holding period, how well a trailing window
//! predicts a later return, and how often the price strays from its trend.

use std::fmt::Display;
use std::str::FromStr;

use chrono::Duration;
use chrono::NaiveDateTime;
use ndarray::Array1;
use ndarray::ArrayView1;

use super::robust::dispersion;
use super::robust::expected;
use super::robust::mean_of;
use crate::config::Method;
use crate::config::Metric;
use crate::error::PortfolioError;
use crate::error::Result;

/// Expected return and dispersion per holding lag.
#[derive(Clone, Debug)]
pub struct RunningReturns {
  pub lags: Vec<usize>,
  pub expected: Array1<f64>,
  pub dispersion: Array1<f64>,
}

/// Expected return and dispersion of every `lag`-step return in `prices`,
/// for lags `0..floor(n * max_hold_frac)`.
///
/// Lags stop at `n - 2`, the longest holding period that still leaves two
/// returns for a sample dispersion.
pub fn running_returns(
  prices: ArrayView1<f64>,
  max_hold_frac: f64,
  metric: Metric,
  method: Method,
) -> Result<RunningReturns> {
  if !(0.0..=1.0).contains(&max_hold_frac) {
    return Err(PortfolioError::InvalidArgument(format!(
      "holding fraction must lie in [0, 1], got {max_hold_frac}"
    )));
  }

  let n = prices.len();
  let max_lag = ((n as f64 * max_hold_frac) as usize).min(n.saturating_sub(1));
  let mut exp = Vec::with_capacity(max_lag);
  let mut disp = Vec::with_capacity(max_lag);

  for lag in 0..max_lag {
    let r = Array1::from_iter((0..n - lag).map(|j| metric.apply(prices[j], prices[j + lag])));
    exp.push(expected(r.view(), method)?);
    disp.push(dispersion(r.view(), method.into())?);
  }

  Ok(RunningReturns {
    lags: (0..max_lag).collect(),
    expected: Array1::from(exp),
    dispersion: Array1::from(disp),
  })
}

/// Denominator of the prediction error in [`period_error`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorScale {
  /// Raw squared error.
  #[default]
  None,
  /// Relative to the predicted return.
  Expected,
  /// Relative to the dispersion of the window.
  Disp,
}

impl FromStr for ErrorScale {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "none" => Ok(Self::None),
      "expected" => Ok(Self::Expected),
      "disp" | "dispersion" => Ok(Self::Disp),
      _ => Err(PortfolioError::InvalidArgument(format!("unknown error scale: {s}"))),
    }
  }
}

impl Display for ErrorScale {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::None => write!(f, "None"),
      Self::Expected => write!(f, "Expected"),
      Self::Disp => write!(f, "Disp"),
    }
  }
}

/// Average prediction error for each window length in `p_min..p_max`.
///
/// For a window of `p` returns ending before index `j`, the prediction is
/// the window's expected value and the outcome is `returns[j + act_delta]`.
/// Errors are squared, optionally scaled, and averaged with the expected
/// value estimator of `method`. Windows whose outcome is NaN are skipped.
pub fn period_error(
  returns: ArrayView1<f64>,
  p_min: usize,
  p_max: usize,
  act_delta: usize,
  scale: ErrorScale,
  method: Method,
) -> Result<Array1<f64>> {
  let n = returns.len();
  if p_min == 0 || p_min >= p_max {
    return Err(PortfolioError::InvalidArgument(format!(
      "window range must satisfy 1 <= p_min < p_max, got {p_min}..{p_max}"
    )));
  }
  if p_max + act_delta > n {
    return Err(PortfolioError::InsufficientData {
      estimator: "period error",
      required: p_max + act_delta,
      available: n,
    });
  }

  let mut out = Vec::with_capacity(p_max - p_min);
  for period in p_min..p_max {
    let mut errors = Vec::new();
    for j in period..n - act_delta {
      let actual = returns[j + act_delta];
      if actual.is_nan() {
        continue;
      }
      let window = returns.slice(ndarray::s![j - period..j]);
      let predicted = expected(window, method)?;
      let denom = match scale {
        ErrorScale::None => 1.0,
        ErrorScale::Expected if method == Method::Robust && predicted == 0.0 => {
          let present: Vec<f64> = window.iter().copied().filter(|v| !v.is_nan()).collect();
          mean_of(&present)
        }
        ErrorScale::Expected => predicted,
        ErrorScale::Disp => dispersion(window, method.into())?,
      };
      errors.push(((predicted - actual) / denom).powi(2));
    }
    out.push(expected(Array1::from(errors).view(), method)?);
  }

  Ok(Array1::from(out))
}

/// A run of consecutive points far from the trend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviationEvent {
  /// Index of the first point of the run.
  pub index: usize,
  pub start: NaiveDateTime,
  /// Time from the first point to the point where the run ended; runs still
  /// open at the end of the series are closed at the last point.
  pub duration: Duration,
}

/// Runs where `|price - trend| >= thresh`.
pub fn flag_deviation_events(
  times: &[NaiveDateTime],
  price: ArrayView1<f64>,
  trend: ArrayView1<f64>,
  thresh: f64,
) -> Result<Vec<DeviationEvent>> {
  let n = times.len();
  if price.len() != n {
    return Err(PortfolioError::dimension("prices vs times", n, price.len()));
  }
  if trend.len() != n {
    return Err(PortfolioError::dimension("trend vs times", n, trend.len()));
  }

  let mut events = Vec::new();
  let mut open: Option<usize> = None;
  for i in 0..n {
    let deviating = (price[i] - trend[i]).abs() >= thresh;
    match open {
      None if deviating => open = Some(i),
      Some(s) if !deviating || i == n - 1 => {
        events.push(DeviationEvent {
          index: s,
          start: times[s],
          duration: times[i] - times[s],
        });
        open = None;
      }
      _ => {}
    }
  }
  if let Some(s) = open {
    events.push(DeviationEvent {
      index: s,
      start: times[s],
      duration: Duration::zero(),
    });
  }

  Ok(events)
}
