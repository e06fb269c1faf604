//! # Config
//!
//! $$
//! v = \operatorname{first}(v_{\text{explicit}},\ v_{\text{instance}},\ v_{\text{default}})
//! $$
//!
//! Configuration tags recognized by the engine and the layered resolution
//! used to pick a value from explicit, per-instance and global settings.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::PortfolioError;

/// Tolerance on `|sum(w) - 1|` for a weight vector to count as normalized.
pub const EPS: f64 = 1e-7;

/// Return definition used to turn two prices into one return.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Metric {
  /// `(xi - x0) / x0`
  #[default]
  Relative,
  /// `xi - x0`
  Delta,
  /// `xi / x0`
  Simple,
  /// `ln(xi / x0)`
  Log,
}

impl Metric {
  #[inline]
  pub fn apply(self, x0: f64, xi: f64) -> f64 {
    match self {
      Metric::Relative => (xi - x0) / x0,
      Metric::Delta => xi - x0,
      Metric::Simple => xi / x0,
      Metric::Log => (xi / x0).ln(),
    }
  }
}

impl FromStr for Metric {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "relative" => Ok(Self::Relative),
      "delta" => Ok(Self::Delta),
      "simple" => Ok(Self::Simple),
      "log" => Ok(Self::Log),
      _ => Err(PortfolioError::UnknownMetric(s.to_string())),
    }
  }
}

impl Display for Metric {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Metric::Relative => write!(f, "Relative"),
      Metric::Delta => write!(f, "Delta"),
      Metric::Simple => write!(f, "Simple"),
      Metric::Log => write!(f, "Log"),
    }
  }
}

/// Estimator family.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Method {
  /// Median, MAD and CoMAD.
  #[default]
  Robust,
  /// Mean, standard deviation and covariance.
  Normal,
}

impl FromStr for Method {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "robust" => Ok(Self::Robust),
      "normal" => Ok(Self::Normal),
      _ => Err(PortfolioError::UnknownMethod(s.to_string())),
    }
  }
}

impl Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Method::Robust => write!(f, "Robust"),
      Method::Normal => write!(f, "Normal"),
    }
  }
}

/// Dispersion estimator. `Quantile` is a secondary robust option that has no
/// expected-value or co-dispersion counterpart.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dispersion {
  #[default]
  Mad,
  Normal,
  Quantile,
}

impl From<Method> for Dispersion {
  fn from(method: Method) -> Self {
    match method {
      Method::Robust => Dispersion::Mad,
      Method::Normal => Dispersion::Normal,
    }
  }
}

impl FromStr for Dispersion {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "robust" | "mad" => Ok(Self::Mad),
      "normal" => Ok(Self::Normal),
      "quantile" => Ok(Self::Quantile),
      _ => Err(PortfolioError::UnknownMethod(s.to_string())),
    }
  }
}

/// Sampling horizon of a return; fixes both the lag and the annualization basis.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimeFrame {
  Day,
  #[default]
  Month,
  Year,
}

impl TimeFrame {
  /// Lag in trading days.
  pub fn period(self) -> usize {
    match self {
      TimeFrame::Day => 1,
      TimeFrame::Month => 21,
      TimeFrame::Year => 252,
    }
  }
}

impl FromStr for TimeFrame {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "d" | "day" => Ok(Self::Day),
      "m" | "month" => Ok(Self::Month),
      "y" | "year" => Ok(Self::Year),
      _ => Err(PortfolioError::UnknownTimeFrame(s.to_string())),
    }
  }
}

impl Display for TimeFrame {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      TimeFrame::Day => write!(f, "Day"),
      TimeFrame::Month => write!(f, "Month"),
      TimeFrame::Year => write!(f, "Year"),
    }
  }
}

/// Scaling of per-period statistics to a yearly basis.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Annualization {
  #[default]
  None,
  Day,
  Month,
  Year,
}

impl Annualization {
  /// Periods per year; returns scale by this, dispersions by its square root.
  pub fn factor(self) -> f64 {
    match self {
      Annualization::None | Annualization::Year => 1.0,
      Annualization::Month => 12.0,
      Annualization::Day => 252.0,
    }
  }

  /// Annualization basis implied by the time frame returns were computed on.
  pub fn for_time_frame(time_frame: TimeFrame, annualize: bool) -> Self {
    if !annualize {
      return Annualization::None;
    }

    match time_frame {
      TimeFrame::Day => Annualization::Day,
      TimeFrame::Month => Annualization::Month,
      TimeFrame::Year => Annualization::Year,
    }
  }
}

impl FromStr for Annualization {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "none" => Ok(Self::None),
      "d" | "day" => Ok(Self::Day),
      "m" | "month" => Ok(Self::Month),
      "y" | "year" => Ok(Self::Year),
      _ => Err(PortfolioError::UnknownAnnualization(s.to_string())),
    }
  }
}

/// Per-weight `(min, max)` interval used by the optimizers.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Bounds {
  pub lower: f64,
  pub upper: f64,
}

impl Bounds {
  pub fn new(lower: f64, upper: f64) -> Self {
    Self { lower, upper }
  }
}

impl Default for Bounds {
  /// Long-only, unlevered.
  fn default() -> Self {
    Self {
      lower: 0.0,
      upper: 1.0,
    }
  }
}

/// Return the first value present among an explicit argument, an instance
/// default and the global default.
pub fn resolve<T>(explicit: Option<T>, instance: Option<T>, global: T) -> T {
  explicit.or(instance).unwrap_or(global)
}

/// Options controlling how prices become statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatisticsConfig {
  pub metric: Metric,
  pub method: Method,
  pub time_frame: TimeFrame,
  /// Keep every `sample_stride`-th return before estimating.
  pub sample_stride: usize,
}

impl Default for StatisticsConfig {
  fn default() -> Self {
    Self {
      metric: Metric::Relative,
      method: Method::Robust,
      time_frame: TimeFrame::Month,
      sample_stride: 1,
    }
  }
}

/// Partially specified [`StatisticsConfig`]; absent fields fall through to
/// the next layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatisticsOverrides {
  pub metric: Option<Metric>,
  pub method: Option<Method>,
  pub time_frame: Option<TimeFrame>,
  pub sample_stride: Option<usize>,
}

impl StatisticsConfig {
  /// Field-wise [`resolve`] of `explicit` over `instance` over `self`.
  pub fn resolve_with(
    &self,
    explicit: &StatisticsOverrides,
    instance: &StatisticsOverrides,
  ) -> StatisticsConfig {
    StatisticsConfig {
      metric: resolve(explicit.metric, instance.metric, self.metric),
      method: resolve(explicit.method, instance.method, self.method),
      time_frame: resolve(explicit.time_frame, instance.time_frame, self.time_frame),
      sample_stride: resolve(
        explicit.sample_stride,
        instance.sample_stride,
        self.sample_stride,
      ),
    }
  }
}

/// Options for the constrained optimizers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizerConfig {
  pub risk_free: f64,
  pub bounds: Bounds,
  pub annualize_by: Annualization,
  /// Cap on SQP iterations.
  pub max_iters: u64,
  /// Stop once the objective changes by less than this between iterations.
  pub ftol: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free: 0.0,
      bounds: Bounds::default(),
      annualize_by: Annualization::None,
      max_iters: 100,
      ftol: 1e-12,
    }
  }
}
