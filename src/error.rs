//! # Error
//!
//! $$
//! \text{validation} \;\cup\; \text{precondition} \;\cup\; \text{numerical}
//! $$
//!
//! Error taxonomy shared by every module of the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[derive(Error, Debug)]
pub enum PortfolioError {
  /// Two inputs that must agree in length/shape do not.
  #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
  DimensionMismatch {
    context: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("weights sum to {sum}, expected 1 within {tolerance}")]
  WeightsNotNormalized { sum: f64, tolerance: f64 },

  #[error("unknown return metric: {0}")]
  UnknownMetric(String),

  #[error("unknown estimation method: {0}")]
  UnknownMethod(String),

  #[error("unknown time frame: {0}")]
  UnknownTimeFrame(String),

  #[error("unknown annualization: {0}")]
  UnknownAnnualization(String),

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// Not enough finite observations left for an estimator.
  #[error("insufficient data for {estimator}: need {required}, have {available}")]
  InsufficientData {
    estimator: &'static str,
    required: usize,
    available: usize,
  },

  #[error("prices have never been set")]
  NoPriceData,

  #[error("returns have not been computed")]
  NoReturnsData,

  #[error("portfolio dispersion {dispersion:e} is too close to zero for a Sharpe ratio")]
  DegenerateDispersion { dispersion: f64 },

  /// The solver did not report convergence; the weights must not be used.
  #[error("optimization unreliable after {iterations} iterations: {message}")]
  Unreliable { message: String, iterations: u64 },

  #[error("internal inconsistency: objective reported {reported}, re-evaluated {recomputed}")]
  InternalInconsistency { reported: f64, recomputed: f64 },

  /// Error raised from inside an objective or gradient evaluation.
  #[error(transparent)]
  Solver(#[from] argmin::core::Error),
}

impl PortfolioError {
  pub(crate) fn dimension(context: &'static str, expected: usize, actual: usize) -> Self {
    Self::DimensionMismatch {
      context,
      expected,
      actual,
    }
  }
}
