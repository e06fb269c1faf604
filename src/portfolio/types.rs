//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared result containers for statistics, evaluation and optimization.

use ndarray::Array1;
use ndarray::Array2;

use crate::config::Method;
use crate::error::PortfolioError;
use crate::error::Result;

/// Weight vector, one entry per asset in column order.
pub type WeightVector = Array1<f64>;

/// Expected returns and co-dispersion-squared matrix of a set of assets.
#[derive(Clone, Debug, PartialEq)]
pub struct StatisticsResult {
  /// One expected return per asset.
  pub expected: Array1<f64>,
  /// Symmetric, `n x n`; `1 x 1` holds the variance-like dispersion of a
  /// single asset.
  pub co_dispersion_sq: Array2<f64>,
  /// Estimator family that produced the numbers.
  pub method: Method,
}

impl StatisticsResult {
  pub fn n_assets(&self) -> usize {
    self.expected.len()
  }

  /// Per-asset dispersion, the square root of the diagonal.
  pub fn dispersions(&self) -> Array1<f64> {
    self.co_dispersion_sq.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// `(expected, dispersion)` of a single-asset result.
  pub fn scalar(&self) -> Result<(f64, f64)> {
    if self.n_assets() != 1 {
      return Err(PortfolioError::dimension("single-asset statistics", 1, self.n_assets()));
    }
    Ok((self.expected[0], self.co_dispersion_sq[[0, 0]].max(0.0).sqrt()))
  }
}

/// Portfolio-level expected return and dispersion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Performance {
  pub expected_return: f64,
  pub dispersion: f64,
}

/// Accepted outcome of a constrained optimization.
#[derive(Clone, Debug)]
pub struct Optimized {
  pub weights: WeightVector,
  /// Objective value at `weights` as reported by the solver.
  pub objective: f64,
  /// Re-evaluated performance of `weights`.
  pub performance: Performance,
  pub iterations: u64,
}

/// One efficient-frontier portfolio.
#[derive(Clone, Debug)]
pub struct FrontierPoint {
  pub weights: WeightVector,
  /// Return the solver was asked to hit.
  pub target_return: f64,
  /// Return actually achieved by `weights`.
  pub expected_return: f64,
  pub dispersion: f64,
}
