//! # Portfolio Performance
//!
//! $$
//! \mu_p = f\,\mathbf w^\top\boldsymbol\mu,\qquad
//! \sigma_p = \sqrt{f}\,\sqrt{\mathbf w^\top \Sigma \mathbf w},\qquad
//! S = \frac{\mu_p - r_f}{\sigma_p}
//! $$
//!
//! Weighted aggregation of per-asset statistics and the Sharpe ratio built
//! on top of it. These are the objective primitives the optimizers call in
//! their inner loop.

use ndarray::ArrayView1;
use ndarray::ArrayView2;

use super::types::Performance;
use crate::config::Annualization;
use crate::config::EPS;
use crate::error::PortfolioError;
use crate::error::Result;

/// Dispersions below this make a Sharpe ratio meaningless.
pub const DISPERSION_FLOOR: f64 = 1e-12;

pub(crate) fn check_shapes(
  weights: ArrayView1<f64>,
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
) -> Result<()> {
  let n = expected.len();
  if weights.len() != n {
    return Err(PortfolioError::dimension("weights vs expected returns", n, weights.len()));
  }
  if co_dispersion_sq.nrows() != n {
    return Err(PortfolioError::dimension(
      "co-dispersion rows vs expected returns",
      n,
      co_dispersion_sq.nrows(),
    ));
  }
  if co_dispersion_sq.ncols() != n {
    return Err(PortfolioError::dimension(
      "co-dispersion columns vs expected returns",
      n,
      co_dispersion_sq.ncols(),
    ));
  }
  Ok(())
}

pub(crate) fn check_normalized(weights: ArrayView1<f64>) -> Result<()> {
  let sum = weights.sum();
  if (sum - 1.0).abs() > EPS {
    return Err(PortfolioError::WeightsNotNormalized {
      sum,
      tolerance: EPS,
    });
  }
  Ok(())
}

/// `w' Σ w` without temporaries.
#[inline]
pub(crate) fn quadratic_form(w: &[f64], m: ArrayView2<f64>) -> f64 {
  let mut acc = 0.0;
  for (i, &wi) in w.iter().enumerate() {
    if wi == 0.0 {
      continue;
    }
    let row = m.row(i);
    let mut inner = 0.0;
    for (j, &wj) in w.iter().enumerate() {
      inner += row[j] * wj;
    }
    acc += wi * inner;
  }
  acc
}

/// Shape- and normalization-free kernel shared with the cost functions.
#[inline]
pub(crate) fn performance_unchecked(
  w: &[f64],
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
  annualize_by: Annualization,
) -> Performance {
  let factor = annualize_by.factor();
  let ret: f64 = w.iter().zip(expected.iter()).map(|(a, b)| a * b).sum();
  let var = quadratic_form(w, co_dispersion_sq).max(0.0);

  Performance {
    expected_return: ret * factor,
    dispersion: var.sqrt() * factor.sqrt(),
  }
}

/// Portfolio expected return and dispersion for normalized `weights`.
pub fn evaluate(
  weights: ArrayView1<f64>,
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
  annualize_by: Annualization,
) -> Result<Performance> {
  check_shapes(weights, expected, co_dispersion_sq)?;
  check_normalized(weights)?;

  Ok(match weights.as_slice() {
    Some(w) => performance_unchecked(w, expected, co_dispersion_sq, annualize_by),
    None => {
      let w = weights.to_vec();
      performance_unchecked(&w, expected, co_dispersion_sq, annualize_by)
    }
  })
}

/// `(return - risk_free) / dispersion` of a performance pair.
pub(crate) fn sharpe_of(perf: Performance, risk_free: f64) -> Result<f64> {
  if !(perf.dispersion > DISPERSION_FLOOR) {
    return Err(PortfolioError::DegenerateDispersion {
      dispersion: perf.dispersion,
    });
  }
  Ok((perf.expected_return - risk_free) / perf.dispersion)
}

/// Sharpe ratio of a weighting.
///
/// Fails with [`PortfolioError::DegenerateDispersion`] when the portfolio
/// dispersion is (numerically) zero.
pub fn sharpe_ratio(
  weights: ArrayView1<f64>,
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
  risk_free: f64,
  annualize_by: Annualization,
) -> Result<f64> {
  let perf = evaluate(weights, expected, co_dispersion_sq, annualize_by)?;
  sharpe_of(perf, risk_free)
}

/// Negated [`sharpe_ratio`], the quantity handed to a minimizer.
pub fn neg_sharpe_ratio(
  weights: ArrayView1<f64>,
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
  risk_free: f64,
  annualize_by: Annualization,
) -> Result<f64> {
  sharpe_ratio(weights, expected, co_dispersion_sq, risk_free, annualize_by).map(|s| -s)
}
