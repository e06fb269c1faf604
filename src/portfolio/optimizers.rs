//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}}\ \sigma_p(\mathbf w)\quad\text{s.t.}\quad
//! \mathbf 1^\top\mathbf w = 1,\ \ \mu_p(\mathbf w)=r^\*,\ \ \mathbf l\le\mathbf w\le\mathbf u
//! $$
//!
//! Maximum-Sharpe and minimum-dispersion allocations under box bounds, and
//! the efficient frontier traced by sweeping the target return.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray_stats::QuantileExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::performance::DISPERSION_FLOOR;
use super::performance::check_shapes;
use super::performance::evaluate;
use super::performance::performance_unchecked;
use super::performance::sharpe_of;
use super::sqp::Sqp;
use super::sqp::SqpOutcome;
use super::types::FrontierPoint;
use super::types::Optimized;
use crate::config::Annualization;
use crate::config::Bounds;
use crate::config::OptimizerConfig;
use crate::error::PortfolioError;
use crate::error::Result;

/// Largest accepted gap between the solver's objective and the Sharpe ratio
/// recomputed from the weights it returned.
pub const SHARPE_CHECK_TOL: f64 = 1e-4;

/// Default number of points on an efficient frontier sweep.
pub const FRONTIER_POINTS: usize = 101;

/// `sum_j (m_ij + m_ji) / 2 * w_j`
fn sym_mat_vec(m: ArrayView2<f64>, w: &[f64]) -> Vec<f64> {
  let n = w.len();
  (0..n)
    .map(|i| {
      (0..n)
        .map(|j| 0.5 * (m[[i, j]] + m[[j, i]]) * w[j])
        .sum()
    })
    .collect()
}

/// Portfolio dispersion as a function of the weights.
struct DispersionCost<'a> {
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  annualize_by: Annualization,
}

impl CostFunction for DispersionCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(performance_unchecked(w, self.expected, self.co_dispersion_sq, self.annualize_by).dispersion)
  }
}

impl Gradient for DispersionCost<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let f = self.annualize_by.factor();
    let sigma_w = sym_mat_vec(self.co_dispersion_sq, w);
    let var: f64 = w.iter().zip(&sigma_w).map(|(a, b)| a * b).sum();
    let sd = var.max(0.0).sqrt();
    if sd <= DISPERSION_FLOOR {
      return Ok(vec![0.0; w.len()]);
    }
    Ok(sigma_w.iter().map(|v| f.sqrt() * v / sd).collect())
  }
}

/// Negated Sharpe ratio as a function of the weights.
struct NegSharpeCost<'a> {
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  risk_free: f64,
  annualize_by: Annualization,
}

impl CostFunction for NegSharpeCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let perf = performance_unchecked(w, self.expected, self.co_dispersion_sq, self.annualize_by);
    Ok(-sharpe_of(perf, self.risk_free)?)
  }
}

impl Gradient for NegSharpeCost<'_> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let f = self.annualize_by.factor();
    let sigma_w = sym_mat_vec(self.co_dispersion_sq, w);
    let var: f64 = w.iter().zip(&sigma_w).map(|(a, b)| a * b).sum();
    let sd = var.max(0.0).sqrt();
    let disp = f.sqrt() * sd;
    if disp <= DISPERSION_FLOOR {
      return Err(PortfolioError::DegenerateDispersion { dispersion: disp }.into());
    }

    let ret: f64 = f * w.iter().zip(self.expected.iter()).map(|(a, b)| a * b).sum::<f64>();
    let excess = ret - self.risk_free;
    Ok(
      self
        .expected
        .iter()
        .zip(&sigma_w)
        .map(|(&mu, &sw)| {
          let d_ret = f * mu;
          let d_disp = f.sqrt() * sw / sd;
          -(d_ret / disp - excess * d_disp / (disp * disp))
        })
        .collect(),
    )
  }
}

fn from_solver(err: argmin::core::Error) -> PortfolioError {
  match err.downcast::<PortfolioError>() {
    Ok(e) => e,
    Err(e) => PortfolioError::Solver(e),
  }
}

fn validate(
  expected: ArrayView1<f64>,
  co_dispersion_sq: ArrayView2<f64>,
  config: &OptimizerConfig,
) -> Result<usize> {
  let n = expected.len();
  if n == 0 {
    return Err(PortfolioError::InvalidArgument("no assets to optimize".into()));
  }
  let zeros = Array1::<f64>::zeros(n);
  check_shapes(zeros.view(), expected, co_dispersion_sq)?;

  let b = config.bounds;
  if !(b.lower <= b.upper) {
    return Err(PortfolioError::InvalidArgument(format!(
      "weight bounds ({}, {}) are empty",
      b.lower, b.upper
    )));
  }
  Ok(n)
}

fn accept(outcome: SqpOutcome, what: &str) -> Result<SqpOutcome> {
  if outcome.converged {
    debug!(what, iterations = outcome.iterations, fun = outcome.fun, "optimizer converged");
    Ok(outcome)
  } else {
    warn!(what, iterations = outcome.iterations, message = %outcome.message, "optimizer did not converge");
    Err(PortfolioError::Unreliable {
      message: outcome.message,
      iterations: outcome.iterations,
    })
  }
}

/// Weights maximizing the Sharpe ratio under the configured bounds.
///
/// Starts from equal weights. Fails with [`PortfolioError::Unreliable`] when
/// the solver does not converge and with
/// [`PortfolioError::InternalInconsistency`] when the Sharpe ratio
/// recomputed from the returned weights disagrees with the objective.
pub fn maximize_sharpe<'a>(
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  config: &OptimizerConfig,
) -> Result<Optimized> {
  let n = validate(expected, co_dispersion_sq, config)?;
  let problem = NegSharpeCost {
    expected,
    co_dispersion_sq,
    risk_free: config.risk_free,
    annualize_by: config.annualize_by,
  };

  let sqp = Sqp::new(
    &[vec![1.0; n]],
    &[1.0],
    &vec![config.bounds.lower; n],
    &vec![config.bounds.upper; n],
  )
  .with_max_iters(config.max_iters)
  .with_ftol(config.ftol);
  let outcome = sqp
    .minimize(&problem, &vec![1.0 / n as f64; n])
    .map_err(from_solver)?;
  let outcome = accept(outcome, "max sharpe")?;

  let weights = Array1::from(outcome.x);
  let performance = evaluate(weights.view(), expected, co_dispersion_sq, config.annualize_by)?;
  check_sharpe(-outcome.fun, sharpe_of(performance, config.risk_free)?)?;

  Ok(Optimized {
    weights,
    objective: outcome.fun,
    performance,
    iterations: outcome.iterations,
  })
}

/// Weights minimizing portfolio dispersion, optionally pinned to a target
/// (annualized per `config.annualize_by`) expected return.
pub fn minimize_dispersion<'a>(
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  config: &OptimizerConfig,
  target_return: Option<f64>,
) -> Result<Optimized> {
  let n = validate(expected, co_dispersion_sq, config)?;
  let problem = DispersionCost {
    expected,
    co_dispersion_sq,
    annualize_by: config.annualize_by,
  };

  let mut rows = vec![vec![1.0; n]];
  let mut rhs = vec![1.0];
  if let Some(target) = target_return {
    let f = config.annualize_by.factor();
    rows.push(expected.iter().map(|mu| f * mu).collect());
    rhs.push(target);
  }

  let sqp = Sqp::new(
    &rows,
    &rhs,
    &vec![config.bounds.lower; n],
    &vec![config.bounds.upper; n],
  )
  .with_max_iters(config.max_iters)
  .with_ftol(config.ftol);
  let outcome = sqp
    .minimize(&problem, &vec![1.0 / n as f64; n])
    .map_err(from_solver)?;
  let outcome = accept(outcome, "min dispersion")?;

  let weights = Array1::from(outcome.x);
  let performance = evaluate(weights.view(), expected, co_dispersion_sq, config.annualize_by)?;

  Ok(Optimized {
    weights,
    objective: outcome.fun,
    performance,
    iterations: outcome.iterations,
  })
}

/// Minimum-dispersion portfolio for each target return.
///
/// The achieved return and dispersion of every point are re-evaluated from
/// its weights, since the solver may land slightly off the requested target.
pub fn efficient_frontier<'a>(
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  target_returns: &[f64],
  config: &OptimizerConfig,
) -> Result<Vec<FrontierPoint>> {
  let mut frontier = Vec::with_capacity(target_returns.len());

  for &target in target_returns {
    let opt = minimize_dispersion(expected, co_dispersion_sq, config, Some(target))?;
    let perf = evaluate(opt.weights.view(), expected, co_dispersion_sq, config.annualize_by)?;
    frontier.push(FrontierPoint {
      weights: opt.weights,
      target_return: target,
      expected_return: perf.expected_return,
      dispersion: perf.dispersion,
    });
  }

  info!(points = frontier.len(), "efficient frontier computed");
  Ok(frontier)
}

/// Evenly spaced targets from the return of the unconstrained-return
/// minimum-dispersion portfolio to the largest return reachable under the
/// configured bounds.
pub fn frontier_targets<'a>(
  expected: ArrayView1<'a, f64>,
  co_dispersion_sq: ArrayView2<'a, f64>,
  config: &OptimizerConfig,
  n_points: usize,
) -> Result<Vec<f64>> {
  let min_disp = minimize_dispersion(expected, co_dispersion_sq, config, None)?;
  let start = min_disp.performance.expected_return;
  let end = max_reachable_return(expected, config)?.max(start);

  Ok(Array1::linspace(start, end, n_points).to_vec())
}

/// Largest expected return of a fully invested portfolio within the bounds.
///
/// Every asset starts at the lower bound; the rest of the budget goes to the
/// highest-return assets, each filled up to the upper bound. Without any
/// bound below one this is the largest single-asset return.
pub fn max_reachable_return(expected: ArrayView1<f64>, config: &OptimizerConfig) -> Result<f64> {
  let n = expected.len();
  let Bounds { lower, upper } = config.bounds;
  if n == 0 || lower * n as f64 > 1.0 || upper * (n as f64) < 1.0 {
    return Err(PortfolioError::InvalidArgument(format!(
      "no fully invested portfolio of {n} assets fits the bounds ({lower}, {upper})"
    )));
  }

  if expected.max_skipnan().is_nan() {
    return Err(PortfolioError::InvalidArgument("every expected return is missing".into()));
  }

  let mut order: Vec<usize> = (0..n).filter(|&i| !expected[i].is_nan()).collect();
  order.sort_by(|&i, &j| expected[j].total_cmp(&expected[i]));

  let mut weights = vec![lower; n];
  let mut budget = 1.0 - lower * n as f64;
  for i in order {
    let add = budget.min(upper - lower);
    weights[i] += add;
    budget -= add;
    if budget <= 0.0 {
      break;
    }
  }

  let ret: f64 = weights
    .iter()
    .zip(expected.iter())
    // assets without an estimate sit at a zero lower bound
    .filter(|(w, _)| **w != 0.0)
    .map(|(w, mu)| w * mu)
    .sum();
  Ok(ret * config.annualize_by.factor())
}

/// Compare the solver's Sharpe ratio with the one recomputed from its weights.
fn check_sharpe(reported: f64, recomputed: f64) -> Result<()> {
  if (recomputed - reported).abs() > SHARPE_CHECK_TOL {
    return Err(PortfolioError::InternalInconsistency {
      reported,
      recomputed,
    });
  }
  Ok(())
}
