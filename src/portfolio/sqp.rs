//! # Sequential Quadratic Programming
//!
//! $$
//! \min_{\mathbf d}\ \tfrac12\mathbf d^\top B_k\mathbf d+\nabla f(\mathbf x_k)^\top\mathbf d
//! \quad\text{s.t.}\quad A(\mathbf x_k+\mathbf d)=\mathbf b,\ \ \mathbf l\le\mathbf x_k+\mathbf d\le\mathbf u
//! $$
//!
//! Dense SQP for smooth objectives under linear equality constraints and box
//! bounds. The Hessian model is a damped BFGS approximation, each quadratic
//! subproblem is handed to the Clarabel interior-point solver, and steps are
//! globalized with an Armijo backtracking line search. Iterates are pulled
//! back onto the feasible set after every step, so the objective itself
//! serves as merit function.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

const FEASIBILITY_TOL: f64 = 1e-10;
const PHASE_ONE_MAX_ITERS: usize = 20_000;
const ARMIJO_C1: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;
/// Gap and feasibility tolerance of the quadratic subproblems.
const QP_TOL: f64 = 1e-9;
const QP_MAX_ITERS: u32 = 200;
/// Predicted decreases below this (relative to `1 + |f|`) are solver noise.
const NOISE_DECREASE: f64 = 1e-9;

/// Result of one [`Sqp::minimize`] run. `converged == false` means `x` must
/// not be trusted.
#[derive(Clone, Debug)]
pub struct SqpOutcome {
  pub x: Vec<f64>,
  pub fun: f64,
  pub iterations: u64,
  pub converged: bool,
  pub message: String,
}

/// Problem geometry: `A x = b`, `lower <= x <= upper`.
#[derive(Clone, Debug)]
pub struct Sqp {
  a: DMatrix<f64>,
  b: DVector<f64>,
  lower: DVector<f64>,
  upper: DVector<f64>,
  max_iters: u64,
  ftol: f64,
  xtol: f64,
}

impl Sqp {
  /// `a_rows` holds one equality row per constraint, each of length `n`.
  pub fn new(a_rows: &[Vec<f64>], b: &[f64], lower: &[f64], upper: &[f64]) -> Self {
    let n = lower.len();
    let m = a_rows.len();

    Self {
      a: DMatrix::from_fn(m, n, |i, j| a_rows[i][j]),
      b: DVector::from_column_slice(b),
      lower: DVector::from_column_slice(lower),
      upper: DVector::from_column_slice(upper),
      max_iters: 100,
      ftol: 1e-12,
      xtol: 1e-10,
    }
  }

  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }

  pub fn with_ftol(mut self, ftol: f64) -> Self {
    self.ftol = ftol;
    self
  }

  fn n(&self) -> usize {
    self.lower.len()
  }

  fn clip(&self, x: &mut DVector<f64>) {
    for i in 0..x.len() {
      x[i] = x[i].clamp(self.lower[i], self.upper[i]);
    }
  }

  fn equality_residual(&self, x: &DVector<f64>) -> DVector<f64> {
    &self.b - &self.a * x
  }

  fn is_feasible(&self, x: &DVector<f64>) -> bool {
    self.a.nrows() == 0 || self.equality_residual(x).amax() <= FEASIBILITY_TOL
  }

  /// Dykstra's alternating projections onto `{A x = b}` and the box.
  /// Returns `None` when the two sets do not intersect (numerically).
  fn phase_one(&self, x0: &DVector<f64>) -> Option<DVector<f64>> {
    let mut x = x0.clone();
    self.clip(&mut x);
    if self.is_feasible(&x) {
      return Some(x);
    }

    let gram_pinv = (&self.a * self.a.transpose()).pseudo_inverse(1e-14).ok()?;
    let at = self.a.transpose();
    let project_affine = |v: &DVector<f64>| -> DVector<f64> {
      let r = &self.a * v - &self.b;
      v - &at * (&gram_pinv * r)
    };

    let mut p = DVector::zeros(x.len());
    let mut q = DVector::zeros(x.len());
    for _ in 0..PHASE_ONE_MAX_ITERS {
      let y = project_affine(&(&x + &p));
      p = &x + &p - &y;
      let mut x_next = &y + &q;
      self.clip(&mut x_next);
      q = &y + &q - &x_next;

      let moved = (&x_next - &x).amax();
      x = x_next;
      if self.is_feasible(&x) {
        return Some(x);
      }
      if moved < 1e-15 {
        break;
      }
    }

    None
  }

  /// Solve the quadratic subproblem at `x` with Clarabel.
  ///
  /// Equality rows go into a zero cone, the two sides of the box into one
  /// nonnegative cone. Any status other than `Solved` or `AlmostSolved` is
  /// an error message.
  fn qp_direction(
    &self,
    hess: &DMatrix<f64>,
    grad: &DVector<f64>,
    x: &DVector<f64>,
  ) -> Result<DVector<f64>, String> {
    use clarabel::algebra::*;
    use clarabel::solver::*;

    let n = self.n();
    let m = self.a.nrows();

    // upper triangle of the Hessian model, column by column
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
      for i in 0..=j {
        p_data.push(hess[(i, j)]);
        p_indices.push(i);
      }
      p_indptr.push(p_data.len());
    }
    let p = CscMatrix::new(n, n, p_indptr, p_indices, p_data);
    let q = grad.as_slice().to_vec();

    // rows: [A; -I; I]
    let mut a_data = Vec::new();
    let mut a_indices = Vec::new();
    let mut a_indptr = vec![0];
    for j in 0..n {
      for e in 0..m {
        a_data.push(self.a[(e, j)]);
        a_indices.push(e);
      }
      a_data.push(-1.0);
      a_indices.push(m + j);
      a_data.push(1.0);
      a_indices.push(m + n + j);
      a_indptr.push(a_data.len());
    }
    let a = CscMatrix::new(m + 2 * n, n, a_indptr, a_indices, a_data);

    let mut b = self.equality_residual(x).as_slice().to_vec();
    b.extend((0..n).map(|i| x[i] - self.lower[i]));
    b.extend((0..n).map(|i| self.upper[i] - x[i]));

    let mut cones: Vec<SupportedConeT<f64>> = Vec::with_capacity(2);
    if m > 0 {
      cones.push(ZeroConeT(m));
    }
    cones.push(NonnegativeConeT(2 * n));

    let settings = DefaultSettingsBuilder::default()
      .max_iter(QP_MAX_ITERS)
      .tol_gap_abs(QP_TOL)
      .tol_gap_rel(QP_TOL)
      .tol_feas(QP_TOL)
      .verbose(false)
      .build()
      .map_err(|e| format!("failed to build subproblem settings: {}", e))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings)
      .map_err(|e| format!("failed to create subproblem solver: {:?}", e))?;
    solver.solve();

    if !matches!(
      solver.solution.status,
      SolverStatus::Solved | SolverStatus::AlmostSolved
    ) {
      return Err(format!(
        "quadratic subproblem failed with status {:?}",
        solver.solution.status
      ));
    }
    Ok(DVector::from_column_slice(&solver.solution.x))
  }

  /// Minimize `problem` starting from `x0`.
  ///
  /// Errors only when the objective or its gradient fails to evaluate;
  /// infeasibility, subproblem failures and non-convergence come back as an
  /// unconverged [`SqpOutcome`].
  pub fn minimize<P>(&self, problem: &P, x0: &[f64]) -> Result<SqpOutcome, argmin::core::Error>
  where
    P: CostFunction<Param = Vec<f64>, Output = f64>
      + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
  {
    let n = self.n();
    let start = DVector::from_column_slice(x0);

    let Some(mut x) = self.phase_one(&start) else {
      let mut x = start;
      self.clip(&mut x);
      let x = x.as_slice().to_vec();
      let fun = problem.cost(&x)?;
      return Ok(SqpOutcome {
        x,
        fun,
        iterations: 0,
        converged: false,
        message: "constraints are infeasible".into(),
      });
    };

    let mut hess = DMatrix::<f64>::identity(n, n);
    let mut fun = problem.cost(&x.as_slice().to_vec())?;
    let mut grad = DVector::from_vec(problem.gradient(&x.as_slice().to_vec())?);

    for iter in 1..=self.max_iters {
      let d = match self.qp_direction(&hess, &grad, &x) {
        Ok(d) => d,
        Err(message) => {
          debug!(iter, fun, message = %message, "sqp subproblem failed");
          return Ok(SqpOutcome {
            x: x.as_slice().to_vec(),
            fun,
            iterations: iter,
            converged: false,
            message,
          });
        }
      };
      let slope = grad.dot(&d);
      let predicted = -(0.5 * d.dot(&(&hess * &d)) + slope);
      let scale = 1.0 + fun.abs();

      if d.amax() <= self.xtol || predicted <= self.ftol * scale {
        debug!(iter, fun, "sqp converged on step size");
        return Ok(SqpOutcome {
          x: x.as_slice().to_vec(),
          fun,
          iterations: iter,
          converged: true,
          message: "optimization terminated successfully".into(),
        });
      }

      // the step leads straight back onto x, as at a vertex of the feasible set
      let full = self.phase_one(&(&x + &d));
      if full.is_some_and(|p| (p - &x).amax() <= self.xtol) {
        debug!(iter, fun, "sqp converged on projected step");
        return Ok(SqpOutcome {
          x: x.as_slice().to_vec(),
          fun,
          iterations: iter,
          converged: true,
          message: "optimization terminated successfully".into(),
        });
      }

      let mut alpha = 1.0;
      let accepted = loop {
        if let Some(trial) = self.phase_one(&(&x + alpha * &d)) {
          let trial_vec = trial.as_slice().to_vec();
          let f_trial = problem.cost(&trial_vec)?;
          if f_trial.is_finite() && f_trial <= fun + ARMIJO_C1 * alpha * slope.min(0.0) {
            break Some((trial, trial_vec, f_trial));
          }
        }
        alpha *= 0.5;
        if alpha < MIN_STEP {
          break None;
        }
      };

      let Some((x_next, x_next_vec, f_next)) = accepted else {
        let stalled = predicted <= NOISE_DECREASE * scale;
        debug!(iter, fun, slope, predicted, "sqp line search failed");
        return Ok(SqpOutcome {
          x: x.as_slice().to_vec(),
          fun,
          iterations: iter,
          converged: stalled,
          message: if stalled {
            "optimization terminated successfully".into()
          } else {
            "positive directional derivative in line search".into()
          },
        });
      };

      let grad_next = DVector::from_vec(problem.gradient(&x_next_vec)?);
      let s = &x_next - &x;
      let y = &grad_next - &grad;
      damped_bfgs_update(&mut hess, &s, &y);

      let df = (fun - f_next).abs();
      x = x_next;
      fun = f_next;
      grad = grad_next;

      if df <= self.ftol || s.amax() <= self.xtol {
        debug!(iter, fun, "sqp converged on objective change");
        return Ok(SqpOutcome {
          x: x.as_slice().to_vec(),
          fun,
          iterations: iter,
          converged: true,
          message: "optimization terminated successfully".into(),
        });
      }
    }

    Ok(SqpOutcome {
      x: x.as_slice().to_vec(),
      fun,
      iterations: self.max_iters,
      converged: false,
      message: "iteration limit reached".into(),
    })
  }
}

/// Powell-damped BFGS update keeping `hess` positive definite.
fn damped_bfgs_update(hess: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
  let bs = &*hess * s;
  let sbs = s.dot(&bs);
  if sbs <= 1e-300 {
    return;
  }

  let sy = s.dot(y);
  let theta = if sy >= 0.2 * sbs {
    1.0
  } else {
    0.8 * sbs / (sbs - sy)
  };
  let r = theta * y + (1.0 - theta) * &bs;
  let sr = s.dot(&r);
  if sr <= 1e-300 {
    return;
  }

  *hess -= (&bs * bs.transpose()) / sbs;
  *hess += (&r * r.transpose()) / sr;
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  /// `(x - c)' (x - c)`
  struct Distance {
    c: Vec<f64>,
  }

  impl CostFunction for Distance {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
      Ok(x.iter().zip(&self.c).map(|(a, b)| (a - b).powi(2)).sum())
    }
  }

  impl Gradient for Distance {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
      Ok(x.iter().zip(&self.c).map(|(a, b)| 2.0 * (a - b)).collect())
    }
  }

  #[test]
  fn projects_onto_the_simplex() {
    // closest point of the unit simplex to (0.8, 0.6, -0.5) is (0.6, 0.4, 0)
    let problem = Distance {
      c: vec![0.8, 0.6, -0.5],
    };
    let sqp = Sqp::new(&[vec![1.0; 3]], &[1.0], &[0.0; 3], &[1.0; 3]);
    let out = sqp.minimize(&problem, &[1.0 / 3.0; 3]).unwrap();

    assert!(out.converged, "{}", out.message);
    assert_abs_diff_eq!(out.x[0], 0.6, epsilon = 1e-5);
    assert_abs_diff_eq!(out.x[1], 0.4, epsilon = 1e-5);
    assert_abs_diff_eq!(out.x[2], 0.0, epsilon = 1e-5);
  }

  #[test]
  fn honours_a_second_equality() {
    let problem = Distance { c: vec![0.0; 3] };
    let sqp = Sqp::new(
      &[vec![1.0; 3], vec![1.0, 2.0, 3.0]],
      &[1.0, 2.5],
      &[0.0; 3],
      &[1.0; 3],
    );
    let out = sqp.minimize(&problem, &[1.0 / 3.0; 3]).unwrap();

    assert!(out.converged, "{}", out.message);
    let sum: f64 = out.x.iter().sum();
    let weighted: f64 = out.x.iter().zip([1.0, 2.0, 3.0]).map(|(a, b)| a * b).sum();
    assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(weighted, 2.5, epsilon = 1e-9);
    assert!(out.x.iter().all(|&v| v >= 0.0 && v <= 1.0));
  }

  #[test]
  fn unconstrained_box_only_problem() {
    let problem = Distance { c: vec![2.0, -1.0] };
    let sqp = Sqp::new(&[], &[], &[0.0; 2], &[1.0; 2]);
    let out = sqp.minimize(&problem, &[0.5, 0.5]).unwrap();

    assert!(out.converged, "{}", out.message);
    assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(out.x[1], 0.0, epsilon = 1e-6);
  }

  #[test]
  fn reports_infeasible_constraints() {
    let problem = Distance { c: vec![0.0; 2] };
    let sqp = Sqp::new(&[vec![1.0; 2], vec![1.0, 2.0]], &[1.0, 5.0], &[0.0; 2], &[1.0; 2]);
    let out = sqp.minimize(&problem, &[0.5, 0.5]).unwrap();

    assert!(!out.converged);
    assert_eq!(out.message, "constraints are infeasible");
  }
}
