//! # Robust Statistics
//!
//! $$
//! \operatorname{CoMAD}_{ij} = 1.4826^2\,\operatorname{med}_t\big[(x_{i,t}-\operatorname{med}x_i)(x_{j,t}-\operatorname{med}x_j)\big]
//! $$
//!
//! Location, dispersion and co-dispersion estimators in a robust
//! (median-based) and a normal-theory flavour. NaNs are dropped before any
//! estimate; co-dispersion drops them pairwise.

use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

use crate::config::Dispersion;
use crate::config::Method;
use crate::error::PortfolioError;
use crate::error::Result;

/// Scale making the MAD a consistent estimator of a normal standard deviation.
pub const MAD_SCALE: f64 = 1.4826;

/// Percentile of absolute deviations used by [`Dispersion::Quantile`].
pub const QUANTILE_LEVEL: f64 = 0.668;

/// Delta degrees of freedom of the normal-theory variance and covariance
/// (sample estimator).
pub const NORMAL_DDOF: usize = 1;

fn finite(x: ArrayView1<f64>) -> Vec<f64> {
  x.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn require(estimator: &'static str, required: usize, available: usize) -> Result<()> {
  if available < required {
    Err(PortfolioError::InsufficientData {
      estimator,
      required,
      available,
    })
  } else {
    Ok(())
  }
}

/// Linear-interpolated quantile of an unsorted, NaN-free sample.
pub(crate) fn quantile_of(xs: &mut [f64], q: f64) -> f64 {
  xs.sort_by(|a, b| a.total_cmp(b));
  let pos = q.clamp(0.0, 1.0) * (xs.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  xs[lo] + (xs[hi] - xs[lo]) * (pos - lo as f64)
}

pub(crate) fn median_of(xs: &mut [f64]) -> f64 {
  quantile_of(xs, 0.5)
}

pub(crate) fn mean_of(xs: &[f64]) -> f64 {
  xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_std(xs: &[f64]) -> f64 {
  let m = mean_of(xs);
  let ss: f64 = xs.iter().map(|&x| (x - m) * (x - m)).sum();
  (ss / (xs.len() - NORMAL_DDOF) as f64).sqrt()
}

fn mad(xs: &mut [f64]) -> f64 {
  let med = median_of(xs);
  let mut dev: Vec<f64> = xs.iter().map(|&x| (x - med).abs()).collect();
  MAD_SCALE * median_of(&mut dev)
}

/// Expected value: median for [`Method::Robust`], mean for [`Method::Normal`].
pub fn expected(x: ArrayView1<f64>, method: Method) -> Result<f64> {
  let mut xs = finite(x);
  require("expected value", 1, xs.len())?;

  Ok(match method {
    Method::Robust => median_of(&mut xs),
    Method::Normal => mean_of(&xs),
  })
}

/// Dispersion of a single sample.
///
/// - [`Dispersion::Mad`]: `1.4826 * median(|x - median(x)|)`
/// - [`Dispersion::Normal`]: sample standard deviation
/// - [`Dispersion::Quantile`]: 66.8th percentile of `|x - median(x)|`
pub fn dispersion(x: ArrayView1<f64>, method: Dispersion) -> Result<f64> {
  let mut xs = finite(x);

  match method {
    Dispersion::Mad => {
      require("MAD", 1, xs.len())?;
      Ok(mad(&mut xs))
    }
    Dispersion::Normal => {
      require("standard deviation", NORMAL_DDOF + 1, xs.len())?;
      Ok(sample_std(&xs))
    }
    Dispersion::Quantile => {
      require("quantile dispersion", 1, xs.len())?;
      let med = median_of(&mut xs);
      let mut dev: Vec<f64> = xs.iter().map(|&x| (x - med).abs()).collect();
      Ok(quantile_of(&mut dev, QUANTILE_LEVEL))
    }
  }
}

fn pairwise_complete(a: ArrayView1<f64>, b: ArrayView1<f64>) -> (Vec<f64>, Vec<f64>) {
  a.iter()
    .zip(b.iter())
    .filter(|(x, y)| !x.is_nan() && !y.is_nan())
    .map(|(&x, &y)| (x, y))
    .unzip()
}

fn co_dispersion_pair(a: ArrayView1<f64>, b: ArrayView1<f64>, method: Method) -> Result<f64> {
  let (xa, xb) = pairwise_complete(a, b);

  match method {
    Method::Normal => {
      require("covariance", NORMAL_DDOF + 1, xa.len())?;
      let ma = mean_of(&xa);
      let mb = mean_of(&xb);
      let s: f64 = xa
        .iter()
        .zip(xb.iter())
        .map(|(&x, &y)| (x - ma) * (y - mb))
        .sum();
      Ok(s / (xa.len() - NORMAL_DDOF) as f64)
    }
    Method::Robust => {
      require("CoMAD", 1, xa.len())?;
      let ma = median_of(&mut xa.clone());
      let mb = median_of(&mut xb.clone());
      let mut prod: Vec<f64> = xa
        .iter()
        .zip(xb.iter())
        .map(|(&x, &y)| (x - ma) * (y - mb))
        .collect();
      Ok(median_of(&mut prod) * MAD_SCALE * MAD_SCALE)
    }
  }
}

/// Symmetric `n_assets x n_assets` co-dispersion-squared matrix of an
/// `n_samples x n_assets` sample.
///
/// Off-diagonal entries are sample covariances ([`Method::Normal`]) or
/// scaled CoMADs ([`Method::Robust`]), each computed on the rows where both
/// columns are present. The diagonal is each column's squared
/// [`dispersion`].
pub fn co_dispersion_sq(x: ArrayView2<f64>, method: Method) -> Result<Array2<f64>> {
  let n = x.ncols();
  let mut out = Array2::<f64>::zeros((n, n));

  for i in 0..n {
    out[[i, i]] = dispersion(x.column(i), method.into())?.powi(2);
    for j in (i + 1)..n {
      let c = co_dispersion_pair(x.column(i), x.column(j), method)?;
      out[[i, j]] = c;
      out[[j, i]] = c;
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::Array1;
  use ndarray::Array2;
  use ndarray::array;
  use ndarray_stats::CorrelationExt;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::*;

  #[test]
  fn expected_median_and_mean() {
    let x = array![1.0, 2.0, 100.0, f64::NAN];
    assert_eq!(expected(x.view(), Method::Robust).unwrap(), 2.0);
    assert_abs_diff_eq!(expected(x.view(), Method::Normal).unwrap(), 103.0 / 3.0, epsilon = 1e-12);
  }

  #[test]
  fn normal_dispersion_is_sample_std() {
    let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
    assert_abs_diff_eq!(
      dispersion(x.view(), Dispersion::Normal).unwrap(),
      2.5_f64.sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn mad_is_scaled_and_differs_on_skewed_data() {
    let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
    // |x - 3| = [2, 1, 0, 1, 2], median 1
    assert_abs_diff_eq!(dispersion(x.view(), Dispersion::Mad).unwrap(), MAD_SCALE, epsilon = 1e-12);

    let skewed = array![1.0, 1.1, 1.2, 1.3, 9.0];
    let robust = dispersion(skewed.view(), Dispersion::Mad).unwrap();
    let normal = dispersion(skewed.view(), Dispersion::Normal).unwrap();
    assert!((robust - normal).abs() > 1.0);
  }

  #[test]
  fn quantile_dispersion_interpolates() {
    let x = array![1.0, 2.0, 3.0, 4.0, 5.0];
    // sorted deviations [0, 1, 1, 2, 2]; position 0.668 * 4 = 2.672
    assert_abs_diff_eq!(
      dispersion(x.view(), Dispersion::Quantile).unwrap(),
      1.672,
      epsilon = 1e-12
    );
  }

  #[test]
  fn all_nan_sample_is_insufficient() {
    let x = array![f64::NAN, f64::NAN];
    assert!(matches!(
      expected(x.view(), Method::Robust),
      Err(PortfolioError::InsufficientData { .. })
    ));
    assert!(matches!(
      dispersion(array![1.0].view(), Dispersion::Normal),
      Err(PortfolioError::InsufficientData { .. })
    ));
  }

  #[test]
  fn normal_co_dispersion_matches_complete_case_covariance() {
    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(0.0, 0.02).unwrap();
    let x = Array2::from_shape_fn((250, 3), |_| normal.sample(&mut rng));

    let ours = co_dispersion_sq(x.view(), Method::Normal).unwrap();
    let reference = x.t().cov(1.0).unwrap();

    for i in 0..3 {
      for j in 0..3 {
        assert_relative_eq!(ours[[i, j]], reference[[i, j]], max_relative = 1e-10);
      }
    }
  }

  #[test]
  fn co_dispersion_is_symmetric_with_squared_dispersion_diagonal() {
    let x = array![
      [0.01, 0.02, -0.01],
      [0.03, f64::NAN, 0.00],
      [-0.02, 0.01, 0.02],
      [0.00, -0.01, f64::NAN],
      [0.05, 0.04, 0.01],
      [0.02, 0.00, -0.03],
    ];

    for method in [Method::Robust, Method::Normal] {
      let c = co_dispersion_sq(x.view(), method).unwrap();
      for i in 0..3 {
        assert_abs_diff_eq!(
          c[[i, i]],
          dispersion(x.column(i), method.into()).unwrap().powi(2),
          epsilon = 1e-15
        );
        for j in 0..3 {
          assert_eq!(c[[i, j]], c[[j, i]]);
        }
      }
    }
  }

  #[test]
  fn pairwise_rows_are_dropped_independently() {
    let x = array![[1.0, 2.0, 1.0], [2.0, f64::NAN, 2.0], [3.0, 4.0, 3.0], [4.0, 8.0, 4.0]];
    let c = co_dispersion_sq(x.view(), Method::Normal).unwrap();

    // column 0 and 2 are identical, so their covariance uses all four rows
    let v0 = dispersion(x.column(0), Dispersion::Normal).unwrap().powi(2);
    assert_abs_diff_eq!(c[[0, 2]], v0, epsilon = 1e-12);

    // (0, 1) only sees rows 0, 2, 3
    let a = Array1::from(vec![1.0, 3.0, 4.0]);
    let b = Array1::from(vec![2.0, 4.0, 8.0]);
    let ma = a.mean().unwrap();
    let mb = b.mean().unwrap();
    let expected_cov = ((&a - ma) * (&b - mb)).sum() / 2.0;
    assert_abs_diff_eq!(c[[0, 1]], expected_cov, epsilon = 1e-12);
  }

  #[test]
  fn comad_off_diagonal() {
    let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 5.0], [4.0, 3.0], [5.0, 4.0]];
    let c = co_dispersion_sq(x.view(), Method::Robust).unwrap();
    // deviations from medians 3 and 3: [-2,-1,0,1,2] * [-1,-2,2,0,1] = [2,2,0,0,2]
    assert_abs_diff_eq!(c[[0, 1]], 2.0 * MAD_SCALE * MAD_SCALE, epsilon = 1e-12);
  }
}
