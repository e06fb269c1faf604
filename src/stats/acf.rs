//! # Autocorrelation
//!
//! $$
//! \hat\rho_k = \frac{\sum_{t}(x_t-\bar x)(x_{t+k}-\bar x)}{\sum_t (x_t-\bar x)^2},\qquad
//! \operatorname{Var}\hat\rho_k \approx \frac{1}{n}\Big(1+2\sum_{j<k}\hat\rho_j^2\Big)
//! $$
//!
//! Sample autocorrelation of an evenly spaced series with Bartlett
//! confidence bands, used to judge a sensible sampling interval.

use ndarray::Array1;
use ndarray::ArrayView1;
use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::error::PortfolioError;
use crate::error::Result;

/// Autocorrelation estimates and their confidence band.
#[derive(Clone, Debug)]
pub struct AcfResult {
  /// `acf[k]` is the autocorrelation at lag `k`; `acf[0] == 1`.
  pub acf: Array1<f64>,
  pub lags: Vec<usize>,
  pub lower: Array1<f64>,
  pub upper: Array1<f64>,
}

/// Autocorrelation up to lag `floor(frac_lag * n)` with a `ci` percent band.
///
/// Missing values are handled conservatively: the mean is taken over the
/// present values, missing ones contribute nothing to any lag product, and
/// every lag is normalized by the number of present values.
pub fn acf(x: ArrayView1<f64>, frac_lag: f64, ci: f64) -> Result<AcfResult> {
  if !(0.0..=1.0).contains(&frac_lag) {
    return Err(PortfolioError::InvalidArgument(format!(
      "lag fraction must lie in [0, 1], got {frac_lag}"
    )));
  }
  if !(ci > 0.0 && ci < 100.0) {
    return Err(PortfolioError::InvalidArgument(format!(
      "confidence level must lie in (0, 100), got {ci}"
    )));
  }

  let n = x.len();
  let present = x.iter().filter(|v| !v.is_nan()).count();
  if present < 2 {
    return Err(PortfolioError::InsufficientData {
      estimator: "autocorrelation",
      required: 2,
      available: present,
    });
  }

  let mean = x.iter().filter(|v| !v.is_nan()).sum::<f64>() / present as f64;
  let centered: Vec<f64> = x
    .iter()
    .map(|&v| if v.is_nan() { 0.0 } else { v - mean })
    .collect();

  let max_lag = ((frac_lag * n as f64) as usize).min(n - 1);
  let acov: Vec<f64> = (0..=max_lag)
    .map(|k| {
      centered[..n - k]
        .iter()
        .zip(&centered[k..])
        .map(|(a, b)| a * b)
        .sum::<f64>()
        / present as f64
    })
    .collect();

  if acov[0] <= 0.0 {
    return Err(PortfolioError::DegenerateDispersion { dispersion: 0.0 });
  }
  let rho = Array1::from_iter(acov.iter().map(|c| c / acov[0]));

  let std_normal = Normal::new(0.0, 1.0)
    .map_err(|e| PortfolioError::InvalidArgument(format!("standard normal: {e}")))?;
  let z = std_normal.inverse_cdf(1.0 - (1.0 - ci / 100.0) / 2.0);

  let nobs = present as f64;
  let mut half_width = Array1::<f64>::zeros(max_lag + 1);
  let mut cum = 0.0;
  for k in 1..=max_lag {
    half_width[k] = z * ((1.0 + 2.0 * cum) / nobs).sqrt();
    cum += rho[k] * rho[k];
  }

  Ok(AcfResult {
    lower: &rho - &half_width,
    upper: &rho + &half_width,
    lags: (0..=max_lag).collect(),
    acf: rho,
  })
}
