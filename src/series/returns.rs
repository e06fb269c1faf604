//! # Returns
//!
//! $$
//! r_k = m\!\left(x_k,\ x_{k+p}\right),\qquad k = 0,\dots,n-p-1
//! $$
//!
//! Lagged returns of a price series under a chosen [`Metric`].

use ndarray::Array2;
use ndarray::s;

use super::TimeSeries;
use crate::config::Metric;
use crate::config::Method;
use crate::config::TimeFrame;
use crate::error::PortfolioError;
use crate::error::Result;

/// Return series together with the settings that produced it.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  pub series: TimeSeries,
  /// Lag in sample steps.
  pub period: usize,
  pub metric: Metric,
  /// Estimator family later statistics on this series should use.
  pub method: Method,
  pub time_frame: TimeFrame,
  pub samp_int: usize,
}

impl ReturnSeries {
  pub fn len(&self) -> usize {
    self.series.len()
  }

  pub fn is_empty(&self) -> bool {
    self.series.is_empty()
  }

  pub fn values(&self) -> &Array2<f64> {
    self.series.values()
  }

  /// Decimated returns, every `samp_int`-th row.
  pub fn sampled(&self) -> ReturnSeries {
    ReturnSeries {
      series: self.series.sampled(),
      ..self.clone()
    }
  }
}

/// Returns over `period` steps, column by column.
///
/// The output keeps the column order and drops the first `period`
/// timestamps, so row `k` is stamped with the later of the two prices.
/// Metadata defaults to the [`Method::Robust`] family and a time frame
/// matching `period` when one exists (otherwise [`TimeFrame::Day`]).
pub fn compute_returns(prices: &TimeSeries, period: usize, metric: Metric) -> Result<ReturnSeries> {
  let n = prices.len();
  if period == 0 || period >= n {
    return Err(PortfolioError::InvalidArgument(format!(
      "period must lie in [1, {n}) for a series of length {n}, got {period}"
    )));
  }

  let earlier = prices.values().slice(s![..n - period, ..]);
  let later = prices.values().slice(s![period.., ..]);
  let mut out = Array2::<f64>::zeros(earlier.raw_dim());
  ndarray::Zip::from(&mut out)
    .and(&earlier)
    .and(&later)
    .for_each(|r, &x0, &xi| *r = metric.apply(x0, xi));

  let series = TimeSeries::new(
    format!("{} {} returns", prices.name(), metric),
    prices.timestamps()[period..].to_vec(),
    out,
    prices.samp_int(),
  )?;

  let time_frame = match period {
    21 => TimeFrame::Month,
    252 => TimeFrame::Year,
    _ => TimeFrame::Day,
  };

  Ok(ReturnSeries {
    series,
    period,
    metric,
    method: Method::Robust,
    time_frame,
    samp_int: prices.samp_int(),
  })
}

/// [`compute_returns`] with the lag taken from `time_frame` and the
/// metadata stamped from the arguments.
pub fn compute_returns_for(
  prices: &TimeSeries,
  time_frame: TimeFrame,
  metric: Metric,
  method: Method,
) -> Result<ReturnSeries> {
  let mut returns = compute_returns(prices, time_frame.period(), metric)?;
  returns.method = method;
  returns.time_frame = time_frame;
  Ok(returns)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array1;
  use ndarray::array;

  use super::*;
  use crate::series::tests::days;

  fn prices(values: Array1<f64>) -> TimeSeries {
    TimeSeries::from_values("px", days(values.len()), values, 1).unwrap()
  }

  #[test]
  fn length_is_n_minus_period_for_every_metric() {
    let px = prices(Array1::linspace(10.0, 30.0, 40));
    for metric in [Metric::Relative, Metric::Delta, Metric::Simple, Metric::Log] {
      for period in [1, 5, 21, 39] {
        let r = compute_returns(&px, period, metric).unwrap();
        assert_eq!(r.len(), 40 - period);
        assert_eq!(r.series.timestamps()[0], px.timestamps()[period]);
      }
    }
  }

  #[test]
  fn metric_formulas() {
    let px = prices(array![100.0, 110.0, 99.0]);

    let rel = compute_returns(&px, 1, Metric::Relative).unwrap();
    assert_abs_diff_eq!(rel.values()[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(rel.values()[[1, 0]], -0.1, epsilon = 1e-12);

    let delta = compute_returns(&px, 2, Metric::Delta).unwrap();
    assert_abs_diff_eq!(delta.values()[[0, 0]], -1.0, epsilon = 1e-12);

    let simple = compute_returns(&px, 1, Metric::Simple).unwrap();
    assert_abs_diff_eq!(simple.values()[[0, 0]], 1.1, epsilon = 1e-12);

    let log = compute_returns(&px, 1, Metric::Log).unwrap();
    assert_abs_diff_eq!(log.values()[[0, 0]], 1.1_f64.ln(), epsilon = 1e-12);
  }

  #[test]
  fn flat_prices_agree_across_metrics() {
    let px = prices(array![42.0, 42.0, 42.0]);
    let simple = compute_returns(&px, 1, Metric::Simple).unwrap();
    let rel = compute_returns(&px, 1, Metric::Relative).unwrap();
    let log = compute_returns(&px, 1, Metric::Log).unwrap();

    assert_eq!(simple.values()[[0, 0]], 1.0);
    assert_eq!(rel.values()[[0, 0]], 0.0);
    assert_eq!(log.values()[[0, 0]], 0.0);
  }

  #[test]
  fn columns_are_transformed_independently() {
    let values = array![[1.0, 10.0], [2.0, 10.0], [4.0, 5.0]];
    let px = TimeSeries::new("px", days(3), values, 1).unwrap();
    let r = compute_returns(&px, 1, Metric::Relative).unwrap();

    assert_eq!(r.values(), &array![[1.0, 0.0], [1.0, -0.5]]);
  }

  #[test]
  fn time_frame_sets_period_and_metadata() {
    let px = prices(Array1::linspace(1.0, 2.0, 30));
    let r = compute_returns_for(&px, TimeFrame::Month, Metric::Log, Method::Normal).unwrap();

    assert_eq!(r.period, 21);
    assert_eq!(r.len(), 9);
    assert_eq!(r.method, Method::Normal);
    assert_eq!(r.time_frame, TimeFrame::Month);
  }

  #[test]
  fn period_out_of_range_is_rejected() {
    let px = prices(array![1.0, 2.0, 3.0]);
    assert!(compute_returns(&px, 0, Metric::Delta).is_err());
    assert!(compute_returns(&px, 3, Metric::Delta).is_err());
  }
}
