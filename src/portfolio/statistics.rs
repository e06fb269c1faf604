//! # Return Statistics
//!
//! $$
//! \hat\mu_i = \operatorname{med}_t r_{i,t},\qquad
//! \hat\Sigma_{ij} = \operatorname{CoMAD}(r_i, r_j)
//! $$
//!
//! From prices to per-asset expected returns and the co-dispersion-squared
//! matrix the optimizers consume.

use ndarray::Array1;
use tracing::debug;

use super::types::StatisticsResult;
use crate::config::StatisticsConfig;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::ReturnSeries;
use crate::series::TimeSeries;
use crate::series::compute_returns_for;
use crate::stats::robust::co_dispersion_sq;
use crate::stats::robust::expected;

/// Returns and statistics of `prices` under `config`.
///
/// The returns are computed over the period of `config.time_frame`, then
/// decimated to every `config.sample_stride`-th row before estimating.
pub fn compute_asset_statistics(
  prices: Option<&TimeSeries>,
  config: &StatisticsConfig,
) -> Result<(ReturnSeries, StatisticsResult)> {
  let prices = prices.ok_or(PortfolioError::NoPriceData)?;
  if config.sample_stride == 0 {
    return Err(PortfolioError::InvalidArgument(
      "sample stride must be at least 1".into(),
    ));
  }

  let mut returns = compute_returns_for(prices, config.time_frame, config.metric, config.method)?;
  returns.series = returns.series.with_samp_int(config.sample_stride)?;
  returns.samp_int = config.sample_stride;

  let stats = statistics_from_returns(&returns)?;
  debug!(
    assets = stats.n_assets(),
    rows = returns.len(),
    stride = config.sample_stride,
    method = %config.method,
    "asset statistics computed"
  );
  Ok((returns, stats))
}

/// Statistics of an existing return series, using its own `method` and
/// `samp_int`.
pub fn statistics_from_returns(returns: &ReturnSeries) -> Result<StatisticsResult> {
  let sampled = returns.sampled();
  let values = sampled.values();

  let expected = values
    .columns()
    .into_iter()
    .map(|col| expected(col, returns.method))
    .collect::<Result<Vec<f64>>>()?;

  Ok(StatisticsResult {
    expected: Array1::from(expected),
    co_dispersion_sq: co_dispersion_sq(values.view(), returns.method)?,
    method: returns.method,
  })
}
