//! # Portfolio Engine
//!
//! $$
//! \text{Uninitialized}\to\text{PricesSet}\to\text{ReturnsComputed}\to\text{PerformanceComputed}
//! $$
//!
//! Stateful portfolio holding prices, weights and the statistics derived
//! from them. Every mutation computes its new state first and only then
//! discards what the old state made stale, so a failed refresh leaves the
//! previous cache in place.

use tracing::debug;
use tracing::info;

use super::data::PriceSource;
use super::optimizers;
use super::optimizers::FRONTIER_POINTS;
use super::performance::check_normalized;
use super::performance::evaluate;
use super::statistics::compute_asset_statistics;
use super::types::FrontierPoint;
use super::types::Optimized;
use super::types::Performance;
use super::types::StatisticsResult;
use super::types::WeightVector;
use crate::config::Annualization;
use crate::config::OptimizerConfig;
use crate::config::StatisticsConfig;
use crate::config::StatisticsOverrides;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::ReturnSeries;
use crate::series::TimeSeries;

/// How far a [`Portfolio`] has progressed through its derived state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PortfolioState {
  Uninitialized,
  PricesSet,
  ReturnsComputed,
  PerformanceComputed,
}

/// Instance-level defaults of a [`Portfolio`].
#[derive(Clone, Debug, Default)]
pub struct PortfolioConfig {
  /// Overrides applied on top of [`StatisticsConfig::default`].
  pub statistics: StatisticsOverrides,
  /// Bounds, risk-free rate and solver limits. `annualize_by` is derived
  /// from the return time frame and `annualize`, not read from here.
  pub optimizer: OptimizerConfig,
  /// Scale performance to a yearly basis using the return time frame.
  pub annualize: bool,
}

/// A set of assets with their prices, weights and cached statistics.
pub struct Portfolio {
  name: String,
  symbols: Vec<String>,
  config: PortfolioConfig,
  source: Option<Box<dyn PriceSource>>,
  prices: Option<TimeSeries>,
  weights: Option<WeightVector>,
  returns: Option<ReturnSeries>,
  statistics: Option<StatisticsResult>,
  performance: Option<Performance>,
}

impl Portfolio {
  pub fn new(name: impl Into<String>, symbols: Vec<String>, config: PortfolioConfig) -> Self {
    Self {
      name: name.into(),
      symbols,
      config,
      source: None,
      prices: None,
      weights: None,
      returns: None,
      statistics: None,
      performance: None,
    }
  }

  /// Attach the source used by `update_prices(None)`.
  pub fn with_source(mut self, source: impl PriceSource + 'static) -> Self {
    self.source = Some(Box::new(source));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn symbols(&self) -> &[String] {
    &self.symbols
  }

  pub fn config(&self) -> &PortfolioConfig {
    &self.config
  }

  pub fn prices(&self) -> Option<&TimeSeries> {
    self.prices.as_ref()
  }

  pub fn weights(&self) -> Option<&WeightVector> {
    self.weights.as_ref()
  }

  pub fn returns(&self) -> Option<&ReturnSeries> {
    self.returns.as_ref()
  }

  pub fn statistics(&self) -> Option<&StatisticsResult> {
    self.statistics.as_ref()
  }

  pub fn performance(&self) -> Option<Performance> {
    self.performance
  }

  pub fn state(&self) -> PortfolioState {
    match (&self.prices, &self.statistics, &self.performance) {
      (None, _, _) => PortfolioState::Uninitialized,
      (Some(_), None, _) => PortfolioState::PricesSet,
      (Some(_), Some(_), None) => PortfolioState::ReturnsComputed,
      (Some(_), Some(_), Some(_)) => PortfolioState::PerformanceComputed,
    }
  }

  /// Replace the prices, loading them from the attached source when `prices`
  /// is `None`. Clears returns, statistics and performance.
  pub fn update_prices(&mut self, prices: Option<TimeSeries>) -> Result<()> {
    let prices = match prices {
      Some(p) => p,
      None => {
        let source = self.source.as_ref().ok_or_else(|| {
          PortfolioError::InvalidArgument(format!("portfolio {} has no price source", self.name))
        })?;
        source
          .load(&self.symbols)?
          .into_time_series(self.name.clone(), 1)?
      }
    };

    if !self.symbols.is_empty() && prices.n_columns() != self.symbols.len() {
      return Err(PortfolioError::dimension(
        "price columns vs portfolio symbols",
        self.symbols.len(),
        prices.n_columns(),
      ));
    }
    if let Some(w) = &self.weights {
      if w.len() != prices.n_columns() {
        return Err(PortfolioError::dimension(
          "price columns vs weights",
          w.len(),
          prices.n_columns(),
        ));
      }
    }

    debug!(portfolio = %self.name, rows = prices.len(), "prices updated");
    self.prices = Some(prices);
    self.returns = None;
    self.statistics = None;
    self.performance = None;
    Ok(())
  }

  /// Set normalized weights. Clears only the cached performance.
  pub fn set_weights(&mut self, weights: WeightVector) -> Result<()> {
    let n = self.n_assets();
    if n > 0 && weights.len() != n {
      return Err(PortfolioError::dimension("weights vs assets", n, weights.len()));
    }
    check_normalized(weights.view())?;

    self.weights = Some(weights);
    self.performance = None;
    Ok(())
  }

  /// Effective statistics options: `explicit` over the instance overrides
  /// over the global defaults.
  pub fn statistics_config(&self, explicit: &StatisticsOverrides) -> StatisticsConfig {
    StatisticsConfig::default().resolve_with(explicit, &self.config.statistics)
  }

  /// Recompute returns and statistics from the current prices.
  pub fn update_returns(&mut self, explicit: &StatisticsOverrides) -> Result<&StatisticsResult> {
    let config = self.statistics_config(explicit);
    let (returns, statistics) = compute_asset_statistics(self.prices.as_ref(), &config)?;

    self.returns = Some(returns);
    self.performance = None;
    Ok(&*self.statistics.insert(statistics))
  }

  fn annualize_by(&self, annualize: Option<bool>) -> Annualization {
    let annualize = annualize.unwrap_or(self.config.annualize);
    match &self.returns {
      Some(r) => Annualization::for_time_frame(r.time_frame, annualize),
      None => Annualization::None,
    }
  }

  fn optimizer_config(&self, annualize: Option<bool>) -> OptimizerConfig {
    OptimizerConfig {
      annualize_by: self.annualize_by(annualize),
      ..self.config.optimizer
    }
  }

  fn cached_statistics(&self) -> Result<&StatisticsResult> {
    self.statistics.as_ref().ok_or(PortfolioError::NoReturnsData)
  }

  /// Expected return and dispersion of the current weights.
  pub fn update_performance(&mut self, annualize: Option<bool>) -> Result<Performance> {
    let stats = self.cached_statistics()?;
    let weights = self
      .weights
      .as_ref()
      .ok_or_else(|| PortfolioError::InvalidArgument("weights have not been set".into()))?;

    let perf = evaluate(
      weights.view(),
      stats.expected.view(),
      stats.co_dispersion_sq.view(),
      self.annualize_by(annualize),
    )?;
    self.performance = Some(perf);
    Ok(perf)
  }

  fn adopt(&mut self, opt: &Optimized) {
    self.weights = Some(opt.weights.clone());
    self.performance = Some(opt.performance);
  }

  /// Maximum-Sharpe weights; on success they become the portfolio weights.
  pub fn maximize_sharpe(&mut self, annualize: Option<bool>) -> Result<Optimized> {
    let stats = self.cached_statistics()?;
    let opt = optimizers::maximize_sharpe(
      stats.expected.view(),
      stats.co_dispersion_sq.view(),
      &self.optimizer_config(annualize),
    )?;

    info!(portfolio = %self.name, sharpe = -opt.objective, "max sharpe weights adopted");
    self.adopt(&opt);
    Ok(opt)
  }

  /// Minimum-dispersion weights; on success they become the portfolio
  /// weights.
  pub fn minimize_dispersion(
    &mut self,
    target_return: Option<f64>,
    annualize: Option<bool>,
  ) -> Result<Optimized> {
    let stats = self.cached_statistics()?;
    let opt = optimizers::minimize_dispersion(
      stats.expected.view(),
      stats.co_dispersion_sq.view(),
      &self.optimizer_config(annualize),
      target_return,
    )?;

    info!(portfolio = %self.name, dispersion = opt.objective, "min dispersion weights adopted");
    self.adopt(&opt);
    Ok(opt)
  }

  /// Efficient frontier over `targets`, or over the default sweep when
  /// `targets` is `None`. Leaves the portfolio weights alone.
  pub fn efficient_frontier(
    &self,
    targets: Option<&[f64]>,
    annualize: Option<bool>,
  ) -> Result<Vec<FrontierPoint>> {
    let stats = self.cached_statistics()?;
    let config = self.optimizer_config(annualize);
    let expected = stats.expected.view();
    let co = stats.co_dispersion_sq.view();

    match targets {
      Some(t) => optimizers::efficient_frontier(expected, co, t, &config),
      None => {
        let t = optimizers::frontier_targets(expected, co, &config, FRONTIER_POINTS)?;
        optimizers::efficient_frontier(expected, co, &t, &config)
      }
    }
  }

  fn n_assets(&self) -> usize {
    match &self.prices {
      Some(p) => p.n_columns(),
      None => self.symbols.len(),
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::config::Bounds;
  use crate::config::Method;
  use crate::config::TimeFrame;
  use crate::portfolio::data::InMemoryPriceSource;
  use crate::portfolio::data::PriceFrame;
  use crate::series::tests::days;

  fn prices(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 3), |(t, j)| {
      let t = t as f64;
      match j {
        0 => 100.0 * (1.0 + 0.002 * t + 0.01 * (0.9 * t).sin()),
        1 => 40.0 * (1.0 + 0.003 * t + 0.02 * (1.7 * t).cos()),
        _ => 10.0 * (1.0 + 0.004 * t + 0.03 * (2.3 * t).sin()),
      }
    })
  }

  fn symbols() -> Vec<String> {
    vec!["AAA".into(), "BBB".into(), "CCC".into()]
  }

  fn daily() -> PortfolioConfig {
    PortfolioConfig {
      statistics: StatisticsOverrides {
        time_frame: Some(TimeFrame::Day),
        ..Default::default()
      },
      ..Default::default()
    }
  }

  fn loaded(n: usize) -> Portfolio {
    let mut p = Portfolio::new("test", symbols(), daily());
    let ts = TimeSeries::new("test", days(n), prices(n), 1).unwrap();
    p.update_prices(Some(ts)).unwrap();
    p
  }

  #[test]
  fn walks_through_every_state() {
    let mut p = Portfolio::new("test", symbols(), daily());
    assert_eq!(p.state(), PortfolioState::Uninitialized);

    let ts = TimeSeries::new("test", days(60), prices(60), 1).unwrap();
    p.update_prices(Some(ts)).unwrap();
    assert_eq!(p.state(), PortfolioState::PricesSet);

    p.update_returns(&StatisticsOverrides::default()).unwrap();
    assert_eq!(p.state(), PortfolioState::ReturnsComputed);
    assert_eq!(p.returns().unwrap().len(), 59);

    p.set_weights(array![0.2, 0.3, 0.5]).unwrap();
    p.update_performance(None).unwrap();
    assert_eq!(p.state(), PortfolioState::PerformanceComputed);
  }

  #[test]
  fn preconditions_are_enforced() {
    let mut p = Portfolio::new("test", symbols(), daily());
    assert!(matches!(
      p.update_returns(&StatisticsOverrides::default()),
      Err(PortfolioError::NoPriceData)
    ));
    assert!(matches!(p.update_performance(None), Err(PortfolioError::NoReturnsData)));
    assert!(matches!(p.maximize_sharpe(None), Err(PortfolioError::NoReturnsData)));
  }

  #[test]
  fn new_prices_clear_all_derived_state() {
    let mut p = loaded(60);
    p.update_returns(&StatisticsOverrides::default()).unwrap();
    p.set_weights(array![0.2, 0.3, 0.5]).unwrap();
    p.update_performance(None).unwrap();

    let ts = TimeSeries::new("test", days(70), prices(70), 1).unwrap();
    p.update_prices(Some(ts)).unwrap();
    assert_eq!(p.state(), PortfolioState::PricesSet);
    assert!(p.returns().is_none());
    assert!(p.statistics().is_none());
    assert!(p.performance().is_none());
    assert!(p.weights().is_some());
  }

  #[test]
  fn weights_clear_only_performance() {
    let mut p = loaded(60);
    p.update_returns(&StatisticsOverrides::default()).unwrap();
    p.set_weights(array![0.2, 0.3, 0.5]).unwrap();
    p.update_performance(None).unwrap();

    p.set_weights(array![0.5, 0.3, 0.2]).unwrap();
    assert_eq!(p.state(), PortfolioState::ReturnsComputed);
    assert!(p.statistics().is_some());

    let err = p.set_weights(array![0.5, 0.5, 0.5]).unwrap_err();
    assert!(matches!(err, PortfolioError::WeightsNotNormalized { .. }));
    assert_eq!(p.weights().unwrap()[0], 0.5);
  }

  #[test]
  fn failed_refresh_keeps_previous_statistics() {
    let mut p = loaded(60);
    let before = p.update_returns(&StatisticsOverrides::default()).unwrap().clone();

    // sixty prices cannot produce yearly returns
    let err = p
      .update_returns(&StatisticsOverrides {
        time_frame: Some(TimeFrame::Year),
        ..Default::default()
      })
      .unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidArgument(_)));
    assert_eq!(p.statistics(), Some(&before));
    assert_eq!(p.state(), PortfolioState::ReturnsComputed);
  }

  #[test]
  fn explicit_overrides_win_over_instance_defaults() {
    let p = Portfolio::new("test", symbols(), daily());
    let cfg = p.statistics_config(&StatisticsOverrides {
      method: Some(Method::Normal),
      ..Default::default()
    });
    assert_eq!(cfg.time_frame, TimeFrame::Day);
    assert_eq!(cfg.method, Method::Normal);
    assert_eq!(cfg.sample_stride, 1);
  }

  #[test]
  fn loads_from_the_attached_source() {
    let frame = PriceFrame {
      prices: prices(40),
      timestamps: days(40),
      symbols: symbols(),
    };
    let mut p = Portfolio::new("src", vec!["CCC".into(), "AAA".into()], daily())
      .with_source(InMemoryPriceSource::new(frame));
    p.update_prices(None).unwrap();

    let loaded = p.prices().unwrap();
    assert_eq!(loaded.n_columns(), 2);
    assert_eq!(loaded.values()[[0, 0]], 10.0);
    assert_eq!(loaded.values()[[0, 1]], 100.0);

    let mut bare = Portfolio::new("bare", symbols(), daily());
    assert!(bare.update_prices(None).is_err());
  }

  #[test]
  #[traced_test]
  fn optimizers_adopt_their_weights() {
    let mut p = loaded(120);
    p.update_returns(&StatisticsOverrides {
      method: Some(Method::Normal),
      ..Default::default()
    })
    .unwrap();

    let opt = p.minimize_dispersion(None, None).unwrap();
    assert_eq!(p.weights(), Some(&opt.weights));
    assert_eq!(p.state(), PortfolioState::PerformanceComputed);
    assert_abs_diff_eq!(opt.weights.sum(), 1.0, epsilon = 1e-9);

    let perf = p.update_performance(None).unwrap();
    assert_abs_diff_eq!(perf.dispersion, opt.performance.dispersion, epsilon = 1e-15);
    assert!(logs_contain("min dispersion weights adopted"));
  }

  #[test]
  fn frontier_leaves_weights_untouched() {
    let mut p = loaded(120);
    p.update_returns(&StatisticsOverrides {
      method: Some(Method::Normal),
      ..Default::default()
    })
    .unwrap();
    p.set_weights(array![0.2, 0.3, 0.5]).unwrap();

    let frontier = p.efficient_frontier(None, None).unwrap();
    assert_eq!(frontier.len(), FRONTIER_POINTS);
    assert_eq!(p.weights().unwrap()[2], 0.5);
  }

  #[test]
  fn failed_price_update_keeps_derived_state() {
    let frame = PriceFrame {
      prices: prices(60).select(ndarray::Axis(1), &[0, 1]),
      timestamps: days(60),
      symbols: vec!["AAA".into(), "BBB".into()],
    };
    let mut p = loaded(60).with_source(InMemoryPriceSource::new(frame));
    p.update_returns(&StatisticsOverrides::default()).unwrap();
    p.set_weights(array![0.2, 0.3, 0.5]).unwrap();
    p.update_performance(None).unwrap();

    let statistics = p.statistics().cloned();
    let performance = p.performance();
    let n_returns = p.returns().map(|r| r.len());

    let two_columns = prices(70).select(ndarray::Axis(1), &[0, 1]);
    let narrow = TimeSeries::new("test", days(70), two_columns, 1).unwrap();
    assert!(matches!(
      p.update_prices(Some(narrow)),
      Err(PortfolioError::DimensionMismatch { .. })
    ));
    // the source has no CCC
    assert!(matches!(p.update_prices(None), Err(PortfolioError::InvalidArgument(_))));

    assert_eq!(p.state(), PortfolioState::PerformanceComputed);
    assert_eq!(p.statistics().cloned(), statistics);
    assert_eq!(p.performance(), performance);
    assert_eq!(p.returns().map(|r| r.len()), n_returns);
    assert_eq!(p.prices().unwrap().len(), 60);
  }

  #[test]
  fn robust_statistics_drive_every_optimizer() {
    let mut p = loaded(250);
    let stats = p.update_returns(&StatisticsOverrides::default()).unwrap();
    assert_eq!(stats.method, Method::Robust);

    let in_bounds = |w: &WeightVector| {
      assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-9);
      assert!(w.iter().all(|&v| (-1e-9..=1.0 + 1e-9).contains(&v)));
    };

    let sharpe = p.maximize_sharpe(None).unwrap();
    in_bounds(&sharpe.weights);
    let min = p.minimize_dispersion(None, None).unwrap();
    in_bounds(&min.weights);
    assert!(min.performance.dispersion <= sharpe.performance.dispersion + 1e-7);

    let lo = min.performance.expected_return;
    let hi = sharpe.performance.expected_return.max(lo);
    let targets = [lo, 0.5 * (lo + hi), hi];
    let frontier = p.efficient_frontier(Some(&targets[..]), None).unwrap();
    assert_eq!(frontier.len(), 3);
    for point in &frontier {
      in_bounds(&point.weights);
      assert_abs_diff_eq!(point.expected_return, point.target_return, epsilon = 1e-7);
    }
  }

  #[test]
  fn default_frontier_respects_custom_bounds() {
    let config = PortfolioConfig {
      optimizer: OptimizerConfig {
        bounds: Bounds::new(0.1, 0.5),
        ..Default::default()
      },
      ..daily()
    };
    let mut p = Portfolio::new("bounded", symbols(), config);
    let ts = TimeSeries::new("bounded", days(120), prices(120), 1).unwrap();
    p.update_prices(Some(ts)).unwrap();
    p.update_returns(&StatisticsOverrides {
      method: Some(Method::Normal),
      ..Default::default()
    })
    .unwrap();

    let frontier = p.efficient_frontier(None, None).unwrap();
    assert_eq!(frontier.len(), FRONTIER_POINTS);
    for point in &frontier {
      assert!(point.weights.iter().all(|&w| (0.1 - 1e-9..=0.5 + 1e-9).contains(&w)));
    }
  }
}
