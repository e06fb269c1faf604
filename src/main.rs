use chrono::Duration;
use chrono::NaiveDate;
use condor_rs::Method;
use condor_rs::Portfolio;
use condor_rs::PortfolioConfig;
use condor_rs::StatisticsOverrides;
use condor_rs::TimeSeries;
use condor_rs::stats::acf::acf;
use condor_rs::stats::preassess::running_returns;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

const TRADING_DAYS: usize = 756;

/// Daily geometric Brownian motion closes for `(drift, vol)` pairs given
/// per year.
fn simulate_prices(params: &[(f64, f64)], seed: u64) -> anyhow::Result<Array2<f64>> {
  let mut rng = StdRng::seed_from_u64(seed);
  let dt = 1.0 / 252.0;
  let mut prices = Array2::<f64>::zeros((TRADING_DAYS, params.len()));

  for (j, &(mu, sigma)) in params.iter().enumerate() {
    let shock = Normal::new((mu - 0.5 * sigma * sigma) * dt, sigma * dt.sqrt())?;
    let mut px = 100.0;
    for t in 0..TRADING_DAYS {
      prices[[t, j]] = px;
      px *= shock.sample(&mut rng).exp();
    }
  }

  Ok(prices)
}

fn main() -> anyhow::Result<()> {
  let symbols: Vec<String> = ["ALPHA", "BETA", "GAMMA", "DELTA"]
    .iter()
    .map(|s| s.to_string())
    .collect();
  let params = [(0.06, 0.12), (0.09, 0.20), (0.12, 0.30), (0.04, 0.08)];

  let start = NaiveDate::from_ymd_opt(2021, 1, 4)
    .and_then(|d| d.and_hms_opt(16, 0, 0))
    .ok_or_else(|| anyhow::anyhow!("invalid start date"))?;
  let timestamps = (0..TRADING_DAYS)
    .map(|k| start + Duration::days(k as i64))
    .collect();
  let prices = TimeSeries::new("demo", timestamps, simulate_prices(&params, 42)?, 1)?;

  let first = prices.column(0).to_owned();
  let running = running_returns(first.view(), 0.1, Default::default(), Method::Robust)?;
  println!(
    "{}: median {}-day return {:.4}",
    symbols[0],
    running.lags.len() - 1,
    running.expected[running.lags.len() - 1]
  );

  let mut portfolio = Portfolio::new(
    "demo",
    symbols.clone(),
    PortfolioConfig {
      annualize: true,
      ..Default::default()
    },
  );
  portfolio.update_prices(Some(prices))?;
  let stats = portfolio.update_returns(&StatisticsOverrides::default())?.clone();

  println!("\nmonthly return statistics (robust)");
  for (k, s) in symbols.iter().enumerate() {
    println!(
      "  {:<6} expected {:>8.4}  dispersion {:>8.4}",
      s,
      stats.expected[k],
      stats.dispersions()[k]
    );
  }

  if let Some(returns) = portfolio.returns() {
    let r = acf(returns.series.column(0), 0.05, 95.0)?;
    println!("\n{} monthly-return acf at lag 1: {:.3}", symbols[0], r.acf[1]);
  }

  let sharpe = portfolio.maximize_sharpe(None)?;
  println!("\nmax sharpe ({} iterations)", sharpe.iterations);
  for (s, w) in symbols.iter().zip(sharpe.weights.iter()) {
    println!("  {:<6} {:>6.2}%", s, 100.0 * w);
  }
  println!(
    "  return {:.4}  dispersion {:.4}  sharpe {:.3}",
    sharpe.performance.expected_return, sharpe.performance.dispersion, -sharpe.objective
  );

  let min_disp = portfolio.minimize_dispersion(None, None)?;
  println!("\nmin dispersion ({} iterations)", min_disp.iterations);
  for (s, w) in symbols.iter().zip(min_disp.weights.iter()) {
    println!("  {:<6} {:>6.2}%", s, 100.0 * w);
  }

  let frontier = portfolio.efficient_frontier(None, None)?;
  println!("\nefficient frontier ({} points)", frontier.len());
  for point in frontier.iter().step_by(20) {
    println!(
      "  return {:>8.4}  dispersion {:>8.4}",
      point.expected_return, point.dispersion
    );
  }

  Ok(())
}
