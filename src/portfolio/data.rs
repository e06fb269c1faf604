//! # Portfolio Data
//!
//! $$
//! P \in \mathbb R^{T\times N},\qquad P_{t,i} = \text{NaN} \iff \text{asset } i \text{ has no quote at } t
//! $$
//!
//! Price frames and the seam through which a portfolio loads them.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use ndarray::Array2;
use ndarray::Axis;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::series::TimeSeries;

/// Close prices of several symbols on a shared time axis.
#[derive(Clone, Debug)]
pub struct PriceFrame {
  /// `timestamps.len() x symbols.len()`, NaN where a symbol has no price.
  pub prices: Array2<f64>,
  pub timestamps: Vec<NaiveDateTime>,
  pub symbols: Vec<String>,
}

impl PriceFrame {
  /// Column index of `symbol`.
  pub fn position(&self, symbol: &str) -> Option<usize> {
    self.symbols.iter().position(|s| s == symbol)
  }

  /// Frame holding only `symbols`, in that order.
  pub fn select(&self, symbols: &[String]) -> Result<PriceFrame> {
    let cols = symbols
      .iter()
      .map(|s| {
        self
          .position(s)
          .ok_or_else(|| PortfolioError::InvalidArgument(format!("unknown symbol {s}")))
      })
      .collect::<Result<Vec<usize>>>()?;

    Ok(PriceFrame {
      prices: self.prices.select(Axis(1), &cols),
      timestamps: self.timestamps.clone(),
      symbols: symbols.to_vec(),
    })
  }

  pub fn into_time_series(self, name: impl Into<String>, samp_int: usize) -> Result<TimeSeries> {
    TimeSeries::new(name, self.timestamps, self.prices, samp_int)
  }
}

/// Align per-symbol `(timestamp, price)` observations on the union of their
/// timestamps, filling gaps with NaN.
pub fn align_price_series(series: &[(String, Vec<(NaiveDateTime, f64)>)]) -> PriceFrame {
  let axis: BTreeSet<NaiveDateTime> = series
    .iter()
    .flat_map(|(_, obs)| obs.iter().map(|(t, _)| *t))
    .collect();
  let row_of: BTreeMap<NaiveDateTime, usize> = axis.iter().enumerate().map(|(i, t)| (*t, i)).collect();

  let mut prices = Array2::from_elem((axis.len(), series.len()), f64::NAN);
  for (j, (_, obs)) in series.iter().enumerate() {
    for (t, p) in obs {
      prices[[row_of[t], j]] = *p;
    }
  }

  PriceFrame {
    prices,
    timestamps: axis.into_iter().collect(),
    symbols: series.iter().map(|(s, _)| s.clone()).collect(),
  }
}

/// Anything that can produce prices for a list of symbols.
///
/// Columns of the returned frame follow the order of `symbols`.
pub trait PriceSource {
  fn load(&self, symbols: &[String]) -> Result<PriceFrame>;
}

/// Serves prices from a frame held in memory.
#[derive(Clone, Debug)]
pub struct InMemoryPriceSource {
  frame: PriceFrame,
}

impl InMemoryPriceSource {
  pub fn new(frame: PriceFrame) -> Self {
    Self { frame }
  }
}

impl PriceSource for InMemoryPriceSource {
  fn load(&self, symbols: &[String]) -> Result<PriceFrame> {
    if symbols.is_empty() {
      return Err(PortfolioError::InvalidArgument("no symbols requested".into()));
    }
    self.frame.select(symbols)
  }
}
