//! # Series
//!
//! $$
//! \{(t_k, \mathbf{x}_k)\}_{k=0}^{n-1},\quad t_0 < t_1 < \dots < t_{n-1}
//! $$
//!
//! Time-indexed price and return series.

pub mod returns;

use chrono::DateTime;
use chrono::NaiveDateTime;
use chrono::Utc;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::error::PortfolioError;
use crate::error::Result;

pub use returns::ReturnSeries;
pub use returns::compute_returns;
pub use returns::compute_returns_for;

/// Immutable, strictly time-ordered series of one or more columns.
///
/// Rows are observations, columns are assets. A single asset is a one-column
/// matrix.
#[derive(Clone, Debug)]
pub struct TimeSeries {
  name: String,
  timestamps: Vec<NaiveDateTime>,
  values: Array2<f64>,
  samp_int: usize,
  last_updated: DateTime<Utc>,
}

impl TimeSeries {
  /// Build a multi-column series.
  ///
  /// Fails when the timestamp count differs from the number of rows, when
  /// timestamps are not strictly increasing, or when `samp_int` is zero.
  pub fn new(
    name: impl Into<String>,
    timestamps: Vec<NaiveDateTime>,
    values: Array2<f64>,
    samp_int: usize,
  ) -> Result<Self> {
    if timestamps.len() != values.nrows() {
      return Err(PortfolioError::dimension(
        "time series timestamps vs value rows",
        timestamps.len(),
        values.nrows(),
      ));
    }
    if samp_int == 0 {
      return Err(PortfolioError::InvalidArgument(
        "sampling interval must be at least 1".into(),
      ));
    }
    if let Some(k) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
      return Err(PortfolioError::InvalidArgument(format!(
        "timestamps must be strictly increasing (violated at index {})",
        k + 1
      )));
    }

    Ok(Self {
      name: name.into(),
      timestamps,
      values,
      samp_int,
      last_updated: Utc::now(),
    })
  }

  /// Build a single-column series.
  pub fn from_values(
    name: impl Into<String>,
    timestamps: Vec<NaiveDateTime>,
    values: Array1<f64>,
    samp_int: usize,
  ) -> Result<Self> {
    Self::new(name, timestamps, values.insert_axis(Axis(1)), samp_int)
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn timestamps(&self) -> &[NaiveDateTime] {
    &self.timestamps
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  /// View of column `j`.
  pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
    self.values.column(j)
  }

  pub fn len(&self) -> usize {
    self.timestamps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timestamps.is_empty()
  }

  pub fn n_columns(&self) -> usize {
    self.values.ncols()
  }

  pub fn samp_int(&self) -> usize {
    self.samp_int
  }

  pub fn last_updated(&self) -> DateTime<Utc> {
    self.last_updated
  }

  /// Every `samp_int`-th row, starting with the first.
  pub fn sampled(&self) -> TimeSeries {
    let rows: Vec<usize> = (0..self.len()).step_by(self.samp_int).collect();
    TimeSeries {
      name: self.name.clone(),
      timestamps: rows.iter().map(|&i| self.timestamps[i]).collect(),
      values: self.values.select(Axis(0), &rows),
      samp_int: self.samp_int,
      last_updated: self.last_updated,
    }
  }

  /// Same data with a different sampling interval.
  pub fn with_samp_int(&self, samp_int: usize) -> Result<TimeSeries> {
    TimeSeries::new(
      self.name.clone(),
      self.timestamps.clone(),
      self.values.clone(),
      samp_int,
    )
  }
}
