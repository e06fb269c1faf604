//! # condor-rs
//!
//! $$
//! \max_{\mathbf w}\ \frac{\mu_p(\mathbf w)-r_f}{\sigma_p(\mathbf w)}
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ \mathbf l\le\mathbf w\le\mathbf u
//! $$
//!
//! Risk/return statistics of historical price series and constrained
//! portfolio optimization on top of them. Estimators come in a robust
//! (median, MAD, CoMAD) and a normal-theory flavour.

pub mod config;
pub mod error;
pub mod portfolio;
pub mod series;
pub mod stats;

pub use config::Annualization;
pub use config::Bounds;
pub use config::Dispersion;
pub use config::Method;
pub use config::Metric;
pub use config::OptimizerConfig;
pub use config::StatisticsConfig;
pub use config::StatisticsOverrides;
pub use config::TimeFrame;
pub use error::PortfolioError;
pub use error::Result;
pub use portfolio::Portfolio;
pub use portfolio::PortfolioConfig;
pub use portfolio::PortfolioState;
pub use series::ReturnSeries;
pub use series::TimeSeries;
