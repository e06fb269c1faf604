//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Asset statistics, portfolio performance and constrained weight
//! optimization.

pub mod data;
pub mod engine;
pub mod optimizers;
pub mod performance;
pub mod sqp;
pub mod statistics;
pub mod types;

pub use data::InMemoryPriceSource;
pub use data::PriceFrame;
pub use data::PriceSource;
pub use data::align_price_series;
pub use engine::Portfolio;
pub use engine::PortfolioConfig;
pub use engine::PortfolioState;
pub use optimizers::efficient_frontier;
pub use optimizers::frontier_targets;
pub use optimizers::maximize_sharpe;
pub use optimizers::minimize_dispersion;
pub use performance::evaluate;
pub use performance::neg_sharpe_ratio;
pub use performance::sharpe_ratio;
pub use statistics::compute_asset_statistics;
pub use statistics::statistics_from_returns;
pub use types::FrontierPoint;
pub use types::Optimized;
pub use types::Performance;
pub use types::StatisticsResult;
pub use types::WeightVector;
