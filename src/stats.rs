//! # Stats
//!
//! $$
//! \hat\sigma_{\text{MAD}} = 1.4826\,\operatorname{med}_t\lvert x_t-\operatorname{med}(x)\rvert
//! $$
//!
//! Robust and normal-theory estimators, plus the single-asset diagnostics
//! run before an asset enters a portfolio.

pub mod acf;
pub mod preassess;
pub mod robust;
