//! Exit waterfall: liquidation preferences by seniority, per-class
//! convert-or-keep choices, participation, and cent-exact distribution.

mod election;
mod engine;
mod error;
mod model;
mod simulate;

pub use engine::{ClassOutcome, ExitDistribution, WaterfallEngine, WaterfallResult};
pub use error::{Result, WaterfallError};
