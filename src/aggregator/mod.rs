//! Periodic metric aggregation over persisted trades.

pub mod liquidity;
pub mod price;
pub mod trading;

pub use liquidity::{AverageTradeSizeEstimator, LiquidityEstimator};
pub use price::PriceAggregator;
pub use trading::TradingAggregator;

/// Per-tick outcome of an aggregation pass over the active tokens.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed
    }

    /// Counts one token's outcome and hands back its error, if any.
    pub(crate) fn record(&mut self, outcome: anyhow::Result<Outcome>) -> Option<anyhow::Error> {
        match outcome {
            Ok(Outcome::Written) => self.processed += 1,
            Ok(Outcome::NoTrades | Outcome::Deactivated) => self.skipped += 1,
            Err(e) => {
                self.failed += 1;
                return Some(e);
            }
        }
        None
    }
}

/// What happened to one token within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Written,
    NoTrades,
    Deactivated,
}
