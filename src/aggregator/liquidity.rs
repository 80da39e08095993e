use crate::models::TradeEvent;

/// Turns a window of trades into a liquidity figure in SOL.
///
/// The feed exposes no order-book depth, so every implementation is a proxy.
pub trait LiquidityEstimator: Send + Sync {
    fn name(&self) -> &'static str;

    fn estimate(&self, trades: &[TradeEvent]) -> f64;
}

/// Average SOL per trade scaled by a fixed multiplier.
#[derive(Debug, Clone, Copy)]
pub struct AverageTradeSizeEstimator {
    pub multiplier: f64,
}

impl AverageTradeSizeEstimator {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }
}

impl Default for AverageTradeSizeEstimator {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl LiquidityEstimator for AverageTradeSizeEstimator {
    fn name(&self) -> &'static str {
        "average_trade_size"
    }

    fn estimate(&self, trades: &[TradeEvent]) -> f64 {
        if trades.is_empty() {
            return 0.0;
        }
        let total: f64 = trades.iter().map(|t| t.sol_amount).sum();
        total / trades.len() as f64 * self.multiplier
    }
}
