// Strategy selection and order reconciliation
pub mod reconciler;
pub mod selector;

pub use reconciler::{ReconcileOutcome, Reconciler};
pub use selector::{select_strategy, select_strategy_from_snapshot, spread_pct, StrategyChoice};

use crate::config::BotConfig;

/// One reconciler per strategy, built from the configured profiles
#[derive(Debug, Clone)]
pub struct StrategySet {
    high_spread: Reconciler,
    low_spread: Reconciler,
}

impl StrategySet {
    pub fn from_config(cfg: &BotConfig) -> Self {
        Self {
            high_spread: Reconciler::new(StrategyChoice::HighSpread, &cfg.high_spread),
            low_spread: Reconciler::new(StrategyChoice::LowSpread, &cfg.low_spread),
        }
    }

    pub fn get(&self, choice: StrategyChoice) -> &Reconciler {
        match choice {
            StrategyChoice::HighSpread => &self.high_spread,
            StrategyChoice::LowSpread => &self.low_spread,
        }
    }
}
