use super::StrategyChoice;
use crate::api::AccountGateway;
use crate::config::{SizingTier, StrategyProfile};
use crate::models::{DesiredOrder, OpenOrder, Side};
use crate::persistence::write_order_log;
use crate::Result;
use rust_decimal::Decimal;
use std::path::Path;

/// Converges the resting buy orders for one symbol toward a sizing profile
///
/// One instance per strategy; the profiles differ only in order cap and
/// sizing tiers, the diff-and-replace algorithm is shared.
#[derive(Debug, Clone)]
pub struct Reconciler {
    choice: StrategyChoice,
    max_orders: usize,
    tiers: Vec<SizingTier>,
}

/// What a reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Orders believed open afterwards (also written to the order log)
    pub open_orders: Vec<OpenOrder>,
    pub total_capital: Decimal,
    pub cancelled: usize,
    pub placed: usize,
    pub skipped: usize,
    /// False when the book already matched and no calls were issued
    pub changed: bool,
}

impl Reconciler {
    pub fn new(choice: StrategyChoice, profile: &StrategyProfile) -> Self {
        Self {
            choice,
            max_orders: profile.max_orders,
            tiers: profile.tiers.clone(),
        }
    }

    pub fn choice(&self) -> StrategyChoice {
        self.choice
    }

    pub fn max_orders(&self) -> usize {
        self.max_orders
    }

    /// Buy orders the profile wants for `total_capital`, in placement order
    ///
    /// None when sizing a tier overflows.
    pub fn desired_orders(&self, total_capital: Decimal) -> Option<Vec<DesiredOrder>> {
        self.tiers
            .iter()
            .take(self.max_orders)
            .map(|tier| {
                let quantity = total_capital
                    .checked_mul(tier.capital_fraction)?
                    .checked_div(tier.price)?;
                Some(DesiredOrder {
                    side: Side::Buy,
                    quantity,
                    price: tier.price,
                })
            })
            .collect()
    }

    /// Run one pass, reporting success as a boolean
    ///
    /// Errors are logged here and never propagated; partial progress is kept
    /// and the next cycle reconciles from whatever is live by then.
    pub async fn reconcile<G>(&self, gateway: &G, symbol: &str, quote_asset: &str, order_log: &Path) -> bool
    where
        G: AccountGateway + ?Sized,
    {
        match self.try_reconcile(gateway, symbol, quote_asset, order_log).await {
            Ok(outcome) => {
                tracing::info!(
                    strategy = %self.choice,
                    cancelled = outcome.cancelled,
                    placed = outcome.placed,
                    skipped = outcome.skipped,
                    "Reconciliation finished with {} open orders",
                    outcome.open_orders.len()
                );
                true
            }
            Err(e) => {
                tracing::error!("Error in {} order management: {}", self.choice, e);
                false
            }
        }
    }

    pub async fn try_reconcile<G>(
        &self,
        gateway: &G,
        symbol: &str,
        quote_asset: &str,
        order_log: &Path,
    ) -> Result<ReconcileOutcome>
    where
        G: AccountGateway + ?Sized,
    {
        let mut open_orders = gateway.fetch_open_orders(symbol).await;
        let free = gateway.fetch_free_balance(quote_asset).await;

        let total_capital = open_orders
            .iter()
            .filter(|o| o.side == Side::Buy)
            .try_fold(free, |acc, o| acc.checked_add(o.notional()?))
            .ok_or("Total capital overflows")?;
        let desired = self
            .desired_orders(total_capital)
            .ok_or_else(|| format!("Order sizing overflows for capital {}", total_capital))?;

        let mut outcome = ReconcileOutcome {
            total_capital,
            ..Default::default()
        };

        // Cap first, keeping the prefix in exchange order
        if open_orders.len() > self.max_orders {
            tracing::info!("Max {} orders reached, canceling excess", self.max_orders);
            for order in open_orders.split_off(self.max_orders) {
                if gateway.cancel_order(symbol, &order.order_id).await {
                    outcome.cancelled += 1;
                }
            }
        }

        let mut current: Vec<Decimal> = open_orders
            .iter()
            .filter(|o| o.side == Side::Buy)
            .map(|o| o.quantity)
            .collect();
        let mut wanted: Vec<Decimal> = desired.iter().map(|d| d.quantity).collect();
        current.sort();
        wanted.sort();

        if current != wanted {
            outcome.changed = true;
            tracing::info!("Mismatched orders, canceling all");

            for order in open_orders.drain(..) {
                if gateway.cancel_order(symbol, &order.order_id).await {
                    outcome.cancelled += 1;
                }
            }

            let mut available = gateway.fetch_free_balance(quote_asset).await;
            for order in &desired {
                let cost = order
                    .quantity
                    .checked_mul(order.price)
                    .ok_or_else(|| format!("Order notional overflows: {} @ {}", order.quantity, order.price))?;
                if cost > available {
                    tracing::warn!(
                        "Insufficient {} for order: {} @ {} (available {})",
                        quote_asset,
                        order.quantity,
                        order.price,
                        available
                    );
                    outcome.skipped += 1;
                    continue;
                }

                match gateway
                    .place_order(symbol, order.side, order.quantity, order.price)
                    .await
                {
                    Some(order_id) => {
                        tracing::info!("Placed order {}: {} {} @ {}", order_id, order.side, order.quantity, order.price);
                        available -= cost;
                        outcome.placed += 1;
                        open_orders.push(OpenOrder {
                            order_id,
                            side: order.side,
                            quantity: order.quantity,
                            price: order.price,
                        });
                    }
                    None => {
                        tracing::warn!("Failed to place order: {} {} @ {}", order.side, order.quantity, order.price);
                    }
                }
            }
        } else {
            tracing::debug!("Open orders already match {} targets", self.choice);
        }

        write_order_log(order_log, &open_orders)?;
        outcome.open_orders = open_orders;
        Ok(outcome)
    }
}
