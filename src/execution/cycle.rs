use super::Feeder;
use crate::chart::write_chart;
use crate::config::BotConfig;
use crate::models::OpenOrder;
use crate::notify::{NotificationGate, Notifier};
use crate::persistence::{prune_candle_snapshots, read_order_log, write_candle_snapshot, ArtifactPaths};
use crate::strategy::{select_strategy_from_snapshot, StrategyChoice, StrategySet};
use crate::Result;
use chrono::Utc;
use std::fmt::Write;

/// One polling iteration: candles, snapshot, strategy, orders, chart, notify
pub struct TradingCycle {
    cfg: BotConfig,
    feeder: Feeder,
    strategies: StrategySet,
    paths: ArtifactPaths,
    notifier: Notifier,
    gate: NotificationGate,
}

/// Summary of a finished iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub candles: usize,
    pub choice: Option<StrategyChoice>,
    pub reconciled: bool,
    pub open_orders: Vec<OpenOrder>,
    pub chart_written: bool,
}

impl TradingCycle {
    pub fn new(cfg: BotConfig, feeder: Feeder, paths: ArtifactPaths, notifier: Notifier) -> Self {
        let gate = NotificationGate::load(&paths.gate_file());
        let strategies = StrategySet::from_config(&cfg);

        Self {
            cfg,
            feeder,
            strategies,
            paths,
            notifier,
            gate,
        }
    }

    pub fn gate(&self) -> NotificationGate {
        self.gate
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub async fn announce_start(&mut self) {
        let gate = self.notifier.notify_text(self.gate, "Bot started").await;
        self.update_gate(gate);
    }

    /// Run one iteration
    ///
    /// Missing candle data ends the iteration early with an empty report;
    /// only artifact write failures are returned as errors.
    pub async fn run_once(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        let candles = match self
            .feeder
            .fetch_candles(&self.cfg.symbol, &self.cfg.interval, self.cfg.candle_limit)
            .await
        {
            Ok(candles) if !candles.is_empty() => candles,
            Ok(_) => {
                tracing::error!("No valid candle data: empty response");
                return Ok(report);
            }
            Err(e) => {
                tracing::error!("No valid candle data: {}", e);
                return Ok(report);
            }
        };
        report.candles = candles.len();

        let klines_dir = self.paths.klines_dir();
        let snapshot = write_candle_snapshot(&klines_dir, &candles, Utc::now())?;
        if let Err(e) = prune_candle_snapshots(&klines_dir, self.cfg.snapshot_retention) {
            tracing::warn!("Failed to prune candle snapshots: {}", e);
        }

        report.choice = select_strategy_from_snapshot(&snapshot, self.cfg.spread_threshold_pct);
        match report.choice {
            Some(choice) => {
                report.reconciled = self
                    .strategies
                    .get(choice)
                    .reconcile(
                        &self.feeder,
                        &self.cfg.symbol,
                        &self.cfg.quote_asset,
                        &self.paths.order_log(),
                    )
                    .await;
            }
            None => tracing::info!("No strategy selected"),
        }

        let order_log = self.paths.order_log();
        if order_log.exists() {
            report.open_orders = read_order_log(&order_log)?.open_orders;
        }

        let chart = self.paths.chart();
        report.chart_written = write_chart(&chart, &self.cfg.symbol, &candles, &report.open_orders)?;

        let text = self.summary(&report);
        let mut gate = self.notifier.notify_text(self.gate, &text).await;
        if report.chart_written {
            gate = self.notifier.notify_document(gate, &chart, &self.cfg.symbol).await;
        }
        self.update_gate(gate);

        Ok(report)
    }

    fn summary(&self, report: &CycleReport) -> String {
        let mut text = format!("{} | {} candles\n", self.cfg.symbol, report.candles);
        match report.choice {
            Some(choice) => {
                let outcome = if report.reconciled { "ok" } else { "failed" };
                let _ = writeln!(text, "Strategy: {} ({})", choice, outcome);
            }
            None => text.push_str("Strategy: none\n"),
        }

        if report.open_orders.is_empty() {
            text.push_str("Open orders: none");
        } else {
            text.push_str("Open orders:");
            for order in &report.open_orders {
                let _ = write!(text, "\n  {} {} @ {}", order.side, order.quantity, order.price);
            }
        }
        text
    }

    fn update_gate(&mut self, gate: NotificationGate) {
        if gate == self.gate {
            return;
        }
        self.gate = gate;
        if let Err(e) = gate.save(&self.paths.gate_file()) {
            tracing::error!("Failed to persist notification gate: {}", e);
        }
    }
}
