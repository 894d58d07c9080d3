use clap::Parser;
use rust_decimal::Decimal;
use spreadbot::api::{ExchangeGateway, MexcClient};
use spreadbot::config::BotConfig;
use spreadbot::execution::{Feeder, PaperExchange, RetryPolicy, TradingCycle};
use spreadbot::notify::Notifier;
use spreadbot::persistence::ArtifactPaths;
use spreadbot::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Spread-driven resting order bot for a single MEXC spot pair
#[derive(Parser, Debug)]
#[command(name = "spreadbot", version)]
struct Args {
    /// TOML configuration file (defaults to ./spreadbot.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Do not serve the web dashboard from this process
    #[arg(long)]
    no_dashboard: bool,

    /// Trade against an in-memory account; candles still come from the exchange
    #[arg(long)]
    paper: bool,

    /// Initial quote balance of the paper account
    #[arg(long, default_value = "1000")]
    paper_balance: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let cfg = BotConfig::load(args.config.as_deref())?;

    tracing::info!("🚀 Spread bot starting");
    tracing::info!("  Symbol: {} ({})", cfg.symbol, cfg.interval);
    tracing::info!("  Check interval: {}s", cfg.check_interval_secs);
    tracing::info!("  Spread threshold: {}%", cfg.spread_threshold_pct);
    tracing::info!("  Mode: {}", if args.paper { "paper" } else { "live" });

    let paths = ArtifactPaths::for_run(&cfg.data_dir, Utc::now());
    paths.create_dirs()?;
    tracing::info!("  Run directory: {}", paths.run_dir().display());

    let feeder = build_feeder(&cfg, &args)?;
    let notifier = Notifier::from_config(&cfg)?;

    if cfg.dashboard.enabled && !args.no_dashboard {
        let bind = cfg.dashboard.bind.clone();
        let data_dir = cfg.data_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = spreadbot::dashboard::serve(&bind, data_dir).await {
                tracing::error!("Web server stopped: {}", e);
            }
        });
    }

    let interval = cfg.check_interval();
    let mut cycle = TradingCycle::new(cfg, feeder, paths, notifier);
    cycle.announce_start().await;

    loop {
        match cycle.run_once().await {
            Ok(report) => tracing::info!(
                candles = report.candles,
                reconciled = report.reconciled,
                "Cycle complete: strategy {}",
                report.choice.map(|c| c.as_str()).unwrap_or("none")
            ),
            Err(e) => tracing::error!("Main loop error: {}", e),
        }

        if args.once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    tracing::info!("👋 Spread bot stopped");
    Ok(())
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spreadbot=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Primary REST client, optional fallback, paper account on top when asked
fn build_feeder(cfg: &BotConfig, args: &Args) -> Result<Feeder> {
    let exchange = &cfg.exchange;
    let primary: Arc<dyn ExchangeGateway> = Arc::new(
        MexcClient::new(&exchange.base_url, &exchange.api_key, &exchange.api_secret)?
            .with_recv_window(exchange.recv_window_ms),
    );

    let mut feeder = if args.paper {
        tracing::info!("Paper account with {} {}", args.paper_balance, cfg.quote_asset);
        let paper = PaperExchange::new(&cfg.quote_asset, args.paper_balance).with_market(primary);
        Feeder::new(Arc::new(paper))
    } else {
        if exchange.api_key.is_empty() || exchange.api_secret.is_empty() {
            tracing::warn!("Exchange credentials missing; account calls will fail");
        }
        Feeder::new(primary)
    };

    if !args.paper {
        if let Some(url) = &exchange.fallback_base_url {
            tracing::info!("Fallback exchange endpoint: {}", url);
            let fallback = MexcClient::new(url, &exchange.api_key, &exchange.api_secret)?
                .with_recv_window(exchange.recv_window_ms);
            feeder = feeder.with_fallback(Arc::new(fallback));
        }
    }

    Ok(feeder.with_retry(RetryPolicy::from(&cfg.retry)))
}
