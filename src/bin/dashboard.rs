// Standalone read-only dashboard over a bot's data directory
use clap::Parser;
use spreadbot::config::BotConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dashboard", version, about = "Serve the spread bot dashboard")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the configured data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("spreadbot=info,dashboard=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let cfg = BotConfig::load(args.config.as_deref())?;

    let bind = args.bind.unwrap_or(cfg.dashboard.bind);
    let data_dir = args.data_dir.unwrap_or(cfg.data_dir);
    tracing::info!("Serving artifacts from {}", data_dir.display());

    tokio::select! {
        result = spreadbot::dashboard::serve(&bind, data_dir) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}
