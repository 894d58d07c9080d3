// Core modules
pub mod api;
pub mod chart;
pub mod config;
pub mod dashboard;
pub mod execution;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use api::{AccountGateway, ExchangeGateway, GatewayError};
pub use config::BotConfig;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
