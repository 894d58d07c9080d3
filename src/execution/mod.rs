// Exchange access, paper trading and the polling cycle
pub mod cycle;
pub mod feeder;
pub mod paper;
pub mod retry;

pub use cycle::{CycleReport, TradingCycle};
pub use feeder::Feeder;
pub use paper::PaperExchange;
pub use retry::RetryPolicy;
