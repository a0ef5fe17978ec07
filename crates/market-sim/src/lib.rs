//! Market Simulation: scenario loading, the market driver and run reports.

pub mod market;
pub mod results;
pub mod scenario;

pub use market::Market;
pub use results::{SellerReport, SimulationReport};
pub use scenario::MarketConfig;
