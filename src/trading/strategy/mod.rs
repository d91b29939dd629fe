pub mod dca_strategy;
pub mod performance;
