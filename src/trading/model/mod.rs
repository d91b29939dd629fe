pub mod market;
pub mod strategy;
