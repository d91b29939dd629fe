pub mod cache;
pub mod model;
pub mod strategy;
pub mod task;
