pub mod strategy_job;
