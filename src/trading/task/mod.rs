pub mod param_generator;
pub mod sweep_runner;
