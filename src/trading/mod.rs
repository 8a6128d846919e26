//! Trading logic: condition evaluation, trade lifecycle, sizing, scheduling.

mod config;
mod engine;
mod evaluator;
mod execution;
mod lifecycle;
mod position_sizer;
mod scheduler;

pub use config::TradingConfig;
pub use engine::TradingEngine;
pub use execution::{ExecutionAdapter, OrderConfirmation, OrderRequest, OrderType, Ticker};
pub use scheduler::Scheduler;
