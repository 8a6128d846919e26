//! Delta Exchange client and the dry-run adapter built on it.

mod delta_client;
mod paper;
mod types;

pub use delta_client::{DeltaClient, DELTA_API_BASE};
pub use paper::PaperExchange;
