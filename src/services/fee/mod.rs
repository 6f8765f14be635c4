pub mod fee_service;
pub mod fee_strategy;

pub use fee_service::{bitcoin_vsize, FeeEstimator, TxShape};
pub use fee_strategy::FeePreset;
