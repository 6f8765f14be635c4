pub mod display;
pub mod normalizer;
pub mod params;

pub use display::build_display;
pub use normalizer::TransactionNormalizer;
pub use params::{AvalancheTxParams, EvmTxParams, RpcParams};
