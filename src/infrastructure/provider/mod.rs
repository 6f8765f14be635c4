pub mod chain_provider;
pub mod retry_adapter;

pub use chain_provider::{BitcoinDraft, ChainProvider, JsonRpcChainProvider};
pub use retry_adapter::RetryAdapter;
