pub mod chain_router;

pub use chain_router::{ChainRouter, ChainRules, FeeModel};
