pub mod config;

pub use config::{
    ApprovalConfig, ChainsConfig, Config, FeeConfig, HardwareConfig, MpcConfig, RpcConfig,
    StorageConfig,
};
