use crate::errors::AppError;
use crate::services::fee::FeePreset;
use config::{ConfigError, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub mpc: MpcConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// 审批截止时间（0 表示不设截止，一直等 UI 决定）
#[derive(Debug, Deserialize, Clone)]
pub struct ApprovalConfig {
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

impl ApprovalConfig {
    pub fn deadline(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeeConfig {
    /// 没有 gasPrice 时 baseFee 的上浮档位
    pub evm_preset: FeePreset,
    pub avalanche_x_fee_navax: u64,
    pub avalanche_p_fee_navax: u64,
    pub solana_lamports_per_signature: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            evm_preset: FeePreset::Normal,
            avalanche_x_fee_navax: 1_000_000,
            avalanche_p_fee_navax: 1_000_000,
            solana_lamports_per_signature: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainsConfig {
    /// 支持的 EVM 链（含 Avalanche C-chain）
    pub evm_chain_ids: Vec<u64>,
    /// 开发者模式：X / P / C 别名解析到 Fuji，比特币走 testnet
    pub developer_mode: bool,
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            evm_chain_ids: vec![1, 43114, 43113],
            developer_mode: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HardwareConfig {
    /// 单轮设备往返的超时（包含用户在设备上确认的时间）
    pub round_timeout_secs: u64,
    /// APDU 单帧最大负载
    pub max_chunk_size: usize,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            round_timeout_secs: 120,
            max_chunk_size: 255,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MpcConfig {
    pub endpoint: String,
    /// 网络错误的重试次数（1 = 不重试）
    pub max_retries: usize,
    pub base_delay_millis: u64,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8788".to_string(),
            max_retries: 3,
            base_delay_millis: 250,
        }
    }
}

/// key 为链标识（例如 `eip155:43114`、`avax:X`），value 为 JSON-RPC 地址
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RpcConfig {
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub key_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_dir: "keys".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        config::Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(config::Environment::with_prefix("SIGNING").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        config::Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// 启动前检查：RPC / MPC 地址必须是合法 URL
    pub fn validate(&self) -> Result<(), AppError> {
        Url::parse(&self.mpc.endpoint)
            .map_err(|e| AppError::InvalidUrl(format!("mpc.endpoint {}: {}", self.mpc.endpoint, e)))?;
        for (chain, endpoint) in &self.rpc.endpoints {
            Url::parse(endpoint)
                .map_err(|e| AppError::InvalidUrl(format!("rpc.endpoints.{} {}: {}", chain, endpoint, e)))?;
        }
        if self.hardware.max_chunk_size == 0 {
            return Err(AppError::Internal("hardware.max_chunk_size must be > 0".into()));
        }
        Ok(())
    }
}
