// models/domain/chain.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub const AVALANCHE_C_MAINNET: u64 = 43114;
pub const AVALANCHE_C_FUJI: u64 = 43113;

/// 虚拟机地址空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmType {
    Evm,
    /// Avalanche X-chain
    Avm,
    /// Avalanche P-chain
    Pvm,
    Bitcoin,
    /// Solana
    Svm,
}

impl VmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmType::Evm => "evm",
            VmType::Avm => "avm",
            VmType::Pvm => "pvm",
            VmType::Bitcoin => "btc",
            VmType::Svm => "svm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolanaCluster {
    Mainnet,
    Devnet,
    Testnet,
}

/// Avalanche 链别名（`chainAlias` 参数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainAlias {
    X,
    P,
    C,
}

impl ChainAlias {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "X" | "x" => Some(ChainAlias::X),
            "P" | "p" => Some(ChainAlias::P),
            "C" | "c" => Some(ChainAlias::C),
            _ => None,
        }
    }
}

/// 规范化后的链标识。C-chain 就是 EVM 链 43114 / 43113。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainId {
    Evm(u64),
    AvalancheX { testnet: bool },
    AvalancheP { testnet: bool },
    Bitcoin { testnet: bool },
    Solana { cluster: SolanaCluster },
}

impl ChainId {
    pub fn vm(&self) -> VmType {
        match self {
            ChainId::Evm(_) => VmType::Evm,
            ChainId::AvalancheX { .. } => VmType::Avm,
            ChainId::AvalancheP { .. } => VmType::Pvm,
            ChainId::Bitcoin { .. } => VmType::Bitcoin,
            ChainId::Solana { .. } => VmType::Svm,
        }
    }

    pub fn is_avalanche_c(&self) -> bool {
        matches!(self, ChainId::Evm(AVALANCHE_C_MAINNET) | ChainId::Evm(AVALANCHE_C_FUJI))
    }

    /// X / P / C 链都属于 Avalanche 主网族
    pub fn is_avalanche(&self) -> bool {
        self.is_avalanche_c()
            || matches!(self, ChainId::AvalancheX { .. } | ChainId::AvalancheP { .. })
    }

    /// 主币符号（C-chain 的 gas 以 AVAX 计）
    pub fn native_symbol(&self) -> &'static str {
        match self {
            ChainId::Evm(_) if self.is_avalanche_c() => "AVAX",
            ChainId::Evm(_) => "ETH",
            ChainId::AvalancheX { .. } | ChainId::AvalancheP { .. } => "AVAX",
            ChainId::Bitcoin { .. } => "BTC",
            ChainId::Solana { .. } => "SOL",
        }
    }

    pub fn is_testnet(&self) -> bool {
        match self {
            ChainId::Evm(id) => *id == AVALANCHE_C_FUJI,
            ChainId::AvalancheX { testnet }
            | ChainId::AvalancheP { testnet }
            | ChainId::Bitcoin { testnet } => *testnet,
            ChainId::Solana { cluster } => *cluster != SolanaCluster::Mainnet,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "eip155:{}", id),
            ChainId::AvalancheX { testnet } => {
                write!(f, "avax:X{}", if *testnet { ":fuji" } else { "" })
            }
            ChainId::AvalancheP { testnet } => {
                write!(f, "avax:P{}", if *testnet { ":fuji" } else { "" })
            }
            ChainId::Bitcoin { testnet } => {
                write!(f, "bitcoin:{}", if *testnet { "testnet" } else { "mainnet" })
            }
            ChainId::Solana { cluster } => {
                let name = match cluster {
                    SolanaCluster::Mainnet => "mainnet",
                    SolanaCluster::Devnet => "devnet",
                    SolanaCluster::Testnet => "testnet",
                };
                write!(f, "solana:{}", name)
            }
        }
    }
}
