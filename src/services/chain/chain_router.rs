// services/chain/chain_router.rs

use crate::config::{ChainsConfig, FeeConfig};
use crate::errors::SignError;
use crate::models::domain::chain::{AVALANCHE_C_FUJI, AVALANCHE_C_MAINNET};
use crate::models::domain::request::MethodScope;
use crate::models::domain::{ChainAlias, ChainId, RpcMethod, SolanaCluster, VmType};
use std::collections::HashSet;

const BTC_MAINNET_GENESIS: &str = "000000000019d6689c085ae165831e93";
const BTC_TESTNET_GENESIS: &str = "000000000933ea01ad0ee984209779ba";
const SOLANA_MAINNET_GENESIS: &str = "5eykt4usfv8p8njdtrepy1vzqkqzkvdp";
const SOLANA_DEVNET_GENESIS: &str = "etwtrabzayq6imfeykouru166vu2xqa1";
const SOLANA_TESTNET_GENESIS: &str = "4uhcvjyu9pjkvqys88urdiswhxscky3z";

/// 链的费用模型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeModel {
    /// gasLimit × 价格；Avalanche C-chain 另外接受原子交易
    EvmGas { atomic: bool },
    /// X / P 链固定费用（nAVAX）
    AvalancheFixed { amount: u64 },
    BitcoinFeeRate,
    SolanaSignature { lamports_per_signature: u64 },
}

/// 某条链的编码与费用规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRules {
    pub chain: ChainId,
    pub vm: VmType,
    pub fee_model: FeeModel,
}

/// 链标识解析与规则选择（纯函数，无 IO）
#[derive(Debug, Clone)]
pub struct ChainRouter {
    evm_chain_ids: HashSet<u64>,
    developer_mode: bool,
    x_fee_navax: u64,
    p_fee_navax: u64,
    lamports_per_signature: u64,
}

impl ChainRouter {
    pub fn new(chains: &ChainsConfig, fees: &FeeConfig) -> Self {
        Self {
            evm_chain_ids: chains.evm_chain_ids.iter().copied().collect(),
            developer_mode: chains.developer_mode,
            x_fee_navax: fees.avalanche_x_fee_navax,
            p_fee_navax: fees.avalanche_p_fee_navax,
            lamports_per_signature: fees.solana_lamports_per_signature,
        }
    }

    /// 原始链标识 -> 规则；无法识别或未启用的链返回 `UnknownChain`
    pub fn resolve(&self, raw: &str) -> Result<ChainRules, SignError> {
        let chain = self.parse_chain_id(raw)?;
        self.rules_for(chain)
    }

    pub fn rules_for(&self, chain: ChainId) -> Result<ChainRules, SignError> {
        let fee_model = match chain {
            ChainId::Evm(id) => {
                if !self.evm_chain_ids.contains(&id) {
                    return Err(SignError::UnknownChain(chain.to_string()));
                }
                FeeModel::EvmGas {
                    atomic: chain.is_avalanche_c(),
                }
            }
            ChainId::AvalancheX { .. } => FeeModel::AvalancheFixed {
                amount: self.x_fee_navax,
            },
            ChainId::AvalancheP { .. } => FeeModel::AvalancheFixed {
                amount: self.p_fee_navax,
            },
            ChainId::Bitcoin { .. } => FeeModel::BitcoinFeeRate,
            ChainId::Solana { .. } => FeeModel::SolanaSignature {
                lamports_per_signature: self.lamports_per_signature,
            },
        };
        Ok(ChainRules {
            chain,
            vm: chain.vm(),
            fee_model,
        })
    }

    /// X / P / C 别名在开发者模式下落到 Fuji
    pub fn alias_chain(&self, alias: ChainAlias) -> ChainId {
        let testnet = self.developer_mode;
        match alias {
            ChainAlias::X => ChainId::AvalancheX { testnet },
            ChainAlias::P => ChainId::AvalancheP { testnet },
            ChainAlias::C => ChainId::Evm(if testnet { AVALANCHE_C_FUJI } else { AVALANCHE_C_MAINNET }),
        }
    }

    /// 方法必须和链所在的 VM 匹配，否则视为不支持的方法
    pub fn check_method(&self, method: RpcMethod, rules: &ChainRules) -> Result<(), SignError> {
        let supported = match method.scope() {
            MethodScope::Evm => rules.vm == VmType::Evm,
            MethodScope::Avalanche => rules.chain.is_avalanche(),
            MethodScope::Bitcoin => rules.vm == VmType::Bitcoin,
            MethodScope::Solana => rules.vm == VmType::Svm,
            MethodScope::Any => true,
        };
        if supported {
            Ok(())
        } else {
            Err(SignError::UnsupportedMethod(format!("{} on {}", method, rules.chain)))
        }
    }

    pub fn parse_chain_id(&self, raw: &str) -> Result<ChainId, SignError> {
        let unknown = || SignError::UnknownChain(raw.to_string());
        let trimmed = raw.trim();
        let (namespace, reference) = match trimmed.split_once(':') {
            Some((ns, rest)) => (ns.to_ascii_lowercase(), rest),
            None => (String::new(), trimmed),
        };

        match namespace.as_str() {
            "eip155" => parse_numeric(reference).map(ChainId::Evm).ok_or_else(unknown),
            "avax" | "avalanche" => {
                let (alias, network) = match reference.split_once(':') {
                    Some((alias, network)) => (alias, Some(network)),
                    None => (reference, None),
                };
                let alias = ChainAlias::parse(alias).ok_or_else(unknown)?;
                let testnet = match network.map(str::to_ascii_lowercase).as_deref() {
                    None => self.developer_mode,
                    Some("fuji") | Some("testnet") => true,
                    Some("mainnet") => false,
                    Some(_) => return Err(unknown()),
                };
                Ok(match alias {
                    ChainAlias::X => ChainId::AvalancheX { testnet },
                    ChainAlias::P => ChainId::AvalancheP { testnet },
                    ChainAlias::C => ChainId::Evm(if testnet { AVALANCHE_C_FUJI } else { AVALANCHE_C_MAINNET }),
                })
            }
            "bip122" => match reference.to_ascii_lowercase().as_str() {
                BTC_MAINNET_GENESIS => Ok(ChainId::Bitcoin { testnet: false }),
                BTC_TESTNET_GENESIS => Ok(ChainId::Bitcoin { testnet: true }),
                _ => Err(unknown()),
            },
            "bitcoin" => match reference.to_ascii_lowercase().as_str() {
                "mainnet" => Ok(ChainId::Bitcoin { testnet: false }),
                "testnet" => Ok(ChainId::Bitcoin { testnet: true }),
                _ => Err(unknown()),
            },
            "solana" => {
                let cluster = match reference.to_ascii_lowercase().as_str() {
                    "mainnet" | SOLANA_MAINNET_GENESIS => SolanaCluster::Mainnet,
                    "devnet" | SOLANA_DEVNET_GENESIS => SolanaCluster::Devnet,
                    "testnet" | SOLANA_TESTNET_GENESIS => SolanaCluster::Testnet,
                    _ => return Err(unknown()),
                };
                Ok(ChainId::Solana { cluster })
            }
            // 无命名空间：数字 id、X/P/C 别名或链名
            "" => {
                if let Some(id) = parse_numeric(reference) {
                    return Ok(ChainId::Evm(id));
                }
                if let Some(alias) = ChainAlias::parse(reference) {
                    return Ok(self.alias_chain(alias));
                }
                match reference.to_ascii_lowercase().as_str() {
                    "bitcoin" => Ok(ChainId::Bitcoin {
                        testnet: self.developer_mode,
                    }),
                    "solana" => Ok(ChainId::Solana {
                        cluster: if self.developer_mode {
                            SolanaCluster::Devnet
                        } else {
                            SolanaCluster::Mainnet
                        },
                    }),
                    _ => Err(unknown()),
                }
            }
            _ => Err(unknown()),
        }
    }
}

fn parse_numeric(raw: &str) -> Option<u64> {
    match raw.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse::<u64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(developer_mode: bool) -> ChainRouter {
        ChainRouter::new(
            &ChainsConfig {
                evm_chain_ids: vec![1, 43114, 43113],
                developer_mode,
            },
            &FeeConfig::default(),
        )
    }

    #[test]
    fn resolves_every_namespace() {
        let r = router(false);
        assert_eq!(r.parse_chain_id("eip155:1").unwrap(), ChainId::Evm(1));
        assert_eq!(r.parse_chain_id("0xa86a").unwrap(), ChainId::Evm(43114));
        assert_eq!(r.parse_chain_id("43114").unwrap(), ChainId::Evm(43114));
        assert_eq!(r.parse_chain_id("C").unwrap(), ChainId::Evm(43114));
        assert_eq!(
            r.parse_chain_id("avax:X").unwrap(),
            ChainId::AvalancheX { testnet: false }
        );
        assert_eq!(
            r.parse_chain_id("avax:P:fuji").unwrap(),
            ChainId::AvalancheP { testnet: true }
        );
        assert_eq!(
            r.parse_chain_id("bip122:000000000019d6689c085ae165831e93").unwrap(),
            ChainId::Bitcoin { testnet: false }
        );
        assert_eq!(
            r.parse_chain_id("solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp").unwrap(),
            ChainId::Solana {
                cluster: SolanaCluster::Mainnet
            }
        );
        assert!(r.parse_chain_id("cosmos:cosmoshub-4").is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let r = router(false);
        for chain in [
            ChainId::Evm(43113),
            ChainId::AvalancheX { testnet: true },
            ChainId::AvalancheP { testnet: false },
            ChainId::Bitcoin { testnet: true },
            ChainId::Solana {
                cluster: SolanaCluster::Devnet,
            },
        ] {
            assert_eq!(r.parse_chain_id(&chain.to_string()).unwrap(), chain);
        }
    }

    #[test]
    fn developer_mode_moves_aliases_to_fuji() {
        let r = router(true);
        assert_eq!(r.parse_chain_id("C").unwrap(), ChainId::Evm(43113));
        assert_eq!(
            r.parse_chain_id("P").unwrap(),
            ChainId::AvalancheP { testnet: true }
        );
    }

    #[test]
    fn unsupported_evm_chain_is_unknown() {
        let r = router(false);
        assert!(matches!(r.resolve("eip155:56"), Err(SignError::UnknownChain(_))));
    }

    #[test]
    fn method_must_match_vm() {
        let r = router(false);
        let btc = r.resolve("bitcoin:mainnet").unwrap();
        let cchain = r.resolve("eip155:43114").unwrap();
        let eth = r.resolve("eip155:1").unwrap();
        assert!(r.check_method(RpcMethod::PersonalSign, &btc).is_err());
        assert!(r.check_method(RpcMethod::BitcoinSendTransaction, &btc).is_ok());
        assert!(r.check_method(RpcMethod::AvalancheSendTransaction, &cchain).is_ok());
        assert!(r.check_method(RpcMethod::AvalancheSendTransaction, &eth).is_err());
        assert!(r.check_method(RpcMethod::AvalancheGetAccounts, &btc).is_ok());
        assert_eq!(cchain.fee_model, FeeModel::EvmGas { atomic: true });
    }
}
