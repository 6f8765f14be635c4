// services/fee/fee_service.rs

use crate::errors::SignError;
use crate::models::domain::{Fee, FeeBreakdown, FeeUnit};
use crate::services::chain::{ChainRules, FeeModel};
use crate::services::fee::fee_strategy::FeePreset;
use ethers_core::types::U256;

/// 原子交易每个签名折算的字节数
const ATOMIC_BYTES_PER_SIGNATURE: u64 = 1_000;
/// 原子交易固定开销
const ATOMIC_FIXED_OVERHEAD: u64 = 10_000;

/// P2WPKH vsize 估算：overhead 42 weight，每个输入 272，每个输出 124
const BTC_OVERHEAD_WEIGHT: u64 = 42;
const BTC_INPUT_WEIGHT: u64 = 272;
const BTC_OUTPUT_WEIGHT: u64 = 124;

/// 估算费用所需的交易形态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxShape {
    Evm {
        gas_limit: U256,
        /// 交易里给出的 gasPrice 或 maxFeePerGas
        explicit_price: Option<U256>,
        /// 链上 baseFee（explicit_price 缺失时使用）
        base_fee: Option<U256>,
    },
    AvalancheAtomic {
        base_fee: u64,
        tx_byte_length: u64,
        signature_count: u64,
    },
    AvalancheTransfer,
    Bitcoin {
        fee_rate: u64,
        inputs: u64,
        outputs: u64,
    },
    Solana {
        signature_count: u64,
    },
}

/// 费用计算服务（纯整数运算，无浮点风险，无 IO）
#[derive(Clone, Copy, Debug)]
pub struct FeeEstimator {
    preset: FeePreset,
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new(FeePreset::Normal)
    }
}

impl FeeEstimator {
    pub fn new(preset: FeePreset) -> Self {
        Self { preset }
    }

    pub fn preset(&self) -> FeePreset {
        self.preset
    }

    /// 核心方法：按链的费用模型计算总费用。
    /// 形态与链不匹配或任何一步溢出都返回 `FeeUnavailable`。
    pub fn estimate_fee(&self, rules: &ChainRules, shape: &TxShape) -> Result<Fee, SignError> {
        match (rules.fee_model, shape) {
            (
                FeeModel::EvmGas { .. },
                TxShape::Evm {
                    gas_limit,
                    explicit_price,
                    base_fee,
                },
            ) => self.evm_fee(*gas_limit, *explicit_price, *base_fee),

            (
                FeeModel::EvmGas { atomic: true },
                TxShape::AvalancheAtomic {
                    base_fee,
                    tx_byte_length,
                    signature_count,
                },
            ) => atomic_fee(*base_fee, *tx_byte_length, *signature_count),

            (FeeModel::AvalancheFixed { amount }, TxShape::AvalancheTransfer) => Ok(Fee {
                breakdown: FeeBreakdown::AvalancheFixed,
                total: U256::from(amount),
                unit: FeeUnit::NanoAvax,
            }),

            (
                FeeModel::BitcoinFeeRate,
                TxShape::Bitcoin {
                    fee_rate,
                    inputs,
                    outputs,
                },
            ) => bitcoin_fee(*fee_rate, *inputs, *outputs),

            (
                FeeModel::SolanaSignature {
                    lamports_per_signature,
                },
                TxShape::Solana { signature_count },
            ) => {
                let total = signature_count
                    .checked_mul(lamports_per_signature)
                    .ok_or_else(|| overflow("solana signature fee"))?;
                Ok(Fee {
                    breakdown: FeeBreakdown::SolanaSignatures {
                        signatures: *signature_count,
                        lamports_per_signature,
                    },
                    total: U256::from(total),
                    unit: FeeUnit::Lamport,
                })
            }

            (model, shape) => Err(SignError::FeeUnavailable(format!(
                "{:?} does not apply to {} ({:?})",
                shape, rules.chain, model
            ))),
        }
    }

    fn evm_fee(
        &self,
        gas_limit: U256,
        explicit_price: Option<U256>,
        base_fee: Option<U256>,
    ) -> Result<Fee, SignError> {
        // 1. 交易给出的价格优先
        let price_per_gas = match (explicit_price, base_fee) {
            (Some(price), _) => price,
            // 2. 否则按档位上浮 baseFee
            (None, Some(base_fee)) => {
                base_fee
                    .checked_mul(U256::from(self.preset.base_fee_buffer_percent()))
                    .ok_or_else(|| overflow("base fee buffer"))?
                    / U256::from(100)
            }
            (None, None) => {
                return Err(SignError::FeeUnavailable(
                    "no gas price and no base fee available".to_string(),
                ));
            }
        };

        let total = gas_limit
            .checked_mul(price_per_gas)
            .ok_or_else(|| overflow("gas limit × price"))?;

        Ok(Fee {
            breakdown: FeeBreakdown::EvmGas {
                gas_limit,
                price_per_gas,
            },
            total,
            unit: FeeUnit::Wei,
        })
    }
}

fn atomic_fee(base_fee: u64, tx_bytes: u64, signatures: u64) -> Result<Fee, SignError> {
    let units = signatures
        .checked_mul(ATOMIC_BYTES_PER_SIGNATURE)
        .and_then(|sig_bytes| sig_bytes.checked_add(tx_bytes))
        .and_then(|bytes| bytes.checked_add(ATOMIC_FIXED_OVERHEAD))
        .ok_or_else(|| overflow("atomic tx units"))?;
    let total = base_fee
        .checked_mul(units)
        .ok_or_else(|| overflow("atomic tx fee"))?;

    Ok(Fee {
        breakdown: FeeBreakdown::AvalancheAtomic {
            base_fee,
            tx_bytes,
            signatures,
        },
        total: U256::from(total),
        unit: FeeUnit::NanoAvax,
    })
}

/// vsize = ceil((42 + 272 × inputs + 124 × outputs) / 4)
pub fn bitcoin_vsize(inputs: u64, outputs: u64) -> Option<u64> {
    let weight = BTC_INPUT_WEIGHT
        .checked_mul(inputs)?
        .checked_add(BTC_OUTPUT_WEIGHT.checked_mul(outputs)?)?
        .checked_add(BTC_OVERHEAD_WEIGHT)?;
    Some(weight.div_ceil(4))
}

fn bitcoin_fee(fee_rate: u64, inputs: u64, outputs: u64) -> Result<Fee, SignError> {
    let vsize = bitcoin_vsize(inputs, outputs).ok_or_else(|| overflow("bitcoin vsize"))?;
    let total = fee_rate
        .checked_mul(vsize)
        .ok_or_else(|| overflow("bitcoin fee"))?;

    Ok(Fee {
        breakdown: FeeBreakdown::BitcoinRate { fee_rate, vsize },
        total: U256::from(total),
        unit: FeeUnit::Satoshi,
    })
}

fn overflow(what: &str) -> SignError {
    SignError::FeeUnavailable(format!("overflow while computing {}", what))
}
