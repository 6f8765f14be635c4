// models/domain/transaction.rs

use crate::errors::SignError;
use crate::models::domain::chain::{ChainAlias, ChainId};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeeUnit {
    Wei,
    NanoAvax,
    Satoshi,
    Lamport,
}

impl FeeUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            FeeUnit::Wei => "wei",
            FeeUnit::NanoAvax => "nAVAX",
            FeeUnit::Satoshi => "sat",
            FeeUnit::Lamport => "lamports",
        }
    }
}

/// 各链费用的组成部分（用于审批展示和审计）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FeeBreakdown {
    EvmGas {
        gas_limit: U256,
        price_per_gas: U256,
    },
    AvalancheAtomic {
        base_fee: u64,
        tx_bytes: u64,
        signatures: u64,
    },
    AvalancheFixed,
    BitcoinRate {
        fee_rate: u64,
        vsize: u64,
    },
    SolanaSignatures {
        signatures: u64,
        lamports_per_signature: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fee {
    pub breakdown: FeeBreakdown,
    pub total: U256,
    pub unit: FeeUnit,
}

/// 每条链特有的交易字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TxBody {
    Evm {
        gas_limit: U256,
        gas_price: Option<U256>,
        max_fee_per_gas: Option<U256>,
        max_priority_fee_per_gas: Option<U256>,
    },
    Avalanche {
        alias: ChainAlias,
        tx_bytes: Bytes,
        external_indices: Vec<u32>,
        internal_indices: Vec<u32>,
        utxos: Vec<String>,
    },
    Bitcoin {
        amount_sat: u64,
        fee_rate: u64,
        unsigned_tx: Bytes,
        inputs: u64,
        outputs: u64,
    },
    Solana {
        serialized: Bytes,
    },
}

/// 规范化后的交易。只由 normalizer 构造，之后不可变；
/// 需要重新规范化时必须提交新的 SigningRequest。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedTransaction {
    pub(crate) chain: ChainId,
    pub(crate) from: String,
    pub(crate) to: Option<String>,
    pub(crate) value: Option<U256>,
    pub(crate) data: Option<Bytes>,
    pub(crate) fee: Fee,
    pub(crate) nonce: Option<u64>,
    pub(crate) body: TxBody,
}

impl NormalizedTransaction {
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    pub fn value(&self) -> Option<U256> {
        self.value
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.data.as_ref()
    }

    pub fn fee(&self) -> &Fee {
        &self.fee
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    pub fn body(&self) -> &TxBody {
        &self.body
    }

    /// EVM 交易转为 ethers 的 TypedTransaction；有 maxFeePerGas 时走 EIP-1559
    pub fn to_typed_transaction(&self) -> Result<TypedTransaction, SignError> {
        let ChainId::Evm(chain_id) = self.chain else {
            return Err(SignError::MalformedParams(format!(
                "{} is not an EVM chain",
                self.chain
            )));
        };
        let TxBody::Evm {
            gas_limit,
            gas_price,
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } = &self.body
        else {
            return Err(SignError::MalformedParams("not an EVM transaction".into()));
        };

        let from = parse_address(&self.from)?;
        let to = self.to.as_deref().map(parse_address).transpose()?;
        let value = self.value.unwrap_or_default();
        let data = self.data.clone().unwrap_or_default();

        let typed = match max_fee_per_gas {
            Some(max_fee) => {
                let mut req = Eip1559TransactionRequest::new()
                    .from(from)
                    .value(value)
                    .data(data)
                    .gas(*gas_limit)
                    .max_fee_per_gas(*max_fee)
                    .max_priority_fee_per_gas(max_priority_fee_per_gas.unwrap_or_default())
                    .chain_id(chain_id);
                if let Some(to) = to {
                    req = req.to(to);
                }
                if let Some(nonce) = self.nonce {
                    req = req.nonce(nonce);
                }
                TypedTransaction::Eip1559(req)
            }
            None => {
                let price = gas_price.unwrap_or_else(|| match &self.fee.breakdown {
                    FeeBreakdown::EvmGas { price_per_gas, .. } => *price_per_gas,
                    _ => U256::zero(),
                });
                let mut req = TransactionRequest::new()
                    .from(from)
                    .value(value)
                    .data(data)
                    .gas(*gas_limit)
                    .gas_price(price)
                    .chain_id(chain_id);
                if let Some(to) = to {
                    req = req.to(to);
                }
                if let Some(nonce) = self.nonce {
                    req = req.nonce(nonce);
                }
                TypedTransaction::Legacy(req)
            }
        };
        Ok(typed)
    }
}

fn parse_address(raw: &str) -> Result<Address, SignError> {
    raw.parse::<Address>()
        .map_err(|_| SignError::MalformedParams(format!("invalid EVM address: {}", raw)))
}
