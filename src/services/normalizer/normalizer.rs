// services/normalizer/normalizer.rs

use crate::errors::SignError;
use crate::infrastructure::provider::ChainProvider;
use crate::models::domain::chain::{AVALANCHE_C_FUJI, AVALANCHE_C_MAINNET};
use crate::models::domain::{
    AccountAction, ChainAlias, ChainId, Contact, MessageKind, MessagePayload, NormalizedRequest,
    NormalizedTransaction, RpcMethod, SignPayload, TxBody, WalletContext,
};
use crate::services::chain::{ChainRouter, ChainRules};
use crate::services::fee::{FeeEstimator, TxShape};
use crate::services::normalizer::params::{AvalancheTxParams, EvmTxParams, RpcParams};
use crate::services::signer::signing_input::solana_signature_slots;
use crate::utils::{bytes_to_hex, is_btc_address, is_evm_address, is_xp_address};
use crate::log_debug;
use ethers_core::types::U256;
use serde_json::Value;
use std::sync::Arc;

/// 1 nAVAX = 1 gwei
const WEI_PER_NAVAX: u64 = 1_000_000_000;

/// 原始位置参数 -> 强类型参数 -> 规范化负载（含费用）
pub struct TransactionNormalizer {
    router: ChainRouter,
    estimator: FeeEstimator,
    provider: Arc<dyn ChainProvider>,
}

impl TransactionNormalizer {
    pub fn new(router: ChainRouter, estimator: FeeEstimator, provider: Arc<dyn ChainProvider>) -> Self {
        Self {
            router,
            estimator,
            provider,
        }
    }

    pub fn router(&self) -> &ChainRouter {
        &self.router
    }

    /// `context` 只用于比特币草稿的找零地址（需要在审批前选好 UTXO）
    pub async fn normalize(
        &self,
        method: RpcMethod,
        raw_params: &Value,
        rules: &ChainRules,
        context: Option<&WalletContext>,
    ) -> Result<NormalizedRequest, SignError> {
        let params = RpcParams::parse(method, raw_params)?;
        log_debug!("normalizing {} on {}", method, rules.chain);

        let message = |kind: MessageKind, from: String, data: Value| {
            NormalizedRequest::Sign(SignPayload::Message(MessagePayload {
                kind,
                chain: rules.chain,
                from,
                data,
                password: None,
                account_index: None,
            }))
        };

        let normalized = match params {
            RpcParams::PersonalSign {
                data,
                from,
                password,
            } => NormalizedRequest::Sign(SignPayload::Message(MessagePayload {
                kind: MessageKind::PersonalSign,
                chain: rules.chain,
                from,
                data: Value::String(data),
                password,
                account_index: None,
            })),
            RpcParams::EthSign { from, data } => {
                message(MessageKind::EthSign, from, Value::String(data))
            }
            RpcParams::SignTypedData {
                version,
                from,
                typed_data,
            } => message(MessageKind::TypedData(version), from, typed_data),
            RpcParams::EthSendTransaction(tx) => self.normalize_evm_tx(rules, tx).await?,
            RpcParams::AvalancheTransaction(tx) => self.normalize_avalanche_tx(rules, tx).await?,
            RpcParams::AvalancheSignMessage {
                message,
                account_index,
            } => NormalizedRequest::Sign(SignPayload::Message(MessagePayload {
                kind: MessageKind::Avalanche,
                chain: rules.chain,
                from: String::new(),
                data: Value::String(message),
                password: None,
                account_index,
            })),
            RpcParams::GetAccounts => NormalizedRequest::Account(AccountAction::GetAccounts),
            RpcParams::SelectAccount { index } => {
                NormalizedRequest::Account(AccountAction::SelectAccount(index))
            }
            RpcParams::CreateContact(contact) => {
                validate_contact(&contact, !rules.chain.is_testnet())?;
                NormalizedRequest::Account(AccountAction::CreateContact(contact))
            }
            RpcParams::BitcoinSend {
                to,
                amount_sat,
                fee_rate,
            } => self.normalize_bitcoin_send(rules, context, to, amount_sat, fee_rate).await?,
            RpcParams::SolanaSignMessage { account, message: bytes } => {
                message(MessageKind::Solana, account, Value::String(bytes_to_hex(&bytes)))
            }
            RpcParams::SolanaSignTransaction {
                account,
                transaction,
            } => {
                let (signature_count, _) = solana_signature_slots(&transaction)?;
                let fee = self.estimator.estimate_fee(
                    rules,
                    &TxShape::Solana {
                        signature_count: signature_count as u64,
                    },
                )?;
                transaction_request(NormalizedTransaction {
                    chain: rules.chain,
                    from: account,
                    to: None,
                    value: None,
                    data: None,
                    fee,
                    nonce: None,
                    body: TxBody::Solana {
                        serialized: transaction,
                    },
                })
            }
        };
        Ok(normalized)
    }

    async fn normalize_evm_tx(
        &self,
        rules: &ChainRules,
        tx: EvmTxParams,
    ) -> Result<NormalizedRequest, SignError> {
        if !is_evm_address(&tx.from) {
            return Err(SignError::MalformedParams(format!("invalid from address: {}", tx.from)));
        }
        if let Some(to) = tx.to.as_deref().filter(|to| !is_evm_address(to)) {
            return Err(SignError::MalformedParams(format!("invalid to address: {}", to)));
        }

        // 1. 交易给了价格就用交易的，否则取链上 baseFee 按档位上浮
        let explicit_price = tx.max_fee_per_gas.or(tx.gas_price);
        let base_fee = match explicit_price {
            Some(_) => None,
            None => Some(
                self.provider
                    .base_fee(rules.chain)
                    .await
                    .map_err(fee_unavailable)?,
            ),
        };
        let fee = self.estimator.estimate_fee(
            rules,
            &TxShape::Evm {
                gas_limit: tx.gas,
                explicit_price,
                base_fee,
            },
        )?;

        // 2. nonce 缺省时取 pending nonce
        let nonce = match tx.nonce {
            Some(nonce) => nonce,
            None => self.provider.transaction_count(rules.chain, &tx.from).await?,
        };

        Ok(transaction_request(NormalizedTransaction {
            chain: rules.chain,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            data: tx.data,
            fee,
            nonce: Some(nonce),
            body: TxBody::Evm {
                gas_limit: tx.gas,
                gas_price: tx.gas_price,
                max_fee_per_gas: tx.max_fee_per_gas,
                max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
            },
        }))
    }

    async fn normalize_avalanche_tx(
        &self,
        rules: &ChainRules,
        tx: AvalancheTxParams,
    ) -> Result<NormalizedRequest, SignError> {
        // chainAlias 决定真正的目标链，网络（主网 / Fuji）跟随请求所在链
        let testnet = rules.chain.is_testnet();
        let chain = match tx.alias {
            ChainAlias::X => ChainId::AvalancheX { testnet },
            ChainAlias::P => ChainId::AvalancheP { testnet },
            ChainAlias::C => ChainId::Evm(if testnet { AVALANCHE_C_FUJI } else { AVALANCHE_C_MAINNET }),
        };
        let tx_rules = self.router.rules_for(chain)?;

        let shape = match tx.alias {
            ChainAlias::C => {
                let base_fee_wei = self
                    .provider
                    .base_fee(chain)
                    .await
                    .map_err(fee_unavailable)?;
                let signature_count = (tx.external_indices.len() + tx.internal_indices.len()).max(1);
                TxShape::AvalancheAtomic {
                    base_fee: wei_to_navax(base_fee_wei)?,
                    tx_byte_length: tx.tx_bytes.len() as u64,
                    signature_count: signature_count as u64,
                }
            }
            ChainAlias::X | ChainAlias::P => TxShape::AvalancheTransfer,
        };
        let fee = self.estimator.estimate_fee(&tx_rules, &shape)?;

        Ok(transaction_request(NormalizedTransaction {
            chain,
            from: String::new(),
            to: None,
            value: None,
            data: None,
            fee,
            nonce: None,
            body: TxBody::Avalanche {
                alias: tx.alias,
                tx_bytes: tx.tx_bytes,
                external_indices: tx.external_indices,
                internal_indices: tx.internal_indices,
                utxos: tx.utxos,
            },
        }))
    }

    async fn normalize_bitcoin_send(
        &self,
        rules: &ChainRules,
        context: Option<&WalletContext>,
        to: String,
        amount_sat: u64,
        fee_rate: u64,
    ) -> Result<NormalizedRequest, SignError> {
        let mainnet = !rules.chain.is_testnet();
        if !is_btc_address(&to, mainnet) {
            return Err(SignError::MalformedParams(format!("invalid bitcoin address: {}", to)));
        }
        if fee_rate == 0 {
            return Err(SignError::MalformedParams("feeRate must be positive".into()));
        }
        let from = context
            .and_then(|ctx| ctx.active_account())
            .and_then(|account| account.address_for(rules.vm))
            .ok_or_else(|| SignError::MalformedParams("no active bitcoin account".into()))?
            .to_string();

        let draft = self
            .provider
            .prepare_bitcoin_send(rules.chain, &from, &to, amount_sat, fee_rate)
            .await?;
        let fee = self.estimator.estimate_fee(
            rules,
            &TxShape::Bitcoin {
                fee_rate,
                inputs: draft.inputs,
                outputs: draft.outputs,
            },
        )?;

        Ok(transaction_request(NormalizedTransaction {
            chain: rules.chain,
            from,
            to: Some(to),
            value: Some(U256::from(amount_sat)),
            data: None,
            fee,
            nonce: None,
            body: TxBody::Bitcoin {
                amount_sat,
                fee_rate,
                unsigned_tx: draft.unsigned_tx,
                inputs: draft.inputs,
                outputs: draft.outputs,
            },
        }))
    }
}

fn transaction_request(tx: NormalizedTransaction) -> NormalizedRequest {
    NormalizedRequest::Sign(SignPayload::Transaction(tx))
}

fn fee_unavailable(err: SignError) -> SignError {
    match err {
        SignError::FeeUnavailable(_) => err,
        other => SignError::FeeUnavailable(other.to_string()),
    }
}

/// 向上取整
fn wei_to_navax(wei: U256) -> Result<u64, SignError> {
    let navax = wei.div_mod(U256::from(WEI_PER_NAVAX));
    let rounded = if navax.1.is_zero() { navax.0 } else { navax.0 + 1 };
    if rounded > U256::from(u64::MAX) {
        return Err(SignError::FeeUnavailable(format!("base fee {} out of range", wei)));
    }
    Ok(rounded.as_u64())
}

fn validate_contact(contact: &Contact, mainnet: bool) -> Result<(), SignError> {
    let invalid = |field: &str, value: &str| {
        SignError::MalformedParams(format!("contact {} is not a valid address: {}", field, value))
    };
    if let Some(address) = contact.address.as_deref().filter(|a| !is_evm_address(a)) {
        return Err(invalid("address", address));
    }
    if let Some(address) = contact.address_xp.as_deref().filter(|a| !is_xp_address(a)) {
        return Err(invalid("addressXP", address));
    }
    if let Some(address) = contact
        .address_btc
        .as_deref()
        .filter(|a| !is_btc_address(a, mainnet))
    {
        return Err(invalid("addressBTC", address));
    }
    Ok(())
}
