use crate::config::RpcConfig;
use crate::errors::{AppError, SignError};
use crate::infrastructure::provider::retry_adapter::RetryAdapter;
use crate::models::domain::{ChainAlias, ChainId, NormalizedTransaction, SignedPayload, TxBody};
use crate::utils::bytes_to_hex;
use crate::{log_info, log_warn};
use async_trait::async_trait;
use ethers_core::types::{Address, BlockNumber, Bytes, U256};
use ethers_providers::{Http, Middleware, Provider, ProviderError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// 比特币交易草稿（UTXO 已选好，未签名）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinDraft {
    pub unsigned_tx: Bytes,
    pub inputs: u64,
    pub outputs: u64,
}

/// 链上协作方：费用预言机、nonce、比特币草稿、广播
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// EVM 链的 baseFee（wei）；C-chain 同样以 wei 返回
    async fn base_fee(&self, chain: ChainId) -> Result<U256, SignError>;

    async fn transaction_count(&self, chain: ChainId, address: &str) -> Result<u64, SignError>;

    async fn prepare_bitcoin_send(
        &self,
        chain: ChainId,
        from: &str,
        to: &str,
        amount_sat: u64,
        fee_rate: u64,
    ) -> Result<BitcoinDraft, SignError>;

    /// 广播已签名交易，返回交易哈希 / txID
    async fn broadcast(
        &self,
        tx: &NormalizedTransaction,
        signed: &SignedPayload,
    ) -> Result<String, SignError>;
}

impl From<ProviderError> for SignError {
    fn from(err: ProviderError) -> Self {
        SignError::NetworkError(err.to_string())
    }
}

/// 按链标识配置的 JSON-RPC 节点集合
pub struct JsonRpcChainProvider {
    /// key 统一小写（config 的 key 可能被转成小写）
    providers: HashMap<String, Arc<Provider<Http>>>,
    retry: RetryAdapter,
}

impl JsonRpcChainProvider {
    pub fn new(config: &RpcConfig) -> Result<Self, AppError> {
        let mut providers = HashMap::new();
        for (chain, endpoint) in &config.endpoints {
            let url = Url::parse(endpoint)
                .map_err(|e| AppError::InvalidUrl(format!("{} ({}): {}", chain, endpoint, e)))?;
            let provider = Provider::<Http>::try_from(url.as_str())
                .map_err(|e| AppError::ProviderError(format!("{}: {}", chain, e)))?;
            providers.insert(chain.to_ascii_lowercase(), Arc::new(provider));
        }
        log_info!("成功初始化 {} 个 RPC Provider", providers.len());

        Ok(Self {
            providers,
            retry: RetryAdapter::new(config.max_retries.unwrap_or(3), Duration::from_millis(500)),
        })
    }

    fn provider_for_key(&self, key: &str) -> Result<Arc<Provider<Http>>, SignError> {
        self.providers
            .get(&key.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SignError::NetworkError(format!("no RPC endpoint configured for {}", key)))
    }

    fn provider_for(&self, chain: ChainId) -> Result<Arc<Provider<Http>>, SignError> {
        self.provider_for_key(&chain.to_string())
    }

    /// Avalanche / Bitcoin 节点的自定义 JSON-RPC 方法
    async fn raw_request(
        &self,
        provider: Arc<Provider<Http>>,
        method: &'static str,
        params: Value,
    ) -> Result<Value, SignError> {
        self.retry
            .retry_call(method, || {
                let provider = provider.clone();
                let params = params.clone();
                async move {
                    provider
                        .request::<Value, Value>(method, params)
                        .await
                        .map_err(SignError::from)
                }
            })
            .await
    }

    async fn broadcast_evm(&self, chain: ChainId, raw: Bytes) -> Result<String, SignError> {
        let provider = self.provider_for(chain)?;
        // 广播不重试：节点可能已经收到交易
        let pending = provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| SignError::BroadcastFailed(e.to_string()))?;
        Ok(format!("{:?}", pending.tx_hash()))
    }

    async fn broadcast_avalanche(
        &self,
        chain: ChainId,
        alias: ChainAlias,
        raw: &Bytes,
    ) -> Result<String, SignError> {
        let (key, method) = match alias {
            ChainAlias::X => (chain.to_string(), "avm.issueTx"),
            ChainAlias::P => (chain.to_string(), "platform.issueTx"),
            // C-chain 原子交易走 avax API，而不是 EVM RPC
            ChainAlias::C => (
                if chain.is_testnet() { "avax:C:fuji" } else { "avax:C" }.to_string(),
                "avax.issueTx",
            ),
        };
        let provider = self.provider_for_key(&key)?;
        let result = provider
            .request::<Value, Value>(method, json!({ "tx": bytes_to_hex(raw), "encoding": "hex" }))
            .await
            .map_err(|e| SignError::BroadcastFailed(e.to_string()))?;
        result
            .get("txID")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SignError::BroadcastFailed(format!("{} returned no txID: {}", method, result)))
    }
}

#[async_trait]
impl ChainProvider for JsonRpcChainProvider {
    async fn base_fee(&self, chain: ChainId) -> Result<U256, SignError> {
        if !matches!(chain, ChainId::Evm(_)) {
            return Err(SignError::FeeUnavailable(format!("{} has no base fee", chain)));
        }
        let provider = self.provider_for(chain)?;
        let block = self
            .retry
            .retry_call("eth_getBlockByNumber", || {
                let provider = provider.clone();
                async move {
                    provider
                        .get_block(BlockNumber::Latest)
                        .await
                        .map_err(SignError::from)
                }
            })
            .await
            .map_err(|e| SignError::FeeUnavailable(e.to_string()))?;

        match block.and_then(|b| b.base_fee_per_gas) {
            Some(base_fee) => Ok(base_fee),
            // 非 1559 链退回 gasPrice
            None => provider
                .get_gas_price()
                .await
                .map_err(|e| SignError::FeeUnavailable(e.to_string())),
        }
    }

    async fn transaction_count(&self, chain: ChainId, address: &str) -> Result<u64, SignError> {
        let addr = address
            .parse::<Address>()
            .map_err(|_| SignError::MalformedParams(format!("invalid EVM address: {}", address)))?;
        let provider = self.provider_for(chain)?;
        let count = self
            .retry
            .retry_call("eth_getTransactionCount", || {
                let provider = provider.clone();
                async move {
                    provider
                        .get_transaction_count(addr, Some(BlockNumber::Pending.into()))
                        .await
                        .map_err(SignError::from)
                }
            })
            .await?;
        Ok(count.low_u64())
    }

    async fn prepare_bitcoin_send(
        &self,
        chain: ChainId,
        from: &str,
        to: &str,
        amount_sat: u64,
        fee_rate: u64,
    ) -> Result<BitcoinDraft, SignError> {
        let provider = self.provider_for(chain)?;
        let amount_btc = serde_json::Number::from_f64(amount_sat as f64 / 100_000_000f64)
            .ok_or_else(|| SignError::MalformedParams(format!("invalid amount {}", amount_sat)))?;

        let mut outputs = serde_json::Map::new();
        outputs.insert(to.to_string(), Value::Number(amount_btc));

        // createrawtransaction -> fundrawtransaction（节点选 UTXO、找零回 from）-> decode 统计输入输出
        let skeleton = self
            .raw_request(provider.clone(), "createrawtransaction", json!([[], outputs]))
            .await?;
        let funded = self
            .raw_request(
                provider.clone(),
                "fundrawtransaction",
                json!([skeleton, { "changeAddress": from, "fee_rate": fee_rate, "includeWatching": true }]),
            )
            .await?;
        let hex = funded
            .get("hex")
            .and_then(Value::as_str)
            .ok_or_else(|| SignError::NetworkError(format!("fundrawtransaction returned {}", funded)))?
            .to_string();
        let decoded = self
            .raw_request(provider, "decoderawtransaction", json!([hex]))
            .await?;
        let count = |field: &str| {
            decoded
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.len() as u64)
                .unwrap_or_default()
        };

        Ok(BitcoinDraft {
            unsigned_tx: Bytes::from(hex::decode(&hex)?),
            inputs: count("vin"),
            outputs: count("vout"),
        })
    }

    async fn broadcast(
        &self,
        tx: &NormalizedTransaction,
        signed: &SignedPayload,
    ) -> Result<String, SignError> {
        let Some(raw) = signed.raw_transaction.clone() else {
            return Err(SignError::BroadcastFailed(format!(
                "signed payload for {} carries no raw transaction",
                tx.chain()
            )));
        };

        let hash = match tx.body() {
            TxBody::Evm { .. } => self.broadcast_evm(tx.chain(), raw).await?,
            TxBody::Avalanche { alias, .. } => {
                self.broadcast_avalanche(tx.chain(), *alias, &raw).await?
            }
            TxBody::Bitcoin { .. } => {
                let provider = self.provider_for(tx.chain())?;
                let result = provider
                    .request::<Value, Value>("sendrawtransaction", json!([hex::encode(&raw)]))
                    .await
                    .map_err(|e| SignError::BroadcastFailed(e.to_string()))?;
                result
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SignError::BroadcastFailed(format!("unexpected result {}", result)))?
            }
            TxBody::Solana { .. } => {
                log_warn!("Solana 交易只签名不广播: {}", tx.chain());
                return Err(SignError::BroadcastFailed("solana transactions are sign-only".into()));
            }
        };
        log_info!("交易已广播: chain={}, hash={}", tx.chain(), hash);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_keys_are_case_insensitive() {
        let mut endpoints = HashMap::new();
        endpoints.insert("AVAX:X".to_string(), "https://api.avax.network/ext/bc/X".to_string());
        let provider = JsonRpcChainProvider::new(&RpcConfig {
            endpoints,
            max_retries: Some(1),
        })
        .unwrap();
        assert!(provider.provider_for(ChainId::AvalancheX { testnet: false }).is_ok());
        assert!(matches!(
            provider.provider_for(ChainId::AvalancheP { testnet: false }),
            Err(SignError::NetworkError(_))
        ));
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let mut endpoints = HashMap::new();
        endpoints.insert("eip155:1".to_string(), "not a url".to_string());
        assert!(matches!(
            JsonRpcChainProvider::new(&RpcConfig {
                endpoints,
                max_retries: None,
            }),
            Err(AppError::InvalidUrl(_))
        ));
    }
}
