// services/normalizer/params.rs

use crate::errors::SignError;
use crate::models::domain::{ChainAlias, Contact, RpcMethod, TypedDataVersion};
use crate::utils::{hex_to_bytes, parse_quantity, parse_u64};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ethers_core::types::{Bytes, U256};
use serde::Deserialize;
use serde_json::Value;

/// eth_sendTransaction 的交易对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTxParams {
    pub from: String,
    pub to: Option<String>,
    pub data: Option<Bytes>,
    pub value: Option<U256>,
    pub gas: U256,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub nonce: Option<u64>,
}

/// avalanche_sendTransaction / avalanche_signTransaction 的参数对象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvalancheTxParams {
    pub tx_bytes: Bytes,
    pub alias: ChainAlias,
    pub external_indices: Vec<u32>,
    pub internal_indices: Vec<u32>,
    pub utxos: Vec<String>,
}

/// 每个 RPC 方法的强类型参数。只由 [`RpcParams::parse`] 构造。
#[derive(Debug, Clone, PartialEq)]
pub enum RpcParams {
    PersonalSign {
        data: String,
        from: String,
        password: Option<String>,
    },
    EthSign {
        from: String,
        data: String,
    },
    SignTypedData {
        version: TypedDataVersion,
        from: String,
        typed_data: Value,
    },
    EthSendTransaction(EvmTxParams),
    AvalancheTransaction(AvalancheTxParams),
    AvalancheSignMessage {
        message: String,
        account_index: Option<u32>,
    },
    GetAccounts,
    SelectAccount {
        index: u32,
    },
    CreateContact(Contact),
    BitcoinSend {
        to: String,
        amount_sat: u64,
        fee_rate: u64,
    },
    SolanaSignMessage {
        account: String,
        message: Bytes,
    },
    SolanaSignTransaction {
        account: String,
        transaction: Bytes,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvmTx {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    gas: Option<Value>,
    #[serde(default)]
    gas_limit: Option<Value>,
    #[serde(default)]
    gas_price: Option<Value>,
    #[serde(default)]
    max_fee_per_gas: Option<Value>,
    #[serde(default)]
    max_priority_fee_per_gas: Option<Value>,
    #[serde(default)]
    nonce: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAvalancheTx {
    transaction_hex: String,
    chain_alias: String,
    #[serde(default)]
    external_indices: Vec<u32>,
    #[serde(default)]
    internal_indices: Vec<u32>,
    #[serde(default)]
    utxos: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContact {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default, rename = "addressXP")]
    address_xp: Option<String>,
    #[serde(default, rename = "addressBTC")]
    address_btc: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSolanaMessage {
    account: String,
    serialized_message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSolanaTx {
    account: String,
    serialized_tx: String,
}

impl RpcParams {
    /// 按方法解包位置参数。缺少必填字段立即失败，多余字段忽略。
    pub fn parse(method: RpcMethod, raw: &Value) -> Result<Self, SignError> {
        let params = Positional::new(method, raw);
        let parsed = match method {
            RpcMethod::PersonalSign => RpcParams::PersonalSign {
                data: params.string(0, "data")?,
                from: params.string(1, "from")?,
                password: params.optional_string(2),
            },
            RpcMethod::EthSign => RpcParams::EthSign {
                from: params.string(0, "from")?,
                data: params.string(1, "data")?,
            },
            RpcMethod::SignTypedData | RpcMethod::SignTypedDataV1 => {
                let typed_data = params.typed_data(1)?;
                // 带 types + primaryType 的 v1 负载其实是 v4
                let version = if is_v4_shaped(&typed_data) {
                    TypedDataVersion::V4
                } else {
                    TypedDataVersion::V1
                };
                RpcParams::SignTypedData {
                    version,
                    from: params.string(0, "from")?,
                    typed_data,
                }
            }
            RpcMethod::SignTypedDataV3 | RpcMethod::SignTypedDataV4 => RpcParams::SignTypedData {
                version: if method == RpcMethod::SignTypedDataV3 {
                    TypedDataVersion::V3
                } else {
                    TypedDataVersion::V4
                },
                from: params.string(0, "from")?,
                typed_data: params.typed_data(1)?,
            },
            RpcMethod::EthSendTransaction => {
                RpcParams::EthSendTransaction(parse_evm_tx(params.object(0, "transaction")?)?)
            }
            RpcMethod::AvalancheSendTransaction | RpcMethod::AvalancheSignTransaction => {
                RpcParams::AvalancheTransaction(parse_avalanche_tx(params.object_or_first()?)?)
            }
            RpcMethod::AvalancheSignMessage => RpcParams::AvalancheSignMessage {
                message: params.string(0, "message")?,
                account_index: params.optional_index(1)?,
            },
            RpcMethod::AvalancheGetAccounts => RpcParams::GetAccounts,
            RpcMethod::AvalancheSelectAccount => RpcParams::SelectAccount {
                index: params.index(0, "index")?,
            },
            RpcMethod::AvalancheCreateContact => {
                RpcParams::CreateContact(parse_contact(params.object(0, "contact")?)?)
            }
            RpcMethod::BitcoinSendTransaction => {
                let to = params.string(0, "address")?;
                let amount_sat = parse_u64(params.required(1, "amountSatoshi")?, "amountSatoshi")?;
                let fee_rate = parse_u64(params.required(2, "feeRate")?, "feeRate")?;
                if amount_sat == 0 {
                    return Err(SignError::MalformedParams("amountSatoshi must be positive".into()));
                }
                RpcParams::BitcoinSend {
                    to,
                    amount_sat,
                    fee_rate,
                }
            }
            RpcMethod::SolanaSignMessage => {
                let raw: RawSolanaMessage = serde_json::from_value(params.object(0, "message")?.clone())?;
                RpcParams::SolanaSignMessage {
                    account: raw.account,
                    message: Bytes::from(BASE64.decode(raw.serialized_message)?),
                }
            }
            RpcMethod::SolanaSignTransaction => {
                let raw: RawSolanaTx = serde_json::from_value(params.object(0, "transaction")?.clone())?;
                RpcParams::SolanaSignTransaction {
                    account: raw.account,
                    transaction: Bytes::from(BASE64.decode(raw.serialized_tx)?),
                }
            }
        };
        Ok(parsed)
    }
}

/// 位置参数访问器，错误信息统一带上方法名
struct Positional<'a> {
    method: RpcMethod,
    raw: &'a Value,
}

impl<'a> Positional<'a> {
    fn new(method: RpcMethod, raw: &'a Value) -> Self {
        Self { method, raw }
    }

    fn malformed(&self, detail: impl std::fmt::Display) -> SignError {
        SignError::MalformedParams(format!("{}: {}", self.method, detail))
    }

    fn get(&self, index: usize) -> Option<&'a Value> {
        match self.raw {
            Value::Array(items) => items.get(index).filter(|v| !v.is_null()),
            _ => None,
        }
    }

    fn required(&self, index: usize, field: &str) -> Result<&'a Value, SignError> {
        self.get(index)
            .ok_or_else(|| self.malformed(format_args!("missing {} at position {}", field, index)))
    }

    fn string(&self, index: usize, field: &str) -> Result<String, SignError> {
        match self.required(index, field)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.malformed(format_args!("{} must be a string, got {}", field, other))),
        }
    }

    fn optional_string(&self, index: usize) -> Option<String> {
        self.get(index).and_then(Value::as_str).map(str::to_string)
    }

    fn object(&self, index: usize, field: &str) -> Result<&'a Value, SignError> {
        let value = self.required(index, field)?;
        if value.is_object() {
            Ok(value)
        } else {
            Err(self.malformed(format_args!("{} must be an object", field)))
        }
    }

    /// 参数既可能是对象本身，也可能是单元素数组
    fn object_or_first(&self) -> Result<&'a Value, SignError> {
        match self.raw {
            Value::Object(_) => Ok(self.raw),
            _ => self.object(0, "params"),
        }
    }

    /// typed data 可以是对象，也可以是 JSON 字符串
    fn typed_data(&self, index: usize) -> Result<Value, SignError> {
        match self.required(index, "typedData")? {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| self.malformed(format_args!("typedData is not valid JSON: {}", e))),
            value if value.is_object() || value.is_array() => Ok(value.clone()),
            other => Err(self.malformed(format_args!("typedData has unexpected type: {}", other))),
        }
    }

    fn index(&self, index: usize, field: &str) -> Result<u32, SignError> {
        let value = parse_u64(self.required(index, field)?, field)?;
        u32::try_from(value).map_err(|_| self.malformed(format_args!("{} out of range", field)))
    }

    fn optional_index(&self, index: usize) -> Result<Option<u32>, SignError> {
        match self.get(index) {
            Some(_) => self.index(index, "accountIndex").map(Some),
            None => Ok(None),
        }
    }
}

fn is_v4_shaped(typed_data: &Value) -> bool {
    typed_data.get("types").is_some() && typed_data.get("primaryType").is_some()
}

fn parse_evm_tx(raw: &Value) -> Result<EvmTxParams, SignError> {
    let tx: RawEvmTx = serde_json::from_value(raw.clone())?;

    let from = tx
        .from
        .ok_or_else(|| SignError::MalformedParams("eth_sendTransaction: missing from".into()))?;
    let gas = tx
        .gas
        .or(tx.gas_limit)
        .ok_or_else(|| SignError::MalformedParams("eth_sendTransaction: missing gas".into()))?;

    let quantity = |value: Option<Value>, field: &str| -> Result<Option<U256>, SignError> {
        value.map(|v| parse_quantity(&v, field)).transpose()
    };

    Ok(EvmTxParams {
        from,
        to: tx.to.filter(|to| !to.is_empty()),
        data: tx.data.or(tx.input).map(|d| hex_to_bytes(&d)).transpose()?,
        value: quantity(tx.value, "value")?,
        gas: parse_quantity(&gas, "gas")?,
        gas_price: quantity(tx.gas_price, "gasPrice")?,
        max_fee_per_gas: quantity(tx.max_fee_per_gas, "maxFeePerGas")?,
        max_priority_fee_per_gas: quantity(tx.max_priority_fee_per_gas, "maxPriorityFeePerGas")?,
        nonce: tx.nonce.map(|n| parse_u64(&n, "nonce")).transpose()?,
    })
}

fn parse_avalanche_tx(raw: &Value) -> Result<AvalancheTxParams, SignError> {
    let tx: RawAvalancheTx = serde_json::from_value(raw.clone())?;
    let alias = ChainAlias::parse(&tx.chain_alias).ok_or_else(|| {
        SignError::MalformedParams(format!("unknown chainAlias: {}", tx.chain_alias))
    })?;
    let tx_bytes = hex_to_bytes(&tx.transaction_hex)?;
    if tx_bytes.is_empty() {
        return Err(SignError::MalformedParams("transactionHex is empty".into()));
    }
    Ok(AvalancheTxParams {
        tx_bytes,
        alias,
        external_indices: tx.external_indices,
        internal_indices: tx.internal_indices,
        utxos: tx.utxos,
    })
}

fn parse_contact(raw: &Value) -> Result<Contact, SignError> {
    let contact: RawContact = serde_json::from_value(raw.clone())?;
    if contact.name.trim().is_empty() {
        return Err(SignError::MalformedParams("contact name is empty".into()));
    }
    if contact.address.is_none() && contact.address_xp.is_none() && contact.address_btc.is_none() {
        return Err(SignError::MalformedParams("contact needs at least one address".into()));
    }
    Ok(Contact {
        id: contact.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        name: contact.name,
        address: contact.address,
        address_xp: contact.address_xp,
        address_btc: contact.address_btc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn personal_sign_with_password() {
        let params = json!(["0x48656c6c6f", "0xabc", "pw"]);
        assert_eq!(
            RpcParams::parse(RpcMethod::PersonalSign, &params).unwrap(),
            RpcParams::PersonalSign {
                data: "0x48656c6c6f".into(),
                from: "0xabc".into(),
                password: Some("pw".into()),
            }
        );
    }

    #[test]
    fn eth_sign_is_address_first() {
        let params = json!(["0xabc", "0xdeadbeef"]);
        let RpcParams::EthSign { from, data } = RpcParams::parse(RpcMethod::EthSign, &params).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(from, "0xabc");
        assert_eq!(data, "0xdeadbeef");
    }

    #[test]
    fn v1_payload_with_types_is_v4() {
        let typed = json!({"types": {}, "primaryType": "Mail", "domain": {}, "message": {}});
        let params = json!(["0xabc", typed.to_string()]);
        let RpcParams::SignTypedData { version, .. } =
            RpcParams::parse(RpcMethod::SignTypedDataV1, &params).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(version, TypedDataVersion::V4);

        let legacy = json!(["0xabc", [{"type": "string", "name": "m", "value": "hi"}]]);
        let RpcParams::SignTypedData { version, .. } =
            RpcParams::parse(RpcMethod::SignTypedData, &legacy).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(version, TypedDataVersion::V1);
    }

    #[test]
    fn send_transaction_requires_gas() {
        let params = json!([{"from": "0xabc", "to": "0xdef", "value": "0x1"}]);
        let err = RpcParams::parse(RpcMethod::EthSendTransaction, &params).unwrap_err();
        assert!(matches!(err, SignError::MalformedParams(msg) if msg.contains("gas")));
    }

    #[test]
    fn send_transaction_ignores_extra_fields() {
        let params = json!([{
            "from": "0xabc", "to": "0xdef", "gas": "0x5208",
            "gasPrice": "0x3b9aca00", "chainId": "0xa86a", "somethingElse": true
        }]);
        let RpcParams::EthSendTransaction(tx) =
            RpcParams::parse(RpcMethod::EthSendTransaction, &params).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(tx.gas, U256::from(21_000u64));
        assert_eq!(tx.gas_price, Some(U256::from(1_000_000_000u64)));
        assert_eq!(tx.nonce, None);
    }

    #[test]
    fn avalanche_tx_accepts_object_or_array() {
        let body = json!({"transactionHex": "0x0102", "chainAlias": "P", "externalIndices": [0, 1]});
        for params in [body.clone(), json!([body])] {
            let RpcParams::AvalancheTransaction(tx) =
                RpcParams::parse(RpcMethod::AvalancheSendTransaction, &params).unwrap()
            else {
                panic!("wrong variant");
            };
            assert_eq!(tx.alias, ChainAlias::P);
            assert_eq!(tx.external_indices, vec![0, 1]);
        }
        let bad = json!({"transactionHex": "0x01", "chainAlias": "Z"});
        assert!(RpcParams::parse(RpcMethod::AvalancheSignTransaction, &bad).is_err());
    }

    #[test]
    fn contact_needs_an_address() {
        let params = json!([{"name": "Alice"}]);
        assert!(RpcParams::parse(RpcMethod::AvalancheCreateContact, &params).is_err());
        let params = json!([{"name": "Alice", "addressBTC": "bc1q"}]);
        let RpcParams::CreateContact(contact) =
            RpcParams::parse(RpcMethod::AvalancheCreateContact, &params).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(contact.address_btc.as_deref(), Some("bc1q"));
        assert!(!contact.id.is_empty());
    }

    #[test]
    fn bitcoin_and_solana_params() {
        let params = json!(["bc1qdest", "15000", 12]);
        assert_eq!(
            RpcParams::parse(RpcMethod::BitcoinSendTransaction, &params).unwrap(),
            RpcParams::BitcoinSend {
                to: "bc1qdest".into(),
                amount_sat: 15_000,
                fee_rate: 12,
            }
        );

        let params = json!([{"account": "So1", "serializedMessage": "aGVsbG8="}]);
        let RpcParams::SolanaSignMessage { message, .. } =
            RpcParams::parse(RpcMethod::SolanaSignMessage, &params).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(message.as_ref(), b"hello");
    }

    #[test]
    fn select_account_index() {
        assert_eq!(
            RpcParams::parse(RpcMethod::AvalancheSelectAccount, &json!([2])).unwrap(),
            RpcParams::SelectAccount { index: 2 }
        );
        assert!(RpcParams::parse(RpcMethod::AvalancheSelectAccount, &json!([])).is_err());
    }
}
