// models/domain/payload.rs

use crate::models::domain::account::{Account, Contact};
use crate::models::domain::chain::ChainId;
use crate::models::domain::request::{Origin, RequestId, RpcMethod};
use crate::models::domain::transaction::NormalizedTransaction;
use chrono::{DateTime, Utc};
use ethers_core::types::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypedDataVersion {
    V1,
    V3,
    V4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    PersonalSign,
    EthSign,
    TypedData(TypedDataVersion),
    Avalanche,
    Solana,
}

/// 待签名的消息。`data` 保持调用方给出的原样（字符串或 typed data 对象）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePayload {
    pub kind: MessageKind,
    pub chain: ChainId,
    pub from: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// `avalanche_signMessage` 可以按账户序号指定签名账户
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_index: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignPayload {
    Message(MessagePayload),
    Transaction(NormalizedTransaction),
}

impl SignPayload {
    pub fn chain(&self) -> ChainId {
        match self {
            SignPayload::Message(m) => m.chain,
            SignPayload::Transaction(tx) => tx.chain(),
        }
    }

    pub fn from(&self) -> &str {
        match self {
            SignPayload::Message(m) => &m.from,
            SignPayload::Transaction(tx) => tx.from(),
        }
    }
}

/// 不需要签名后端的账户类操作
#[derive(Debug, Clone, PartialEq)]
pub enum AccountAction {
    GetAccounts,
    SelectAccount(u32),
    CreateContact(Contact),
}

/// normalizer 的输出
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedRequest {
    Sign(SignPayload),
    Account(AccountAction),
}

/// 后端签名产物。EVM 交易会带上完整的 RLP；其它链由广播方组装。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub signature: Bytes,
    pub raw_transaction: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaChallenge {
    pub id: String,
    /// totp / fido
    pub kind: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaProof {
    pub challenge_id: String,
    pub code: String,
}

/// `submit` 的成功结果。`MfaRequired` 不是失败，调用方带证明调用 `submit_mfa` 继续。
#[derive(Debug, Clone, PartialEq)]
pub enum SignResult {
    Signature(String),
    SignedTransaction { signature: String, raw: Option<String> },
    TxHash(String),
    Accounts(Vec<Account>),
    AccountSelected(u32),
    ContactCreated(Contact),
    MfaRequired {
        request_id: RequestId,
        challenge: MfaChallenge,
    },
}

impl SignResult {
    /// 转成回写给传输层的 `result` 字段
    pub fn to_json(&self) -> Value {
        match self {
            SignResult::Signature(sig) => json!(sig),
            SignResult::SignedTransaction { signature, raw } => {
                json!({ "signature": signature, "signedTransaction": raw })
            }
            SignResult::TxHash(hash) => json!(hash),
            SignResult::Accounts(accounts) => json!(accounts),
            SignResult::AccountSelected(index) => json!(index),
            SignResult::ContactCreated(contact) => json!(contact),
            SignResult::MfaRequired {
                request_id,
                challenge,
            } => json!({ "requestId": request_id, "mfaChallenge": challenge }),
        }
    }
}

/// 交给 UI 渲染的审批内容
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPayload {
    pub request_id: RequestId,
    pub method: RpcMethod,
    pub chain: String,
    pub origin: Origin,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    pub details: Value,
}
