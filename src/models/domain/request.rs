// models/domain/request.rs

use crate::errors::SignError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 请求 id：入口处生成（uuid v4），传输层也可以自带
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 识别的 RPC 方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcMethod {
    #[serde(rename = "personal_sign")]
    PersonalSign,
    #[serde(rename = "eth_sign")]
    EthSign,
    #[serde(rename = "eth_sendTransaction")]
    EthSendTransaction,
    #[serde(rename = "eth_signTypedData")]
    SignTypedData,
    #[serde(rename = "eth_signTypedData_v1")]
    SignTypedDataV1,
    #[serde(rename = "eth_signTypedData_v3")]
    SignTypedDataV3,
    #[serde(rename = "eth_signTypedData_v4")]
    SignTypedDataV4,
    #[serde(rename = "avalanche_sendTransaction")]
    AvalancheSendTransaction,
    #[serde(rename = "avalanche_signTransaction")]
    AvalancheSignTransaction,
    #[serde(rename = "avalanche_signMessage")]
    AvalancheSignMessage,
    #[serde(rename = "avalanche_getAccounts")]
    AvalancheGetAccounts,
    #[serde(rename = "avalanche_selectAccount")]
    AvalancheSelectAccount,
    #[serde(rename = "avalanche_createContact")]
    AvalancheCreateContact,
    #[serde(rename = "bitcoin_sendTransaction")]
    BitcoinSendTransaction,
    #[serde(rename = "solana_signMessage")]
    SolanaSignMessage,
    #[serde(rename = "solana_signTransaction")]
    SolanaSignTransaction,
}

/// 方法允许落在哪些链上
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodScope {
    Evm,
    /// X / P / C 任意一条 Avalanche 链
    Avalanche,
    Bitcoin,
    Solana,
    /// 账户类方法，与链无关
    Any,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 16] = [
        RpcMethod::PersonalSign,
        RpcMethod::EthSign,
        RpcMethod::EthSendTransaction,
        RpcMethod::SignTypedData,
        RpcMethod::SignTypedDataV1,
        RpcMethod::SignTypedDataV3,
        RpcMethod::SignTypedDataV4,
        RpcMethod::AvalancheSendTransaction,
        RpcMethod::AvalancheSignTransaction,
        RpcMethod::AvalancheSignMessage,
        RpcMethod::AvalancheGetAccounts,
        RpcMethod::AvalancheSelectAccount,
        RpcMethod::AvalancheCreateContact,
        RpcMethod::BitcoinSendTransaction,
        RpcMethod::SolanaSignMessage,
        RpcMethod::SolanaSignTransaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::PersonalSign => "personal_sign",
            RpcMethod::EthSign => "eth_sign",
            RpcMethod::EthSendTransaction => "eth_sendTransaction",
            RpcMethod::SignTypedData => "eth_signTypedData",
            RpcMethod::SignTypedDataV1 => "eth_signTypedData_v1",
            RpcMethod::SignTypedDataV3 => "eth_signTypedData_v3",
            RpcMethod::SignTypedDataV4 => "eth_signTypedData_v4",
            RpcMethod::AvalancheSendTransaction => "avalanche_sendTransaction",
            RpcMethod::AvalancheSignTransaction => "avalanche_signTransaction",
            RpcMethod::AvalancheSignMessage => "avalanche_signMessage",
            RpcMethod::AvalancheGetAccounts => "avalanche_getAccounts",
            RpcMethod::AvalancheSelectAccount => "avalanche_selectAccount",
            RpcMethod::AvalancheCreateContact => "avalanche_createContact",
            RpcMethod::BitcoinSendTransaction => "bitcoin_sendTransaction",
            RpcMethod::SolanaSignMessage => "solana_signMessage",
            RpcMethod::SolanaSignTransaction => "solana_signTransaction",
        }
    }

    pub fn scope(&self) -> MethodScope {
        match self {
            RpcMethod::PersonalSign
            | RpcMethod::EthSign
            | RpcMethod::EthSendTransaction
            | RpcMethod::SignTypedData
            | RpcMethod::SignTypedDataV1
            | RpcMethod::SignTypedDataV3
            | RpcMethod::SignTypedDataV4 => MethodScope::Evm,
            RpcMethod::AvalancheSendTransaction
            | RpcMethod::AvalancheSignTransaction
            | RpcMethod::AvalancheSignMessage => MethodScope::Avalanche,
            RpcMethod::AvalancheGetAccounts
            | RpcMethod::AvalancheSelectAccount
            | RpcMethod::AvalancheCreateContact => MethodScope::Any,
            RpcMethod::BitcoinSendTransaction => MethodScope::Bitcoin,
            RpcMethod::SolanaSignMessage | RpcMethod::SolanaSignTransaction => {
                MethodScope::Solana
            }
        }
    }

    /// 签名后需要广播、返回 txHash 的方法
    pub fn broadcasts(&self) -> bool {
        matches!(
            self,
            RpcMethod::EthSendTransaction
                | RpcMethod::AvalancheSendTransaction
                | RpcMethod::BitcoinSendTransaction
        )
    }
}

impl FromStr for RpcMethod {
    type Err = SignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RpcMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SignError::UnsupportedMethod(s.to_string()))
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求来源（仅用于展示，绝不参与授权判断）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Origin {
    pub fn in_app() -> Self {
        Self {
            name: "Core".to_string(),
            url: "core://in-app".to_string(),
            icon: None,
        }
    }
}

/// 一次签名请求。`method` / `chain_id` 保留传输层送来的原始字符串，
/// 由 dispatcher 在入口校验时解析。
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub id: RequestId,
    pub method: String,
    pub chain_id: String,
    pub raw_params: Value,
    pub origin: Origin,
    pub received_at: DateTime<Utc>,
}

impl SigningRequest {
    pub fn new(method: &str, chain_id: &str, raw_params: Value, origin: Origin) -> Self {
        Self {
            id: RequestId::generate(),
            method: method.to_string(),
            chain_id: chain_id.to_string(),
            raw_params,
            origin,
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }
}

/// 传输层送达的 `{method, params, chainId, origin}` 结构
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub chain_id: String,
    #[serde(default)]
    pub origin: Origin,
}

impl From<InboundRequest> for SigningRequest {
    fn from(inbound: InboundRequest) -> Self {
        let request = SigningRequest::new(
            &inbound.method,
            &inbound.chain_id,
            inbound.params,
            inbound.origin,
        );
        match inbound.id {
            Some(id) => request.with_id(id),
            None => request,
        }
    }
}

/// 请求生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestStatus {
    Received,
    Normalized,
    AwaitingApproval,
    Approved,
    Rejected,
    Signing,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal status transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: RequestStatus,
    pub to: RequestStatus,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed
                | RequestStatus::Failed
                | RequestStatus::Rejected
                | RequestStatus::TimedOut
                | RequestStatus::Cancelled
        )
    }

    /// 只允许向前推进；终态之后不能再变化
    pub fn advance(self, next: RequestStatus) -> Result<RequestStatus, InvalidTransition> {
        use RequestStatus::*;
        let allowed = match self {
            Received => matches!(next, Normalized | Failed | Cancelled),
            // getAccounts 在规范化后直接完成
            Normalized => matches!(next, AwaitingApproval | Completed | Failed | Cancelled),
            AwaitingApproval => matches!(next, Approved | Rejected | TimedOut | Cancelled),
            // selectAccount / createContact 审批后直接完成，不经过签名
            Approved => matches!(next, Signing | Completed | Failed | Cancelled),
            // 停在 MFA 的请求过期后超时
            Signing => matches!(next, Completed | Failed | TimedOut | Cancelled),
            Completed | Failed | Rejected | TimedOut | Cancelled => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}
