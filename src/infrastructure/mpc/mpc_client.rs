// infrastructure/mpc/mpc_client.rs

use crate::errors::{AppError, SignError};
use crate::log_debug;
use crate::models::domain::{MfaChallenge, MfaProof};
use crate::utils::hex_to_bytes;
use async_trait::async_trait;
use ethers_core::types::Bytes;
use ethers_providers::{Authorization, Http, Provider, ProviderError};
use serde::{Deserialize, Serialize};
use url::Url;

/// 会话 token 来源（过期时负责刷新）
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// 刷新失败返回 `RefreshFailed`
    async fn get_valid_token(&self) -> Result<String, SignError>;
}

/// 门限签名请求。`message` 为 secp256k1 摘要或 ed25519 原始消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MpcSignRequest {
    pub key_id: String,
    pub account_index: u32,
    pub chain: String,
    /// secp256k1 / ed25519
    pub scheme: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa: Option<MfaProof>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MpcResponse {
    Signed { signature: Bytes },
    MfaRequired(MfaChallenge),
}

#[async_trait]
pub trait MpcClient: Send + Sync {
    /// 网络层失败返回 `NetworkError`
    async fn sign(&self, token: &str, request: &MpcSignRequest) -> Result<MpcResponse, SignError>;
}

/// 固定 token（由宿主在登录后注入）
pub struct StaticTokenRefresher {
    token: String,
}

impl StaticTokenRefresher {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for StaticTokenRefresher {
    async fn get_valid_token(&self) -> Result<String, SignError> {
        if self.token.is_empty() {
            return Err(SignError::RefreshFailed("no session token available".into()));
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RawMpcResponse {
    Signed { signature: String },
    MfaRequired { challenge: MfaChallenge },
}

/// 通过 JSON-RPC `mpc_sign` 调用远端签名服务
pub struct JsonRpcMpcClient {
    endpoint: Url,
}

impl JsonRpcMpcClient {
    pub fn new(endpoint: &str) -> Result<Self, AppError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| AppError::InvalidUrl(format!("mpc endpoint {}: {}", endpoint, e)))?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl MpcClient for JsonRpcMpcClient {
    async fn sign(&self, token: &str, request: &MpcSignRequest) -> Result<MpcResponse, SignError> {
        let http = Http::new_with_auth(self.endpoint.clone(), Authorization::bearer(token))
            .map_err(|e| SignError::NetworkError(e.to_string()))?;
        let provider = Provider::new(http);

        log_debug!("mpc_sign: key={}, chain={}", request.key_id, request.chain);
        let raw: RawMpcResponse = provider
            .request("mpc_sign", [request])
            .await
            .map_err(|e: ProviderError| SignError::NetworkError(e.to_string()))?;

        match raw {
            RawMpcResponse::Signed { signature } => Ok(MpcResponse::Signed {
                signature: hex_to_bytes(&signature)?,
            }),
            RawMpcResponse::MfaRequired { challenge } => Ok(MpcResponse::MfaRequired(challenge)),
        }
    }
}
