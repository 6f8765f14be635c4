use config::ConfigError;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::task::JoinError;

/// 签名请求在 `submit` 边界上可能出现的全部错误。
///
/// 调用方（UI / 传输层）只会看到这里的变体，协作方（存储、网络、设备）的原生错误
/// 都会先被转换成对应的变体再向上抛出。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    // ==================== 入口错误 ====================
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Duplicate request id: {0}")]
    DuplicateRequest(String),

    // ==================== 规范化错误 ====================
    #[error("Malformed params: {0}")]
    MalformedParams(String),

    #[error("Fee unavailable: {0}")]
    FeeUnavailable(String),

    // ==================== 审批结果 ====================
    #[error("User rejected the request")]
    UserRejected,

    #[error("Approval timed out")]
    ApprovalTimeout,

    #[error("Approval already pending for request {0}")]
    ApprovalAlreadyPending(String),

    #[error("No pending approval for request {0}")]
    StaleResolution(String),

    #[error("Request cancelled")]
    Cancelled,

    // ==================== 签名后端错误 ====================
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Hardware device disconnected: {0}")]
    DeviceDisconnected(String),

    #[error("Request rejected on the hardware device")]
    DeviceRejected,

    #[error("Malformed device response: {0}")]
    MalformedDeviceResponse(String),

    /// 不是终止错误：调用方需要带着 MFA 证明重新调用
    #[error("Second factor required (challenge {0})")]
    RequiresMfa(String),

    #[error("Session token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Signing failed: {0}")]
    SigningFailed(Box<SignError>),

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("Secure storage error: {0}")]
    Storage(String),
}

/// JSON-RPC 错误结构 `{code, message, data}`，交给传输层原样回写
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl SignError {
    /// 仅 RemoteMpc 的网络错误和 token 刷新失败值得由调用方重试
    pub fn is_retryable(&self) -> bool {
        match self {
            SignError::NetworkError(_) | SignError::RefreshFailed(_) => true,
            SignError::SigningFailed(inner) => inner.is_retryable(),
            _ => false,
        }
    }

    /// 后端错误在跨越 `submit` 边界前统一包装为 `SigningFailed`
    pub fn into_signing_failed(self) -> Self {
        match self {
            SignError::SigningFailed(_) | SignError::Cancelled => self,
            other => SignError::SigningFailed(Box::new(other)),
        }
    }

    /// EIP-1193 / EIP-1474 错误码
    pub fn code(&self) -> i64 {
        match self {
            SignError::UserRejected | SignError::DeviceRejected => 4001,
            SignError::UnsupportedMethod(_) => -32601,
            SignError::MalformedParams(_) => -32602,
            SignError::UnknownChain(_) => 4901,
            SignError::DuplicateRequest(_)
            | SignError::ApprovalAlreadyPending(_)
            | SignError::StaleResolution(_) => -32600,
            SignError::KeyNotFound(_) | SignError::RequiresMfa(_) => 4100,
            SignError::SigningFailed(inner) => inner.code(),
            _ => -32603,
        }
    }

    pub fn to_rpc_error(&self) -> RpcErrorBody {
        let data = match self {
            SignError::SigningFailed(inner) => Some(json!({
                "cause": inner.to_string(),
                "retryable": inner.is_retryable(),
            })),
            SignError::RequiresMfa(challenge) => Some(json!({ "challengeId": challenge })),
            _ => None,
        };
        RpcErrorBody {
            code: self.code(),
            message: self.to_string(),
            data,
        }
    }
}

impl From<serde_json::Error> for SignError {
    fn from(err: serde_json::Error) -> Self {
        SignError::MalformedParams(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for SignError {
    fn from(err: hex::FromHexError) -> Self {
        SignError::MalformedParams(format!("Hex decode error: {}", err))
    }
}

impl From<base64::DecodeError> for SignError {
    fn from(err: base64::DecodeError) -> Self {
        SignError::MalformedParams(format!("Base64 decode error: {}", err))
    }
}

impl From<ethers_signers::WalletError> for SignError {
    fn from(err: ethers_signers::WalletError) -> Self {
        SignError::Crypto(err.to_string())
    }
}

impl From<std::io::Error> for SignError {
    fn from(err: std::io::Error) -> Self {
        SignError::Storage(err.to_string())
    }
}

/// 启动阶段（配置、日志、运行时）的错误
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Join error: {0}")]
    JoinError(#[from] JoinError),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("无效的provider: {0}")]
    ProviderError(String),

    /// 内部不可预期错误（兜底）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<SignError> for AppError {
    fn from(err: SignError) -> Self {
        AppError::Internal(err.to_string())
    }
}
