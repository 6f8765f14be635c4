//! stdin / stdout 上的 NDJSON 帧：每行一个 JSON 对象。
//!
//! 入站：签名请求、审批决定、取消、MFA 证明、切换活跃钱包，
//! 以及 UI 重连后的 `{"pending":true}`（重新推送仍在等待的审批）。
//! 出站：`{id, result}` / `{id, error}`，以及推给 UI 的审批提示。

use crate::errors::SignError;
use crate::models::domain::{
    DisplayPayload, InboundRequest, MfaProof, RequestId, SignResult, WalletContext,
};
use crate::services::approval::UserDecision;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaSubmission {
    pub request_id: String,
    pub challenge_id: String,
    pub code: String,
}

impl MfaSubmission {
    pub fn into_parts(self) -> (RequestId, MfaProof) {
        (
            RequestId::from(self.request_id),
            MfaProof {
                challenge_id: self.challenge_id,
                code: self.code,
            },
        )
    }
}

/// 按字段区分，签名请求放在最后匹配
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Decision {
        decision: UserDecision,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    Cancel {
        cancel: String,
    },
    Mfa {
        mfa: MfaSubmission,
    },
    Wallet {
        wallet: WalletContext,
    },
    Pending {
        pending: bool,
    },
    Request(InboundRequest),
}

impl InboundFrame {
    pub fn parse(line: &str) -> Result<Self, SignError> {
        Ok(serde_json::from_str(line)?)
    }
}

pub fn result_frame(id: &RequestId, result: &SignResult) -> Value {
    json!({ "id": id, "result": result.to_json() })
}

pub fn error_frame(id: Option<&RequestId>, error: &SignError) -> Value {
    json!({ "id": id, "error": error.to_rpc_error() })
}

pub fn prompt_frame(display: &DisplayPayload) -> Value {
    json!({ "approval": display })
}
