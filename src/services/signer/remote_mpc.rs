// services/signer/remote_mpc.rs

use crate::errors::SignError;
use crate::infrastructure::mpc::{MpcClient, MpcResponse, MpcSignRequest, TokenRefresher};
use crate::infrastructure::provider::RetryAdapter;
use crate::log_info;
use crate::models::domain::{Account, MfaProof, SignPayload};
use crate::services::signer::signer_trait::{BackendKind, SignOutcome, SigningBackend};
use crate::services::signer::signing_input::{finalize, signing_input};
use crate::utils::bytes_to_hex;
use async_trait::async_trait;
use std::sync::Arc;

/// Seedless 钱包：门限签名由远端完成，本地只负责 token、请求和 MFA 透传
pub struct RemoteMpcSigner {
    client: Arc<dyn MpcClient>,
    tokens: Arc<dyn TokenRefresher>,
    retry: RetryAdapter,
}

impl RemoteMpcSigner {
    pub fn new(client: Arc<dyn MpcClient>, tokens: Arc<dyn TokenRefresher>) -> Self {
        Self {
            client,
            tokens,
            retry: RetryAdapter::none(),
        }
    }

    /// 网络错误按调用方给定的策略重试
    pub fn with_retry(mut self, retry: RetryAdapter) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl SigningBackend for RemoteMpcSigner {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteMpc
    }

    async fn sign(
        &self,
        payload: &SignPayload,
        account: &Account,
        mfa: Option<&MfaProof>,
    ) -> Result<SignOutcome, SignError> {
        let token = self.tokens.get_valid_token().await?;
        let input = signing_input(payload)?;
        let request = MpcSignRequest {
            key_id: account.wallet_id.clone(),
            account_index: account.index,
            chain: payload.chain().to_string(),
            scheme: input.scheme(),
            message: bytes_to_hex(input.bytes()),
            mfa: mfa.cloned(),
        };

        let response = self
            .retry
            .retry_call("mpc_sign", || self.client.sign(&token, &request))
            .await?;

        match response {
            MpcResponse::Signed { signature } => {
                Ok(SignOutcome::Signed(finalize(payload, &signature)?))
            }
            MpcResponse::MfaRequired(challenge) => {
                log_info!("MPC 签名需要二次验证: challenge={}", challenge.id);
                Ok(SignOutcome::NeedsMfa(challenge))
            }
        }
    }
}
