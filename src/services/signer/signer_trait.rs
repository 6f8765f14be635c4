use crate::errors::SignError;
use crate::infrastructure::device::TransportKind;
use crate::models::domain::{Account, MfaChallenge, MfaProof, SignPayload, SignedPayload};
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    LocalKey,
    HardwareDevice(TransportKind),
    RemoteMpc,
}

/// 签名结果：要么签好了，要么需要用户补一次 MFA（不是失败）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome {
    Signed(SignedPayload),
    NeedsMfa(MfaChallenge),
}

#[async_trait]
pub trait SigningBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `mfa` 只在 `submit_mfa` 续签时才会带上
    async fn sign(
        &self,
        payload: &SignPayload,
        account: &Account,
        mfa: Option<&MfaProof>,
    ) -> Result<SignOutcome, SignError>;
}
