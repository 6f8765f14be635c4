// services/signer/local_key.rs

use crate::errors::SignError;
use crate::infrastructure::storage::SecureStorage;
use crate::log_debug;
use crate::models::domain::{Account, MfaProof, SignPayload};
use crate::services::signer::signer_trait::{BackendKind, SignOutcome, SigningBackend};
use crate::services::signer::signing_input::{SigningInput, finalize, signing_input};
use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use ethers_signers::LocalWallet;
use std::sync::Arc;
use zeroize::Zeroizing;

/// 助记词 / 私钥钱包：密钥在 SecureStorage 里，按需加载、用完清零
#[derive(Clone)]
pub struct LocalKeySigner {
    storage: Arc<dyn SecureStorage>,
}

impl LocalKeySigner {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SigningBackend for LocalKeySigner {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalKey
    }

    async fn sign(
        &self,
        payload: &SignPayload,
        account: &Account,
        _mfa: Option<&MfaProof>,
    ) -> Result<SignOutcome, SignError> {
        let slot = account.key_slot(payload.chain().vm());
        let secret = self
            .storage
            .load(&slot)
            .await?
            .ok_or_else(|| SignError::KeyNotFound(slot.clone()))?;

        let signature = match signing_input(payload)? {
            SigningInput::Secp256k1(digest) => {
                let wallet = LocalWallet::from_bytes(secret.as_slice())?;
                wallet.sign_hash(digest)?.to_vec()
            }
            SigningInput::Ed25519(message) => {
                // 32 字节种子，或 Solana CLI 的 64 字节 seed || pubkey
                if secret.len() != 32 && secret.len() != 64 {
                    return Err(SignError::Crypto(format!(
                        "slot {} holds {} bytes, expected an ed25519 seed",
                        slot,
                        secret.len()
                    )));
                }
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(&secret[..32]);
                let key = SigningKey::from_bytes(&seed);
                key.sign(message.as_ref()).to_bytes().to_vec()
            }
        };
        log_debug!("local key signed with slot {}", slot);

        Ok(SignOutcome::Signed(finalize(payload, &signature)?))
    }
}
