// services/signer/hardware_device.rs

use crate::config::HardwareConfig;
use crate::errors::SignError;
use crate::infrastructure::device::{DeviceTransport, SessionId};
use crate::models::domain::{Account, MfaProof, SignPayload, TxBody};
use crate::services::signer::signer_trait::{BackendKind, SignOutcome, SigningBackend};
use crate::services::signer::signing_input::{SigningInput, finalize, signing_input};
use crate::{log_debug, log_info, log_warn};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const CLA: u8 = 0xE0;
/// EVM 交易：发送未签名 RLP，由设备展示明细
const INS_SIGN_EVM_TX: u8 = 0x04;
const INS_SIGN_SECP_DIGEST: u8 = 0x08;
const INS_SIGN_ED25519: u8 = 0x0A;

const P1_FIRST: u8 = 0x00;
const P1_MORE: u8 = 0x80;
const P2_LAST: u8 = 0x00;
const P2_MORE: u8 = 0x80;

pub const SW_OK: u16 = 0x9000;
pub const SW_USER_REJECTED: u16 = 0x6985;

/// 会话守卫：sign future 正常结束或被 drop（取消）时都会释放设备
struct SessionGuard {
    transport: Arc<dyn DeviceTransport>,
    session: SessionId,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.transport.release(self.session);
        log_debug!("hardware {} released", self.session);
    }
}

/// Ledger（BLE）/ Keystone（QR）共用的 APDU 签名后端
pub struct HardwareDeviceSigner {
    transport: Arc<dyn DeviceTransport>,
    round_timeout: Duration,
    max_chunk_size: usize,
}

impl HardwareDeviceSigner {
    pub fn new(transport: Arc<dyn DeviceTransport>, config: &HardwareConfig) -> Self {
        Self {
            transport,
            round_timeout: Duration::from_secs(config.round_timeout_secs),
            // Lc 只有 1 字节
            max_chunk_size: config.max_chunk_size.clamp(1, 255),
        }
    }

    /// 每一轮都受同一个超时约束；超时或链路断开都视为设备断开
    async fn round(&self, session: SessionId, frame: Vec<u8>) -> Result<Vec<u8>, SignError> {
        timeout(self.round_timeout, self.transport.exchange(session, frame))
            .await
            .map_err(|_| {
                SignError::DeviceDisconnected(format!(
                    "no answer within {:?}",
                    self.round_timeout
                ))
            })?
    }

    async fn stream(
        &self,
        session: SessionId,
        ins: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>, SignError> {
        let chunks: Vec<&[u8]> = payload.chunks(self.max_chunk_size).collect();
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let p1 = if i == 0 { P1_FIRST } else { P1_MORE };
            let p2 = if i == last { P2_LAST } else { P2_MORE };
            let mut frame = Vec::with_capacity(5 + chunk.len());
            frame.extend_from_slice(&[CLA, ins, p1, p2, chunk.len() as u8]);
            frame.extend_from_slice(chunk);

            let response = self.round(session, frame).await?;
            let (data, sw) = split_status(&response)?;
            match sw {
                SW_OK if i == last => return Ok(data.to_vec()),
                SW_OK => continue,
                SW_USER_REJECTED => {
                    log_warn!("用户在硬件设备上拒绝了签名 ({})", session);
                    return Err(SignError::DeviceRejected);
                }
                other => {
                    return Err(SignError::MalformedDeviceResponse(format!(
                        "unexpected status word 0x{:04x} at round {}",
                        other,
                        i + 1
                    )));
                }
            }
        }
        Err(SignError::MalformedDeviceResponse("empty payload".into()))
    }
}

/// `data || SW1 SW2`
pub fn split_status(response: &[u8]) -> Result<(&[u8], u16), SignError> {
    if response.len() < 2 {
        return Err(SignError::MalformedDeviceResponse(format!(
            "frame of {} bytes has no status word",
            response.len()
        )));
    }
    let (data, sw) = response.split_at(response.len() - 2);
    Ok((data, u16::from_be_bytes([sw[0], sw[1]])))
}

#[async_trait]
impl SigningBackend for HardwareDeviceSigner {
    fn kind(&self) -> BackendKind {
        BackendKind::HardwareDevice(self.transport.kind())
    }

    async fn sign(
        &self,
        payload: &SignPayload,
        account: &Account,
        _mfa: Option<&MfaProof>,
    ) -> Result<SignOutcome, SignError> {
        let input = signing_input(payload)?;
        let (ins, body, expected_len) = match (payload, &input) {
            (SignPayload::Transaction(tx), _) if matches!(tx.body(), TxBody::Evm { .. }) => {
                (INS_SIGN_EVM_TX, tx.to_typed_transaction()?.rlp().to_vec(), 65)
            }
            (_, SigningInput::Secp256k1(digest)) => (INS_SIGN_SECP_DIGEST, digest.as_bytes().to_vec(), 65),
            (_, SigningInput::Ed25519(message)) => (INS_SIGN_ED25519, message.to_vec(), 64),
        };

        // 首帧带上账户序号，设备据此选择派生路径
        let mut apdu_payload = Vec::with_capacity(4 + body.len());
        apdu_payload.extend_from_slice(&account.index.to_be_bytes());
        apdu_payload.extend_from_slice(&body);

        let session = self.transport.open_session().await?;
        let _guard = SessionGuard {
            transport: self.transport.clone(),
            session,
        };
        log_info!(
            "hardware {} opened ({:?}), streaming {} bytes",
            session,
            self.transport.kind(),
            apdu_payload.len()
        );

        let signature = self.stream(session, ins, &apdu_payload).await?;
        if signature.len() != expected_len {
            return Err(SignError::MalformedDeviceResponse(format!(
                "expected {} signature bytes, got {}",
                expected_len,
                signature.len()
            )));
        }

        Ok(SignOutcome::Signed(finalize(payload, &signature)?))
    }
}
