// services/signer/signing_input.rs

use crate::errors::SignError;
use crate::models::domain::{
    ChainId, MessageKind, MessagePayload, SignPayload, SignedPayload, TxBody, TypedDataVersion,
};
use crate::utils::{hex_to_bytes, message_bytes};
use ethers_core::types::transaction::eip712::{Eip712, TypedData};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Bytes, H256, Signature};
use ethers_core::utils::{hash_message, keccak256};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Avalanche 消息签名前缀（0x1A = 前缀长度 26）
pub const AVALANCHE_MESSAGE_PREFIX: &[u8] = b"\x1AAvalanche Signed Message:\n";

const SECP_SIGNATURE_LEN: usize = 65;
const ED25519_SIGNATURE_LEN: usize = 64;

/// 后端真正要签的东西
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningInput {
    /// secp256k1 对 32 字节摘要签名
    Secp256k1(H256),
    /// ed25519 对原始消息签名
    Ed25519(Bytes),
}

impl SigningInput {
    pub fn scheme(&self) -> &'static str {
        match self {
            SigningInput::Secp256k1(_) => "secp256k1",
            SigningInput::Ed25519(_) => "ed25519",
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            SigningInput::Secp256k1(digest) => digest.as_bytes(),
            SigningInput::Ed25519(message) => message.as_ref(),
        }
    }
}

/// 由规范化后的负载计算签名输入（三种后端共用）
pub fn signing_input(payload: &SignPayload) -> Result<SigningInput, SignError> {
    match payload {
        SignPayload::Message(message) => message_input(message),
        SignPayload::Transaction(tx) => match tx.body() {
            TxBody::Evm { .. } => Ok(SigningInput::Secp256k1(tx.to_typed_transaction()?.sighash())),
            TxBody::Avalanche { tx_bytes, .. } => Ok(SigningInput::Secp256k1(sha256(tx_bytes))),
            TxBody::Bitcoin { unsigned_tx, .. } => {
                Ok(SigningInput::Secp256k1(sha256(sha256(unsigned_tx).as_bytes())))
            }
            TxBody::Solana { serialized } => {
                let (_, message_offset) = solana_signature_slots(serialized)?;
                Ok(SigningInput::Ed25519(Bytes::from(
                    serialized[message_offset..].to_vec(),
                )))
            }
        },
    }
}

fn message_input(message: &MessagePayload) -> Result<SigningInput, SignError> {
    match message.kind {
        MessageKind::PersonalSign | MessageKind::EthSign => {
            let data = message_str(&message.data)?;
            Ok(SigningInput::Secp256k1(hash_message(message_bytes(data))))
        }
        MessageKind::TypedData(TypedDataVersion::V1) => {
            Ok(SigningInput::Secp256k1(legacy_typed_data_hash(&message.data)?))
        }
        MessageKind::TypedData(TypedDataVersion::V3 | TypedDataVersion::V4) => {
            let typed: TypedData = serde_json::from_value(message.data.clone())?;
            let digest = typed
                .encode_eip712()
                .map_err(|e| SignError::MalformedParams(format!("typed data: {}", e)))?;
            Ok(SigningInput::Secp256k1(H256::from(digest)))
        }
        MessageKind::Avalanche => {
            let body = message_bytes(message_str(&message.data)?);
            let mut prefixed = Vec::with_capacity(AVALANCHE_MESSAGE_PREFIX.len() + 4 + body.len());
            prefixed.extend_from_slice(AVALANCHE_MESSAGE_PREFIX);
            prefixed.extend_from_slice(&(body.len() as u32).to_be_bytes());
            prefixed.extend_from_slice(&body);
            Ok(SigningInput::Secp256k1(sha256(&prefixed)))
        }
        MessageKind::Solana => Ok(SigningInput::Ed25519(hex_to_bytes(message_str(
            &message.data,
        )?)?)),
    }
}

fn message_str(data: &Value) -> Result<&str, SignError> {
    data.as_str()
        .ok_or_else(|| SignError::MalformedParams("message data must be a string".into()))
}

fn sha256(bytes: &[u8]) -> H256 {
    H256::from_slice(&Sha256::digest(bytes))
}

/// eth_signTypedData v1：`[{type, name, value}]`
/// hash = keccak256(keccak256(类型声明拼接) || keccak256(值的紧凑编码拼接))
fn legacy_typed_data_hash(data: &Value) -> Result<H256, SignError> {
    let entries = data
        .as_array()
        .ok_or_else(|| SignError::MalformedParams("typed data v1 must be an array".into()))?;

    let mut schema = Vec::new();
    let mut values = Vec::new();
    for entry in entries {
        let field = |key: &str| {
            entry
                .get(key)
                .ok_or_else(|| SignError::MalformedParams(format!("typed data v1 entry missing {}", key)))
        };
        let ty = field("type")?
            .as_str()
            .ok_or_else(|| SignError::MalformedParams("typed data v1 type must be a string".into()))?;
        let name = field("name")?.as_str().unwrap_or_default();
        schema.extend_from_slice(format!("{} {}", ty, name).as_bytes());
        values.extend_from_slice(&encode_packed_value(ty, field("value")?)?);
    }

    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(&keccak256(&schema));
    preimage.extend_from_slice(&keccak256(&values));
    Ok(H256::from(keccak256(&preimage)))
}

fn encode_packed_value(ty: &str, value: &Value) -> Result<Vec<u8>, SignError> {
    let as_text = || match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let bad = || SignError::MalformedParams(format!("typed data v1: bad {} value {}", ty, value));

    if ty == "string" {
        return Ok(as_text().into_bytes());
    }
    if ty == "bytes" {
        return Ok(hex_to_bytes(&as_text())?.to_vec());
    }
    if ty == "bool" {
        return match value {
            Value::Bool(b) => Ok(vec![u8::from(*b)]),
            Value::String(s) if s == "true" || s == "false" => Ok(vec![u8::from(s == "true")]),
            _ => Err(bad()),
        };
    }
    if ty == "address" {
        let bytes = hex_to_bytes(&as_text())?;
        return if bytes.len() == 20 { Ok(bytes.to_vec()) } else { Err(bad()) };
    }
    if let Some(bits) = ty.strip_prefix("uint").or_else(|| ty.strip_prefix("int")) {
        let bits: usize = if bits.is_empty() { 256 } else { bits.parse().map_err(|_| bad())? };
        if bits == 0 || bits > 256 || bits % 8 != 0 {
            return Err(bad());
        }
        let quantity = crate::utils::parse_quantity(value, ty)?;
        let mut word = [0u8; 32];
        quantity.to_big_endian(&mut word);
        return Ok(word[32 - bits / 8..].to_vec());
    }
    if let Some(size) = ty.strip_prefix("bytes") {
        let size: usize = size.parse().map_err(|_| bad())?;
        let bytes = hex_to_bytes(&as_text())?;
        if bytes.len() > size {
            return Err(bad());
        }
        let mut padded = bytes.to_vec();
        padded.resize(size, 0);
        return Ok(padded);
    }
    Err(bad())
}

/// Solana 交易：shortvec 签名数量 + 64 字节 × n 的签名槽 + message。
/// 返回 (签名数量, message 起始偏移)
pub fn solana_signature_slots(serialized: &[u8]) -> Result<(usize, usize), SignError> {
    let mut count = 0usize;
    let mut offset = 0usize;
    loop {
        let byte = *serialized
            .get(offset)
            .ok_or_else(|| SignError::MalformedParams("truncated solana transaction".into()))?;
        count |= ((byte & 0x7f) as usize) << (7 * offset);
        offset += 1;
        if byte & 0x80 == 0 {
            break;
        }
        if offset >= 3 {
            return Err(SignError::MalformedParams("invalid shortvec length".into()));
        }
    }
    let message_offset = offset + count * ED25519_SIGNATURE_LEN;
    if count == 0 || message_offset >= serialized.len() {
        return Err(SignError::MalformedParams(
            "solana transaction has no signature slot or message".into(),
        ));
    }
    Ok((count, message_offset))
}

/// 把后端返回的原始签名整理成 `SignedPayload`。
///
/// secp256k1 签名为 `r || s || v`（v 可以是 0/1 或 27/28）；EVM 交易会在这里组装 RLP，
/// Solana 交易把签名填入第一个签名槽。
pub fn finalize(payload: &SignPayload, signature: &[u8]) -> Result<SignedPayload, SignError> {
    match payload {
        SignPayload::Message(message) => match message.kind {
            MessageKind::Solana => Ok(SignedPayload {
                signature: ed25519_signature(signature)?,
                raw_transaction: None,
            }),
            // EVM 消息签名沿用 27/28
            MessageKind::PersonalSign | MessageKind::EthSign | MessageKind::TypedData(_) => {
                let sig = secp_signature(signature)?;
                Ok(SignedPayload {
                    signature: Bytes::from(with_v(&sig, 27 + recovery_id(&sig)).to_vec()),
                    raw_transaction: None,
                })
            }
            MessageKind::Avalanche => {
                let sig = secp_signature(signature)?;
                Ok(SignedPayload {
                    signature: Bytes::from(with_v(&sig, recovery_id(&sig)).to_vec()),
                    raw_transaction: None,
                })
            }
        },
        SignPayload::Transaction(tx) => match tx.body() {
            TxBody::Evm { .. } => {
                let typed = tx.to_typed_transaction()?;
                let sig = secp_signature(signature)?;
                let sig = match (&typed, tx.chain()) {
                    // legacy 交易使用 EIP-155 v
                    (TypedTransaction::Legacy(_), ChainId::Evm(chain_id)) => {
                        with_v(&sig, eip155_v(&sig, chain_id)?)
                    }
                    _ => with_v(&sig, 27 + recovery_id(&sig)),
                };
                Ok(SignedPayload {
                    signature: Bytes::from(sig.to_vec()),
                    raw_transaction: Some(typed.rlp_signed(&sig)),
                })
            }
            TxBody::Avalanche { .. } | TxBody::Bitcoin { .. } => {
                let sig = secp_signature(signature)?;
                Ok(SignedPayload {
                    signature: Bytes::from(with_v(&sig, recovery_id(&sig)).to_vec()),
                    raw_transaction: None,
                })
            }
            TxBody::Solana { serialized } => {
                let signature = ed25519_signature(signature)?;
                let (count, message_offset) = solana_signature_slots(serialized)?;
                let first_slot = message_offset - count * ED25519_SIGNATURE_LEN;
                let mut raw = serialized.to_vec();
                raw[first_slot..first_slot + ED25519_SIGNATURE_LEN].copy_from_slice(&signature);
                Ok(SignedPayload {
                    signature,
                    raw_transaction: Some(Bytes::from(raw)),
                })
            }
        },
    }
}

fn secp_signature(raw: &[u8]) -> Result<Signature, SignError> {
    if raw.len() != SECP_SIGNATURE_LEN {
        return Err(SignError::Crypto(format!(
            "expected {} byte secp256k1 signature, got {}",
            SECP_SIGNATURE_LEN,
            raw.len()
        )));
    }
    Signature::try_from(raw).map_err(|e| SignError::Crypto(e.to_string()))
}

fn ed25519_signature(raw: &[u8]) -> Result<Bytes, SignError> {
    if raw.len() != ED25519_SIGNATURE_LEN {
        return Err(SignError::Crypto(format!(
            "expected {} byte ed25519 signature, got {}",
            ED25519_SIGNATURE_LEN,
            raw.len()
        )));
    }
    Ok(Bytes::from(raw.to_vec()))
}

/// 0 / 1
fn recovery_id(sig: &Signature) -> u64 {
    match sig.v {
        0 | 1 => sig.v,
        27 | 28 => sig.v - 27,
        // 已经是 EIP-155 形式
        v if v >= 35 => (v - 35) % 2,
        v => v % 2,
    }
}

/// `recovery_id + 35 + chain_id × 2`
fn eip155_v(sig: &Signature, chain_id: u64) -> Result<u64, SignError> {
    chain_id
        .checked_mul(2)
        .and_then(|v| v.checked_add(35 + recovery_id(sig)))
        .ok_or_else(|| SignError::Crypto(format!("chain id {} overflows EIP-155 v", chain_id)))
}

fn with_v(sig: &Signature, v: u64) -> Signature {
    Signature { r: sig.r, s: sig.s, v }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::ChainId;
    use serde_json::json;

    fn message(kind: MessageKind, data: Value) -> SignPayload {
        SignPayload::Message(MessagePayload {
            kind,
            chain: ChainId::Evm(1),
            from: "0xabc".into(),
            data,
            password: None,
            account_index: None,
        })
    }

    #[test]
    fn personal_sign_uses_eip191_hash() {
        let input = signing_input(&message(MessageKind::PersonalSign, json!("0x48656c6c6f"))).unwrap();
        assert_eq!(input, SigningInput::Secp256k1(hash_message(b"Hello")));
    }

    #[test]
    fn avalanche_message_is_prefixed_and_length_framed() {
        let input = signing_input(&message(MessageKind::Avalanche, json!("hi"))).unwrap();
        let mut expected = AVALANCHE_MESSAGE_PREFIX.to_vec();
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.extend_from_slice(b"hi");
        assert_eq!(input, SigningInput::Secp256k1(sha256(&expected)));
    }

    #[test]
    fn legacy_typed_data_hash_is_stable() {
        let data = json!([
            {"type": "string", "name": "message", "value": "Hi, Alice!"},
            {"type": "uint32", "name": "value", "value": 42}
        ]);
        let a = legacy_typed_data_hash(&data).unwrap();
        let b = legacy_typed_data_hash(&data).unwrap();
        assert_eq!(a, b);
        let other = json!([{"type": "string", "name": "message", "value": "Hi, Bob!"}]);
        assert_ne!(a, legacy_typed_data_hash(&other).unwrap());
        assert!(legacy_typed_data_hash(&json!([{"type": "uint8", "name": "x", "value": "nope"}])).is_err());
    }

    #[test]
    fn solana_slots_and_message_offset() {
        let mut tx = vec![1u8];
        tx.extend_from_slice(&[0u8; 64]);
        tx.extend_from_slice(b"message");
        assert_eq!(solana_signature_slots(&tx).unwrap(), (1, 65));
        assert!(solana_signature_slots(&[0u8]).is_err());
        assert!(solana_signature_slots(&[]).is_err());
    }

    #[test]
    fn solana_message_signature_length_is_checked() {
        let payload = SignPayload::Message(MessagePayload {
            kind: MessageKind::Solana,
            chain: ChainId::Evm(1),
            from: String::new(),
            data: json!("0x00"),
            password: None,
            account_index: None,
        });
        assert!(finalize(&payload, &[7u8; 64]).is_ok());
        assert!(finalize(&payload, &[7u8; 65]).is_err());
    }

    #[test]
    fn recovery_id_normalization() {
        let sig = |v| Signature {
            r: 1u64.into(),
            s: 2u64.into(),
            v,
        };
        assert_eq!(recovery_id(&sig(0)), 0);
        assert_eq!(recovery_id(&sig(28)), 1);
        assert_eq!(recovery_id(&sig(37)), 0);
        assert_eq!(recovery_id(&sig(38)), 1);
    }

    #[test]
    fn eip155_v_rejects_overflowing_chain_id() {
        let sig = Signature {
            r: 1u64.into(),
            s: 2u64.into(),
            v: 28,
        };
        assert_eq!(eip155_v(&sig, 43114).unwrap(), 36 + 43114 * 2);
        assert!(matches!(
            eip155_v(&sig, u64::MAX / 2 + 1),
            Err(SignError::Crypto(_))
        ));
        assert!(matches!(eip155_v(&sig, u64::MAX), Err(SignError::Crypto(_))));
    }
}
