use crate::errors::SignError;
use ethers_core::types::{Bytes, U256};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn strip_0x(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

/// 十六进制字符串（可带 0x）转字节
pub fn hex_to_bytes(raw: &str) -> Result<Bytes, SignError> {
    let body = strip_0x(raw.trim());
    // 奇数长度按左补 0 处理（部分 dApp 会传 0x1 这种）
    let decoded = if body.len() % 2 == 1 {
        hex::decode(format!("0{}", body))?
    } else {
        hex::decode(body)?
    };
    Ok(Bytes::from(decoded))
}

pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// JSON-RPC quantity：`"0x5208"`、十进制字符串或 JSON 数字都接受
pub fn parse_quantity(value: &Value, field: &str) -> Result<U256, SignError> {
    match value {
        Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => {
            let body = strip_0x(s);
            if body.is_empty() {
                return Ok(U256::zero());
            }
            U256::from_str_radix(body, 16)
                .map_err(|e| SignError::MalformedParams(format!("{}: invalid hex quantity {}: {}", field, s, e)))
        }
        Value::String(s) => U256::from_dec_str(s.trim())
            .map_err(|e| SignError::MalformedParams(format!("{}: invalid quantity {}: {}", field, s, e))),
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| SignError::MalformedParams(format!("{}: quantity must be a non-negative integer", field))),
        _ => Err(SignError::MalformedParams(format!("{}: expected quantity, got {}", field, value))),
    }
}

pub fn parse_u64(value: &Value, field: &str) -> Result<u64, SignError> {
    let quantity = parse_quantity(value, field)?;
    if quantity > U256::from(u64::MAX) {
        return Err(SignError::MalformedParams(format!("{}: {} exceeds u64", field, quantity)));
    }
    Ok(quantity.as_u64())
}

/// personal_sign / eth_sign 的消息：0x 开头按十六进制解码，否则按 UTF-8 原文签名
pub fn message_bytes(data: &str) -> Vec<u8> {
    if data.starts_with("0x") {
        if let Ok(bytes) = hex::decode(strip_0x(data)) {
            return bytes;
        }
    }
    data.as_bytes().to_vec()
}

/// Avalanche 的 cb58：`base58(bytes || sha256(bytes)[28..32])`
pub fn to_cb58(bytes: &[u8]) -> String {
    let checksum = Sha256::digest(bytes);
    let mut payload = Vec::with_capacity(bytes.len() + 4);
    payload.extend_from_slice(bytes);
    payload.extend_from_slice(&checksum[checksum.len() - 4..]);
    bs58::encode(payload).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quantities_in_all_encodings() {
        assert_eq!(parse_quantity(&json!("0x5208"), "gas").unwrap(), U256::from(21000));
        assert_eq!(parse_quantity(&json!("21000"), "gas").unwrap(), U256::from(21000));
        assert_eq!(parse_quantity(&json!(21000), "gas").unwrap(), U256::from(21000));
        assert_eq!(parse_quantity(&json!("0x"), "value").unwrap(), U256::zero());
        assert!(parse_quantity(&json!(-1), "gas").is_err());
        assert!(parse_quantity(&json!(null), "gas").is_err());
        assert!(parse_u64(&json!("0x10000000000000000"), "nonce").is_err());
    }

    #[test]
    fn hex_and_text_messages() {
        assert_eq!(message_bytes("0x48656c6c6f"), b"Hello".to_vec());
        assert_eq!(message_bytes("hello message"), b"hello message".to_vec());
        assert_eq!(hex_to_bytes("0x1").unwrap().to_vec(), vec![1u8]);
        assert!(hex_to_bytes("0xzz").is_err());
    }

    #[test]
    fn cb58_matches_avalanche_encoding() {
        assert_eq!(to_cb58(b"Hello world"), "32UWxgjUJd9s6Kyvxjj1u");
        assert_eq!(
            to_cb58(&(0u8..32).collect::<Vec<_>>()),
            "16qJFWMMHFy3xDdLmvUeyc2S6FrWRhJP51HsvDYdz9cWcm5W"
        );
    }
}
