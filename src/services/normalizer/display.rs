// services/normalizer/display.rs

use crate::models::domain::{
    AccountAction, DisplayPayload, MessageKind, NormalizedRequest, NormalizedTransaction,
    RpcMethod, SignPayload, SigningRequest, TxBody,
};
use crate::utils::format::{format_fee, to_native_units};
use crate::utils::{bytes_to_hex, message_bytes};
use serde_json::{Value, json};

/// 消息预览最多展示的字符数
const PREVIEW_CHARS: usize = 120;

/// 审批界面需要的全部内容。`origin` 只用于展示。
pub fn build_display(
    request: &SigningRequest,
    method: RpcMethod,
    normalized: &NormalizedRequest,
) -> DisplayPayload {
    let (summary, fee, details) = match normalized {
        NormalizedRequest::Sign(SignPayload::Message(message)) => {
            let (summary, details) = match &message.kind {
                MessageKind::TypedData(version) => (
                    format!("Sign typed data ({:?})", version),
                    json!({ "from": message.from, "typedData": message.data }),
                ),
                kind => {
                    let text = message.data.as_str().unwrap_or_default();
                    let shown = match kind {
                        // solana 消息以 hex 存放，预览时尽量还原为文本
                        MessageKind::Solana => hex_preview(text),
                        _ => preview(&String::from_utf8_lossy(&message_bytes(text))),
                    };
                    (
                        format!("Sign message: {}", shown),
                        json!({ "from": message.from, "message": text, "accountIndex": message.account_index }),
                    )
                }
            };
            (summary, None, details)
        }
        NormalizedRequest::Sign(SignPayload::Transaction(tx)) => {
            let symbol = tx.chain().native_symbol();
            (
                transaction_summary(method, tx),
                Some(format_fee(tx.fee(), symbol)),
                transaction_details(tx),
            )
        }
        NormalizedRequest::Account(action) => match action {
            AccountAction::GetAccounts => ("List accounts".to_string(), None, Value::Null),
            AccountAction::SelectAccount(index) => (
                format!("Switch active account to #{}", index),
                None,
                json!({ "index": index }),
            ),
            AccountAction::CreateContact(contact) => (
                format!("Add contact \"{}\"", contact.name),
                None,
                json!(contact),
            ),
        },
    };

    DisplayPayload {
        request_id: request.id.clone(),
        method,
        chain: normalized_chain(normalized).unwrap_or_else(|| request.chain_id.clone()),
        origin: request.origin.clone(),
        summary,
        fee,
        details,
    }
}

fn normalized_chain(normalized: &NormalizedRequest) -> Option<String> {
    match normalized {
        NormalizedRequest::Sign(payload) => Some(payload.chain().to_string()),
        NormalizedRequest::Account(_) => None,
    }
}

fn transaction_summary(method: RpcMethod, tx: &NormalizedTransaction) -> String {
    let verb = if method.broadcasts() { "Send" } else { "Sign" };
    match tx.body() {
        TxBody::Evm { .. } => {
            let value = tx
                .value()
                .filter(|v| !v.is_zero())
                .map(|v| format!("{} {} ", to_native_units(v, tx.fee().unit), tx.chain().native_symbol()))
                .unwrap_or_default();
            match tx.to() {
                Some(to) => format!("{} {}to {}", verb, value, to),
                None => format!("{} contract deployment", verb),
            }
        }
        TxBody::Avalanche { alias, .. } => format!("{} {:?}-chain transaction", verb, alias),
        TxBody::Bitcoin { amount_sat, .. } => format!(
            "{} {} BTC to {}",
            verb,
            to_native_units((*amount_sat).into(), tx.fee().unit),
            tx.to().unwrap_or_default()
        ),
        TxBody::Solana { .. } => format!("{} Solana transaction", verb),
    }
}

fn transaction_details(tx: &NormalizedTransaction) -> Value {
    let mut details = json!({
        "chain": tx.chain().to_string(),
        "from": tx.from(),
        "to": tx.to(),
        "value": tx.value().map(|v| v.to_string()),
        "nonce": tx.nonce(),
        "fee": tx.fee(),
    });
    if let Some(data) = tx.data().filter(|d| !d.is_empty()) {
        details["data"] = json!(bytes_to_hex(data));
    }
    if let TxBody::Avalanche { utxos, .. } = tx.body() {
        details["utxos"] = json!(utxos);
    }
    details
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

fn hex_preview(hex_text: &str) -> String {
    match hex::decode(hex_text.trim_start_matches("0x")) {
        Ok(bytes) => preview(&String::from_utf8_lossy(&bytes)),
        Err(_) => preview(hex_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::domain::{ChainId, MessagePayload, Origin};

    #[test]
    fn personal_sign_preview_decodes_hex() {
        let request = SigningRequest::new(
            "personal_sign",
            "eip155:43114",
            json!(["0x48656c6c6f", "0xabc"]),
            Origin::in_app(),
        );
        let normalized = NormalizedRequest::Sign(SignPayload::Message(MessagePayload {
            kind: MessageKind::PersonalSign,
            chain: ChainId::Evm(43114),
            from: "0xabc".into(),
            data: json!("0x48656c6c6f"),
            password: None,
            account_index: None,
        }));

        let display = build_display(&request, RpcMethod::PersonalSign, &normalized);
        assert_eq!(display.summary, "Sign message: Hello");
        assert_eq!(display.chain, "eip155:43114");
        assert!(display.fee.is_none());
        assert_eq!(display.origin.name, "Core");
    }

    #[test]
    fn long_messages_are_truncated() {
        let long = "a".repeat(300);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 1);
        assert!(shown.ends_with('…'));
    }
}
