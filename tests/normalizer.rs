mod common;

use common::{MockProvider, context, test_address};
use ethers_core::types::U256;
use serde_json::{Value, json};
use signing_core::config::{ChainsConfig, FeeConfig};
use signing_core::errors::SignError;
use signing_core::models::domain::{
    ChainAlias, ChainId, FeeUnit, MessageKind, NormalizedRequest, NormalizedTransaction, Origin,
    RpcMethod, SignPayload, SigningRequest, TxBody, WalletType,
};
use signing_core::services::chain::ChainRouter;
use signing_core::services::fee::{FeeEstimator, bitcoin_vsize};
use signing_core::services::normalizer::{TransactionNormalizer, build_display};
use std::sync::Arc;

fn normalizer() -> TransactionNormalizer {
    TransactionNormalizer::new(
        ChainRouter::new(&ChainsConfig::default(), &FeeConfig::default()),
        FeeEstimator::default(),
        Arc::new(MockProvider::new()),
    )
}

async fn normalize(
    normalizer: &TransactionNormalizer,
    method: RpcMethod,
    chain: &str,
    params: Value,
) -> Result<NormalizedRequest, SignError> {
    let rules = normalizer.router().resolve(chain)?;
    normalizer
        .normalize(method, &params, &rules, Some(&context(WalletType::Mnemonic)))
        .await
}

fn transaction(normalized: NormalizedRequest) -> NormalizedTransaction {
    match normalized {
        NormalizedRequest::Sign(SignPayload::Transaction(tx)) => tx,
        other => panic!("expected a transaction, got {:?}", other),
    }
}

#[tokio::test]
async fn cchain_atomic_transaction_fee() {
    let normalizer = normalizer();
    let params = json!({
        "transactionHex": format!("0x{}", "00".repeat(200)),
        "chainAlias": "C",
    });
    let normalized = normalize(&normalizer, RpcMethod::AvalancheSendTransaction, "eip155:43114", params)
        .await
        .unwrap();
    let tx = transaction(normalized.clone());

    assert_eq!(tx.chain(), ChainId::Evm(43114));
    // 25 × (200 + 1000 × 1 + 10000)
    assert_eq!(tx.fee().total, U256::from(280_000u64));
    assert_eq!(tx.fee().unit, FeeUnit::NanoAvax);
    assert!(matches!(tx.body(), TxBody::Avalanche { alias: ChainAlias::C, .. }));

    let request = SigningRequest::new(
        "avalanche_sendTransaction",
        "eip155:43114",
        json!({}),
        Origin::in_app(),
    );
    let display = build_display(&request, RpcMethod::AvalancheSendTransaction, &normalized);
    assert_eq!(display.fee.as_deref(), Some("280,000 nAVAX (0.00028 AVAX)"));
    assert_eq!(display.summary, "Send C-chain transaction");
}

#[tokio::test]
async fn personal_sign_keeps_message_and_signer() {
    let normalizer = normalizer();
    let normalized = normalize(
        &normalizer,
        RpcMethod::PersonalSign,
        "eip155:1",
        json!(["0x48656c6c6f", test_address()]),
    )
    .await
    .unwrap();

    let NormalizedRequest::Sign(SignPayload::Message(message)) = normalized else {
        panic!("expected a message payload");
    };
    assert_eq!(message.kind, MessageKind::PersonalSign);
    assert_eq!(message.chain, ChainId::Evm(1));
    assert_eq!(message.from, test_address());
    assert_eq!(message.data, json!("0x48656c6c6f"));
}

#[tokio::test]
async fn evm_fee_is_deterministic_and_uses_provider_nonce() {
    let normalizer = normalizer();
    let params = json!([{
        "from": test_address(),
        "to": "0x000000000000000000000000000000000000dEaD",
        "gas": "0x5208",
    }]);

    let first = transaction(
        normalize(&normalizer, RpcMethod::EthSendTransaction, "eip155:43114", params.clone())
            .await
            .unwrap(),
    );
    let second = transaction(
        normalize(&normalizer, RpcMethod::EthSendTransaction, "eip155:43114", params)
            .await
            .unwrap(),
    );

    assert_eq!(first.fee(), second.fee());
    // 21000 × (25 gwei × 120%)
    assert_eq!(first.fee().total, U256::from(630_000_000_000_000u64));
    assert_eq!(first.nonce(), Some(7));
}

#[tokio::test]
async fn explicit_gas_price_wins_over_base_fee() {
    let normalizer = normalizer();
    let params = json!([{
        "from": test_address(),
        "to": "0x000000000000000000000000000000000000dEaD",
        "gas": "0x5208",
        "gasPrice": "0x3b9aca00",
        "nonce": "0x2",
    }]);
    let tx = transaction(
        normalize(&normalizer, RpcMethod::EthSendTransaction, "eip155:1", params)
            .await
            .unwrap(),
    );

    assert_eq!(tx.fee().total, U256::from(21_000_000_000_000u64));
    assert_eq!(tx.nonce(), Some(2));
}

#[tokio::test]
async fn bitcoin_send_prices_the_provider_draft() {
    let normalizer = normalizer();
    let tx = transaction(
        normalize(
            &normalizer,
            RpcMethod::BitcoinSendTransaction,
            "bitcoin:mainnet",
            json!(["bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq", 15_000, 10]),
        )
        .await
        .unwrap(),
    );

    // 1 输入 2 输出
    let vsize = bitcoin_vsize(1, 2).unwrap();
    assert_eq!(vsize, 141);
    assert_eq!(tx.fee().total, U256::from(10 * vsize));
    assert_eq!(tx.fee().unit, FeeUnit::Satoshi);
    assert_eq!(tx.from(), "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq");
}

#[tokio::test]
async fn malformed_params_are_rejected() {
    let normalizer = normalizer();

    let no_gas = normalize(
        &normalizer,
        RpcMethod::EthSendTransaction,
        "eip155:1",
        json!([{ "from": test_address(), "to": test_address() }]),
    )
    .await;
    assert!(matches!(no_gas, Err(SignError::MalformedParams(detail)) if detail.contains("gas")));

    let empty_hex = normalize(
        &normalizer,
        RpcMethod::AvalancheSendTransaction,
        "eip155:43114",
        json!({ "transactionHex": "0x", "chainAlias": "X" }),
    )
    .await;
    assert!(matches!(empty_hex, Err(SignError::MalformedParams(_))));

    let bad_address = normalize(
        &normalizer,
        RpcMethod::BitcoinSendTransaction,
        "bitcoin:mainnet",
        json!(["tb1qnotmainnet", 1_000, 5]),
    )
    .await;
    assert!(matches!(bad_address, Err(SignError::MalformedParams(_))));
}
