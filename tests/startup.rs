mod common;

use common::{Harness, harness, test_address};
use serde_json::{Value, json};
use signing_core::errors::SignError;
use signing_core::startup::Application;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, duplex};

fn line(frame: Value) -> Vec<u8> {
    format!("{}\n", frame).into_bytes()
}

fn personal_sign(id: &str) -> Vec<u8> {
    line(json!({
        "id": id,
        "method": "personal_sign",
        "params": ["0x48656c6c6f", test_address()],
        "chainId": "eip155:43114",
    }))
}

async fn application() -> Application {
    let Harness {
        dispatcher,
        prompts,
        wallet,
        ..
    } = harness(None).await;
    Application::from_parts(dispatcher, wallet, prompts)
}

async fn next_frame(lines: &mut Lines<BufReader<DuplexStream>>) -> Option<Value> {
    let line = lines.next_line().await.unwrap()?;
    Some(serde_json::from_str(&line).unwrap())
}

fn is_approval_for(frame: &Value, id: &str) -> bool {
    frame["approval"]["requestId"] == id
}

fn answer_for<'a>(frames: &'a [Value], id: &str) -> &'a Value {
    frames
        .iter()
        .find(|frame| frame["id"] == id)
        .unwrap_or_else(|| panic!("no answer for {} in {:?}", id, frames))
}

#[tokio::test]
async fn input_eof_flushes_every_in_flight_answer() {
    let app = application().await;
    let (mut input, server_in) = duplex(4096);
    let (server_out, client_out) = duplex(64 * 1024);

    let client = async move {
        let accounts = json!({
            "id": "r1",
            "method": "avalanche_getAccounts",
            "params": [],
            "chainId": "eip155:43114",
        });
        input.write_all(&line(accounts)).await.unwrap();
        input.write_all(&personal_sign("r2")).await.unwrap();

        let mut lines = BufReader::new(client_out).lines();
        let mut frames = Vec::new();
        // 等到 r1 已经应答、r2 停在审批上再关闭输入
        while !(frames.iter().any(|f: &Value| f["id"] == "r1")
            && frames.iter().any(|f| is_approval_for(f, "r2")))
        {
            frames.push(next_frame(&mut lines).await.expect("frame before EOF"));
        }
        drop(input);
        while let Some(frame) = next_frame(&mut lines).await {
            frames.push(frame);
        }
        frames
    };

    let (served, frames) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(app.serve(server_in, server_out, std::future::pending()), client)
    })
    .await
    .expect("serve returns after input EOF");
    served.unwrap();

    let accounts = answer_for(&frames, "r1");
    assert_eq!(accounts["result"].as_array().map(Vec::len), Some(1));

    let cancelled = answer_for(&frames, "r2");
    assert_eq!(cancelled["error"]["message"], SignError::Cancelled.to_string());
    assert_eq!(cancelled["error"]["code"], -32603);
}

#[tokio::test]
async fn pending_frame_resends_waiting_approvals() {
    let app = application().await;
    let (mut input, server_in) = duplex(4096);
    let (server_out, client_out) = duplex(64 * 1024);

    let client = async move {
        input.write_all(&personal_sign("r1")).await.unwrap();
        let mut lines = BufReader::new(client_out).lines();
        let first = next_frame(&mut lines).await.expect("approval prompt");
        assert!(is_approval_for(&first, "r1"));

        // UI 重连
        input.write_all(&line(json!({ "pending": true }))).await.unwrap();
        let again = next_frame(&mut lines).await.expect("re-sent prompt");
        assert_eq!(again, first);

        drop(input);
        let mut rest = Vec::new();
        while let Some(frame) = next_frame(&mut lines).await {
            rest.push(frame);
        }
        rest
    };

    let (served, rest) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(app.serve(server_in, server_out, std::future::pending()), client)
    })
    .await
    .expect("serve returns after input EOF");
    served.unwrap();

    assert_eq!(rest.len(), 1);
    assert_eq!(answer_for(&rest, "r1")["error"]["message"], SignError::Cancelled.to_string());
}

#[tokio::test]
async fn shutdown_signal_cancels_waiting_requests() {
    let app = application().await;
    let (mut input, server_in) = duplex(4096);
    let (server_out, client_out) = duplex(64 * 1024);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let shutdown = async move {
        let _ = stop_rx.await;
    };

    let client = async move {
        input.write_all(&personal_sign("r1")).await.unwrap();
        let mut lines = BufReader::new(client_out).lines();
        let prompt = next_frame(&mut lines).await.expect("approval prompt");
        assert!(is_approval_for(&prompt, "r1"));

        // 输入仍然打开，靠停机信号退出
        let _ = stop_tx.send(());
        let mut rest = Vec::new();
        while let Some(frame) = next_frame(&mut lines).await {
            rest.push(frame);
        }
        drop(input);
        rest
    };

    let (served, rest) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(app.serve(server_in, server_out, shutdown), client)
    })
    .await
    .expect("serve returns after shutdown");
    served.unwrap();

    assert_eq!(answer_for(&rest, "r1")["error"]["message"], SignError::Cancelled.to_string());
}
