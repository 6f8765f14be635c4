use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::info;

use crate::config::Config;
use crate::errors::AppError;
use crate::infrastructure::device::{NoDeviceTransport, TransportKind};
use crate::infrastructure::mpc::{JsonRpcMpcClient, StaticTokenRefresher};
use crate::infrastructure::provider::{ChainProvider, JsonRpcChainProvider, RetryAdapter};
use crate::infrastructure::storage::{FileSecureStorage, SecureStorage};
use crate::models::domain::{ActiveWallet, RequestId, SigningRequest};
use crate::services::approval::{ApprovalGate, ApprovalPrompt};
use crate::services::chain::ChainRouter;
use crate::services::dispatcher::RequestDispatcher;
use crate::services::fee::FeeEstimator;
use crate::services::normalizer::TransactionNormalizer;
use crate::services::signer::{
    HardwareDeviceSigner, LocalKeySigner, RemoteMpcSigner, SignerRegistry, SigningBackend,
};
use crate::startup::protocol::{InboundFrame, error_frame, prompt_frame, result_frame};
use crate::{log_error, log_info, log_warn};

/// MPC 会话 token（登录后由宿主注入）
const MPC_SESSION_TOKEN: &str = "MPC_SESSION_TOKEN";
/// 停机时两次 `cancel_all` 之间的间隔
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// 签名核心进程：stdin 收请求 / 决定，stdout 回结果 / 审批提示
pub struct Application {
    pub dispatcher: Arc<RequestDispatcher>,
    pub wallet: Arc<ActiveWallet>,
    prompts: mpsc::UnboundedReceiver<ApprovalPrompt>,
}
pub type Result<T> = std::result::Result<T, AppError>;
impl Application {
    /// 组装所有协作方，不启动任何任务
    pub async fn build(config: Config) -> Result<Self> {
        // 1. 协作方
        let storage: Arc<dyn SecureStorage> =
            Arc::new(FileSecureStorage::new(&config.storage.key_dir));
        let provider: Arc<dyn ChainProvider> = Arc::new(JsonRpcChainProvider::new(&config.rpc)?);
        info!("RPC providers initialized: {} endpoints", config.rpc.endpoints.len());

        // 2. 签名后端
        let local_key: Arc<dyn SigningBackend> = Arc::new(LocalKeySigner::new(storage));
        let ledger: Arc<dyn SigningBackend> = Arc::new(HardwareDeviceSigner::new(
            Arc::new(NoDeviceTransport::new(TransportKind::Ble)),
            &config.hardware,
        ));
        let keystone: Arc<dyn SigningBackend> = Arc::new(HardwareDeviceSigner::new(
            Arc::new(NoDeviceTransport::new(TransportKind::Qr)),
            &config.hardware,
        ));
        let token = std::env::var(MPC_SESSION_TOKEN).unwrap_or_default();
        if token.is_empty() {
            log_warn!("{} 未设置，Seedless 钱包签名会返回 RefreshFailed", MPC_SESSION_TOKEN);
        }
        let remote_mpc: Arc<dyn SigningBackend> = Arc::new(
            RemoteMpcSigner::new(
                Arc::new(JsonRpcMpcClient::new(&config.mpc.endpoint)?),
                Arc::new(StaticTokenRefresher::new(token)),
            )
            .with_retry(RetryAdapter::new(
                config.mpc.max_retries,
                Duration::from_millis(config.mpc.base_delay_millis),
            )),
        );
        let signers = SignerRegistry::new(local_key, ledger, keystone, remote_mpc);

        // 3. 路由 / 费用 / 规范化 / 审批
        let router = ChainRouter::new(&config.chains, &config.fees);
        let estimator = FeeEstimator::new(config.fees.evm_preset);
        let normalizer = TransactionNormalizer::new(router, estimator, provider.clone());
        let (gate, prompts) = ApprovalGate::new(config.approval.deadline());
        log_info!(
            "Approval deadline: {:?}, EVM fee preset: {:?}",
            config.approval.deadline(),
            config.fees.evm_preset
        );

        let wallet = Arc::new(ActiveWallet::empty());
        let dispatcher = Arc::new(RequestDispatcher::new(
            normalizer,
            gate,
            signers,
            provider,
            wallet.clone(),
        ));

        Ok(Self {
            dispatcher,
            wallet,
            prompts,
        })
    }

    /// 测试或嵌入场景下直接用已组装好的协作方
    pub fn from_parts(
        dispatcher: Arc<RequestDispatcher>,
        wallet: Arc<ActiveWallet>,
        prompts: mpsc::UnboundedReceiver<ApprovalPrompt>,
    ) -> Self {
        Self {
            dispatcher,
            wallet,
            prompts,
        }
    }

    /// 读取 stdin 直到 EOF 或 Ctrl+C
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log_warn!("Ctrl+C handler unavailable: {}", e);
                return std::future::pending().await;
            }
            log_info!("⚠️  Received shutdown signal, exiting...");
        };
        self.serve(tokio::io::stdin(), tokio::io::stdout(), shutdown)
            .await
    }

    /// 逐行处理 `input`，出站帧按顺序写入 `output`。
    /// 输入结束或 `shutdown` 完成后取消在途请求，等它们的结果帧全部写出再返回。
    pub async fn serve<R, W, S>(self, input: R, output: W, shutdown: S) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let Application {
            dispatcher,
            wallet,
            mut prompts,
        } = self;

        // 所有出站帧经同一个通道串行写入
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Value>();
        let writer = tokio::spawn(write_frames(output, out_rx));
        let mut tasks = JoinSet::new();

        log_info!("✔️ signing core ready, reading NDJSON frames");
        let mut lines = BufReader::new(input).lines();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                Some(prompt) = prompts.recv() => {
                    let _ = out_tx.send(prompt_frame(&prompt.display));
                }
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            log_info!("input closed, exiting");
                            break;
                        }
                        Err(e) => {
                            log_error!("failed to read input: {}", e);
                            break;
                        }
                    };
                    if !line.trim().is_empty() {
                        handle_line(&dispatcher, &wallet, &out_tx, &mut tasks, &line);
                    }
                }
                _ = &mut shutdown => break,
            }
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    log_error!("request task failed: {}", e);
                }
            }
        }

        drain(&dispatcher, &mut tasks).await;
        while let Ok(prompt) = prompts.try_recv() {
            let _ = out_tx.send(prompt_frame(&prompt.display));
        }
        drop(out_tx);
        if let Err(e) = writer.await {
            log_error!("frame writer failed: {}", e);
        }
        Ok(())
    }
}

async fn write_frames<W>(mut output: W, mut frames: mpsc::UnboundedReceiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let line = format!("{}\n", frame);
        if output.write_all(line.as_bytes()).await.is_err() || output.flush().await.is_err() {
            log_warn!("output closed, dropping remaining frames");
            break;
        }
    }
}

/// 停机：反复取消在途请求（包括刚登记的），直到所有请求任务都写出了结果
async fn drain(dispatcher: &RequestDispatcher, tasks: &mut JoinSet<()>) {
    while !tasks.is_empty() {
        let cancelled = dispatcher.cancel_all();
        if cancelled > 0 {
            log_info!("shutdown: cancelled {} in-flight requests", cancelled);
        }
        match timeout(DRAIN_POLL, tasks.join_next()).await {
            Ok(Some(Err(e))) => log_error!("request task failed: {}", e),
            Ok(_) | Err(_) => {}
        }
    }
}

fn handle_line(
    dispatcher: &Arc<RequestDispatcher>,
    wallet: &Arc<ActiveWallet>,
    out: &mpsc::UnboundedSender<Value>,
    tasks: &mut JoinSet<()>,
    line: &str,
) {
    let frame = match InboundFrame::parse(line) {
        Ok(frame) => frame,
        Err(e) => {
            let _ = out.send(error_frame(None, &e));
            return;
        }
    };

    match frame {
        InboundFrame::Request(inbound) => {
            let request = SigningRequest::from(inbound);
            let dispatcher = dispatcher.clone();
            let out = out.clone();
            tasks.spawn(async move {
                let id = request.id.clone();
                let frame = match dispatcher.submit(request).await {
                    Ok(result) => result_frame(&id, &result),
                    Err(e) => error_frame(Some(&id), &e),
                };
                let _ = out.send(frame);
            });
        }
        InboundFrame::Decision {
            decision,
            request_id,
        } => {
            let id = RequestId::from(request_id);
            if let Err(e) = dispatcher.resolve_approval(&id, decision) {
                let _ = out.send(error_frame(Some(&id), &e));
            }
        }
        InboundFrame::Cancel { cancel } => {
            let id = RequestId::from(cancel);
            if let Err(e) = dispatcher.cancel(&id) {
                let _ = out.send(error_frame(Some(&id), &e));
            }
        }
        InboundFrame::Mfa { mfa } => {
            let (id, proof) = mfa.into_parts();
            let dispatcher = dispatcher.clone();
            let out = out.clone();
            tasks.spawn(async move {
                let frame = match dispatcher.submit_mfa(&id, proof).await {
                    Ok(result) => result_frame(&id, &result),
                    Err(e) => error_frame(Some(&id), &e),
                };
                let _ = out.send(frame);
            });
        }
        InboundFrame::Pending { .. } => {
            let displays = dispatcher.gate().displays();
            log_info!("re-sending {} pending approvals", displays.len());
            for display in &displays {
                let _ = out.send(prompt_frame(display));
            }
        }
        InboundFrame::Wallet { wallet: context } => {
            log_info!(
                "active wallet switched to {} ({:?}, {} accounts)",
                context.wallet.id,
                context.wallet.wallet_type,
                context.accounts.len()
            );
            wallet.switch(context);
        }
    }
}
