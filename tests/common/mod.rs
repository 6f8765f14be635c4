#![allow(dead_code)]

use async_trait::async_trait;
use ethers_core::types::{H256, U256};
use ethers_signers::{LocalWallet, Signer};
use signing_core::config::{ChainsConfig, FeeConfig, HardwareConfig};
use signing_core::errors::SignError;
use signing_core::infrastructure::device::{DeviceTransport, SessionId, TransportKind};
use signing_core::infrastructure::mpc::{
    MpcClient, MpcResponse, MpcSignRequest, StaticTokenRefresher,
};
use signing_core::infrastructure::provider::{BitcoinDraft, ChainProvider};
use signing_core::infrastructure::storage::{MemorySecureStorage, SecureStorage};
use signing_core::models::domain::{
    Account, ActiveWallet, ChainId, MfaChallenge, NormalizedTransaction, RequestStatus,
    SignedPayload, Wallet, WalletContext, WalletType,
};
use signing_core::services::approval::{ApprovalGate, ApprovalPrompt};
use signing_core::services::chain::ChainRouter;
use signing_core::services::dispatcher::RequestDispatcher;
use signing_core::services::fee::FeeEstimator;
use signing_core::services::normalizer::TransactionNormalizer;
use signing_core::services::signer::{
    HardwareDeviceSigner, LocalKeySigner, RemoteMpcSigner, SignerRegistry,
};
use signing_core::models::domain::RequestId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

/// web3 文档里的示例私钥
pub const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const CHALLENGE_ID: &str = "challenge-1";
pub const MFA_CODE: &str = "123456";

pub fn test_wallet() -> LocalWallet {
    TEST_KEY.parse().expect("valid test key")
}

pub fn test_address() -> String {
    format!("{:?}", test_wallet().address())
}

// ==================== ChainProvider ====================

pub struct MockProvider {
    pub base_fee: U256,
    pub nonce: u64,
    pub broadcasts: Mutex<Vec<SignedPayload>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            base_fee: U256::from(25_000_000_000u64),
            nonce: 7,
            broadcasts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn base_fee(&self, _chain: ChainId) -> Result<U256, SignError> {
        Ok(self.base_fee)
    }

    async fn transaction_count(&self, _chain: ChainId, _address: &str) -> Result<u64, SignError> {
        Ok(self.nonce)
    }

    async fn prepare_bitcoin_send(
        &self,
        _chain: ChainId,
        _from: &str,
        _to: &str,
        _amount_sat: u64,
        _fee_rate: u64,
    ) -> Result<BitcoinDraft, SignError> {
        Ok(BitcoinDraft {
            unsigned_tx: vec![0x02, 0x00, 0x00, 0x00].into(),
            inputs: 1,
            outputs: 2,
        })
    }

    async fn broadcast(
        &self,
        _tx: &NormalizedTransaction,
        signed: &SignedPayload,
    ) -> Result<String, SignError> {
        self.broadcasts.lock().unwrap().push(signed.clone());
        Ok("0xfeed".to_string())
    }
}

// ==================== DeviceTransport ====================

/// 会话能打开，但设备永远不应答（模拟用户迟迟不在设备上确认）
pub struct HangingTransport {
    kind: TransportKind,
    next: AtomicU64,
    pub opened: Mutex<Vec<SessionId>>,
    pub released: Mutex<Vec<SessionId>>,
}

impl HangingTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            next: AtomicU64::new(1),
            opened: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DeviceTransport for HangingTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open_session(&self) -> Result<SessionId, SignError> {
        let session = SessionId(self.next.fetch_add(1, Ordering::SeqCst));
        self.opened.lock().unwrap().push(session);
        Ok(session)
    }

    async fn exchange(&self, _session: SessionId, _frame: Vec<u8>) -> Result<Vec<u8>, SignError> {
        std::future::pending().await
    }

    fn release(&self, session: SessionId) {
        self.released.lock().unwrap().push(session);
    }
}

/// 设备对每一帧的应答
pub enum Reply {
    Frame(Vec<u8>),
    /// 设备不应答（用户没有确认）
    Hang,
    Fail(SignError),
}

impl Reply {
    /// 只有状态字的应答
    pub fn status(sw: u16) -> Self {
        Reply::Frame(sw.to_be_bytes().to_vec())
    }

    /// `data || SW1 SW2`
    pub fn data(data: &[u8], sw: u16) -> Self {
        let mut frame = data.to_vec();
        frame.extend_from_slice(&sw.to_be_bytes());
        Reply::Frame(frame)
    }
}

/// 按脚本依次应答的设备；脚本用完视为断开
pub struct ScriptedTransport {
    next: AtomicU64,
    replies: Mutex<VecDeque<Reply>>,
    pub frames: Mutex<Vec<Vec<u8>>>,
    pub opened: Mutex<Vec<SessionId>>,
    pub released: Mutex<Vec<SessionId>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            next: AtomicU64::new(1),
            replies: Mutex::new(replies.into()),
            frames: Mutex::new(Vec::new()),
            opened: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn session_released(&self) -> bool {
        let opened = self.opened.lock().unwrap().clone();
        !opened.is_empty() && *self.released.lock().unwrap() == opened
    }
}

#[async_trait]
impl DeviceTransport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn open_session(&self) -> Result<SessionId, SignError> {
        let session = SessionId(self.next.fetch_add(1, Ordering::SeqCst));
        self.opened.lock().unwrap().push(session);
        Ok(session)
    }

    async fn exchange(&self, _session: SessionId, frame: Vec<u8>) -> Result<Vec<u8>, SignError> {
        self.frames.lock().unwrap().push(frame);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Frame(frame)) => Ok(frame),
            Some(Reply::Fail(e)) => Err(e),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(SignError::DeviceDisconnected("script exhausted".into())),
        }
    }

    fn release(&self, session: SessionId) {
        self.released.lock().unwrap().push(session);
    }
}

// ==================== MpcClient ====================

/// 没有 MFA 证明时要求二次验证；证明正确时用测试私钥签名摘要
pub struct MfaMpcClient {
    pub calls: Mutex<Vec<MpcSignRequest>>,
}

impl MfaMpcClient {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MpcClient for MfaMpcClient {
    async fn sign(&self, _token: &str, request: &MpcSignRequest) -> Result<MpcResponse, SignError> {
        self.calls.lock().unwrap().push(request.clone());
        match &request.mfa {
            None => Ok(MpcResponse::MfaRequired(MfaChallenge {
                id: CHALLENGE_ID.to_string(),
                kind: "totp".to_string(),
                expires_at: None,
            })),
            Some(proof) if proof.code == MFA_CODE => {
                let digest = hex::decode(request.message.trim_start_matches("0x")).unwrap();
                let signature = test_wallet()
                    .sign_hash(H256::from_slice(&digest))
                    .unwrap();
                Ok(MpcResponse::Signed {
                    signature: signature.to_vec().into(),
                })
            }
            Some(_) => Err(SignError::NetworkError("mfa rejected".into())),
        }
    }
}

// ==================== 组装 ====================

pub struct Harness {
    pub dispatcher: Arc<RequestDispatcher>,
    pub prompts: mpsc::UnboundedReceiver<ApprovalPrompt>,
    pub wallet: Arc<ActiveWallet>,
    pub provider: Arc<MockProvider>,
    pub ledger: Arc<HangingTransport>,
    pub mpc: Arc<MfaMpcClient>,
}

impl Harness {
    /// 等待下一条审批提示（审批条目此时已经登记）
    pub async fn next_prompt(&mut self) -> ApprovalPrompt {
        tokio::time::timeout(Duration::from_secs(5), self.prompts.recv())
            .await
            .expect("approval prompt within 5s")
            .expect("prompt channel open")
    }

    pub fn no_prompt(&mut self) -> bool {
        self.prompts.try_recv().is_err()
    }

    /// 等到 Ledger 会话被打开（请求已经交给硬件后端）
    pub async fn wait_for_ledger_session(&self) {
        for _ in 0..500 {
            if !self.ledger.opened.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("ledger session was never opened");
    }

    pub async fn wait_for_status(&self, id: &RequestId, status: RequestStatus) {
        for _ in 0..500 {
            if self.dispatcher.status(id) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("request {} never reached {:?}", id, status);
    }
}

pub async fn harness(deadline: Option<Duration>) -> Harness {
    let storage = Arc::new(MemorySecureStorage::new());
    let secret = hex::decode(TEST_KEY).unwrap();
    storage
        .store("w1/0/secp256k1", Zeroizing::new(secret))
        .await
        .unwrap();

    let provider = Arc::new(MockProvider::new());
    let ledger = Arc::new(HangingTransport::new(TransportKind::Ble));
    let keystone = Arc::new(HangingTransport::new(TransportKind::Qr));
    let mpc = Arc::new(MfaMpcClient::new());

    let signers = SignerRegistry::new(
        Arc::new(LocalKeySigner::new(storage)),
        Arc::new(HardwareDeviceSigner::new(ledger.clone(), &HardwareConfig::default())),
        Arc::new(HardwareDeviceSigner::new(keystone, &HardwareConfig::default())),
        Arc::new(RemoteMpcSigner::new(
            mpc.clone(),
            Arc::new(StaticTokenRefresher::new("session-token")),
        )),
    );

    let normalizer = TransactionNormalizer::new(
        ChainRouter::new(&ChainsConfig::default(), &FeeConfig::default()),
        FeeEstimator::default(),
        provider.clone(),
    );
    let (gate, prompts) = ApprovalGate::new(deadline);
    let wallet = Arc::new(ActiveWallet::new(context(WalletType::Mnemonic)));
    let dispatcher = Arc::new(RequestDispatcher::new(
        normalizer,
        gate,
        signers,
        provider.clone(),
        wallet.clone(),
    ));

    Harness {
        dispatcher,
        prompts,
        wallet,
        provider,
        ledger,
        mpc,
    }
}

pub fn context(wallet_type: WalletType) -> WalletContext {
    WalletContext {
        wallet: Wallet {
            id: "w1".into(),
            wallet_type,
            credentials: "slot:w1".into(),
        },
        accounts: vec![Account {
            index: 0,
            wallet_id: "w1".into(),
            address_evm: test_address(),
            address_btc: "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".into(),
            address_xp: "avax1test".into(),
            address_svm: None,
        }],
        active_index: 0,
    }
}
