// services/dispatcher/request_dispatcher.rs
//
// 一次签名请求的完整生命周期：
//   入口校验 -> 规范化 -> 审批 -> 选择后端 -> 签名 -> （发送类方法）广播
// 每个请求只会到达一个终态，`submit` 返回的 future 只结束一次。

use crate::errors::SignError;
use crate::infrastructure::provider::ChainProvider;
use crate::models::domain::{
    Account, AccountAction, ActiveWallet, MessageKind, MfaChallenge, MfaProof, NormalizedRequest,
    RequestId, RequestStatus, RpcMethod, SignPayload, SignResult, SignedPayload, SigningRequest,
    WalletContext,
};
use crate::services::approval::{ApprovalGate, Decision, UserDecision};
use crate::services::chain::ChainRules;
use crate::services::normalizer::{TransactionNormalizer, build_display};
use crate::services::signer::{SignOutcome, SignerRegistry, SigningBackend};
use crate::utils::{bytes_to_hex, to_cb58};
use crate::{log_debug, log_error, log_info, log_warn};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::oneshot;

/// 审批通过后确定下来的签名任务
struct SigningJob {
    method: RpcMethod,
    payload: SignPayload,
    account: Account,
    backend: Arc<dyn SigningBackend>,
}

/// 等待 MFA 证明的签名现场。续签时不再重新审批，也不再重新快照钱包。
struct ParkedSigning {
    job: SigningJob,
    challenge: MfaChallenge,
}

struct RequestEntry {
    status: RequestStatus,
    cancel: Option<oneshot::Sender<()>>,
    parked: Option<ParkedSigning>,
}

type PendingRequests = Mutex<HashMap<RequestId, RequestEntry>>;

pub struct RequestDispatcher {
    normalizer: TransactionNormalizer,
    gate: ApprovalGate,
    signers: SignerRegistry,
    provider: Arc<dyn ChainProvider>,
    wallet: Arc<ActiveWallet>,
    pending: Arc<PendingRequests>,
}

/// 请求的 future 结束（或被 drop）时把条目移出 pending 集合；
/// 停在 MFA 的请求会被 `keep` 保留下来。
struct EntryGuard<'a> {
    pending: &'a PendingRequests,
    id: RequestId,
    keep: bool,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if !self.keep {
            lock(self.pending).remove(&self.id);
        }
    }
}

fn lock(pending: &PendingRequests) -> MutexGuard<'_, HashMap<RequestId, RequestEntry>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl RequestDispatcher {
    pub fn new(
        normalizer: TransactionNormalizer,
        gate: ApprovalGate,
        signers: SignerRegistry,
        provider: Arc<dyn ChainProvider>,
        wallet: Arc<ActiveWallet>,
    ) -> Self {
        Self {
            normalizer,
            gate,
            signers,
            provider,
            wallet,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 使用进程级活跃钱包（在 `Approved` 时快照一次）
    pub async fn submit(&self, request: SigningRequest) -> Result<SignResult, SignError> {
        self.submit_inner(request, None).await
    }

    /// 使用调用方给定的钱包上下文，不读取活跃钱包
    pub async fn submit_with_context(
        &self,
        request: SigningRequest,
        context: WalletContext,
    ) -> Result<SignResult, SignError> {
        self.submit_inner(request, Some(Arc::new(context))).await
    }

    pub fn resolve_approval(&self, id: &RequestId, decision: UserDecision) -> Result<(), SignError> {
        self.gate.resolve(id, decision)
    }

    /// 取消在途请求：正在等待审批或签名的请求以 `Cancelled` 结束，
    /// 停在 MFA 的请求直接移除。
    pub fn cancel(&self, id: &RequestId) -> Result<(), SignError> {
        let mut pending = lock(&self.pending);
        let Some(entry) = pending.get_mut(id) else {
            return Err(SignError::StaleResolution(id.to_string()));
        };

        if entry.parked.is_some() {
            let from = entry.status;
            pending.remove(id);
            log_info!("request {} cancelled while waiting for MFA ({:?} -> Cancelled)", id, from);
            return Ok(());
        }
        match entry.cancel.take() {
            Some(cancel) => {
                let _ = cancel.send(());
                log_info!("request {} cancellation requested", id);
                Ok(())
            }
            None => Err(SignError::StaleResolution(id.to_string())),
        }
    }

    /// 带着 MFA 证明续签一个停在 `Signing` 的请求
    pub async fn submit_mfa(
        &self,
        id: &RequestId,
        proof: MfaProof,
    ) -> Result<SignResult, SignError> {
        let (parked, cancel_rx) = {
            let mut pending = lock(&self.pending);
            let Some(entry) = pending.get_mut(id) else {
                return Err(SignError::StaleResolution(id.to_string()));
            };
            let Some(parked) = entry.parked.take() else {
                return Err(SignError::StaleResolution(id.to_string()));
            };
            if parked.challenge.id != proof.challenge_id {
                let expected = parked.challenge.id.clone();
                entry.parked = Some(parked);
                return Err(SignError::MalformedParams(format!(
                    "MFA proof is for challenge {}, expected {}",
                    proof.challenge_id, expected
                )));
            }
            let (cancel_tx, cancel_rx) = oneshot::channel();
            entry.cancel = Some(cancel_tx);
            (parked, cancel_rx)
        };
        log_info!("request {} resuming with MFA proof", id);

        let mut guard = EntryGuard {
            pending: &self.pending,
            id: id.clone(),
            keep: false,
        };
        let result = tokio::select! {
            biased;
            Ok(()) = cancel_rx => Err(SignError::Cancelled),
            result = self.sign_and_deliver(id, parked.job, Some(&proof)) => result,
        };
        self.finish(id, &result, &mut guard);
        result
    }

    /// 停机时取消全部在途请求，返回被取消的数量
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<RequestId> = lock(&self.pending).keys().cloned().collect();
        ids.iter().filter(|id| self.cancel(id).is_ok()).count()
    }

    pub fn status(&self, id: &RequestId) -> Option<RequestStatus> {
        lock(&self.pending).get(id).map(|entry| entry.status)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// UI 重连时补发仍在等待的审批
    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    async fn submit_inner(
        &self,
        request: SigningRequest,
        explicit: Option<Arc<WalletContext>>,
    ) -> Result<SignResult, SignError> {
        let (method, rules) = match self.intake(&request) {
            Ok(checked) => checked,
            Err(e) => {
                log_warn!("request {} rejected at intake (Received -> Failed): {}", request.id, e);
                return Err(e);
            }
        };
        let cancel_rx = self.register(&request.id)?;
        let mut guard = EntryGuard {
            pending: &self.pending,
            id: request.id.clone(),
            keep: false,
        };
        log_info!(
            "request {} received: {} on {} from {}",
            request.id,
            method,
            rules.chain,
            request.origin.url
        );

        let result = tokio::select! {
            biased;
            Ok(()) = cancel_rx => Err(SignError::Cancelled),
            result = self.pipeline(&request, method, rules, explicit) => result,
        };
        self.finish(&request.id, &result, &mut guard);
        result
    }

    /// 方法 -> 链 -> 方法与链是否匹配
    fn intake(&self, request: &SigningRequest) -> Result<(RpcMethod, ChainRules), SignError> {
        let method: RpcMethod = request.method.parse()?;
        let router = self.normalizer.router();
        let rules = router.resolve(&request.chain_id)?;
        router.check_method(method, &rules)?;
        Ok((method, rules))
    }

    /// 同一个 id 在途时拒绝，且不影响在途的那个请求
    fn register(&self, id: &RequestId) -> Result<oneshot::Receiver<()>, SignError> {
        let mut pending = lock(&self.pending);
        if pending.contains_key(id) {
            return Err(SignError::DuplicateRequest(id.to_string()));
        }
        let (cancel_tx, cancel_rx) = oneshot::channel();
        pending.insert(
            id.clone(),
            RequestEntry {
                status: RequestStatus::Received,
                cancel: Some(cancel_tx),
                parked: None,
            },
        );
        Ok(cancel_rx)
    }

    async fn pipeline(
        &self,
        request: &SigningRequest,
        method: RpcMethod,
        rules: ChainRules,
        explicit: Option<Arc<WalletContext>>,
    ) -> Result<SignResult, SignError> {
        let id = &request.id;

        // 比特币草稿需要在审批前确定找零地址，这里读到的上下文只用于规范化
        let intake_context = explicit.clone().or_else(|| self.wallet.snapshot());
        let normalized = self
            .normalizer
            .normalize(method, &request.raw_params, &rules, intake_context.as_deref())
            .await?;
        self.advance(id, RequestStatus::Normalized);

        if let NormalizedRequest::Account(AccountAction::GetAccounts) = normalized {
            let accounts = intake_context
                .map(|ctx| ctx.accounts.clone())
                .unwrap_or_default();
            return Ok(SignResult::Accounts(accounts));
        }

        let display = build_display(request, method, &normalized);
        let decision = self.gate.request(id, display)?;
        self.advance(id, RequestStatus::AwaitingApproval);

        match decision.wait().await {
            Decision::Approve => self.advance(id, RequestStatus::Approved),
            Decision::Reject => return Err(SignError::UserRejected),
            Decision::Timeout => return Err(SignError::ApprovalTimeout),
            Decision::Cancelled => return Err(SignError::Cancelled),
        }

        // 审批通过后只快照一次，之后切换钱包不影响本请求
        let context = explicit.or_else(|| self.wallet.snapshot());
        match normalized {
            NormalizedRequest::Account(AccountAction::SelectAccount(index)) => {
                self.select_account(context, index)
            }
            NormalizedRequest::Account(AccountAction::CreateContact(contact)) => {
                log_info!("request {}: contact {} created", id, contact.id);
                Ok(SignResult::ContactCreated(contact))
            }
            NormalizedRequest::Account(AccountAction::GetAccounts) => Ok(SignResult::Accounts(
                context.map(|ctx| ctx.accounts.clone()).unwrap_or_default(),
            )),
            NormalizedRequest::Sign(payload) => {
                let context = context.ok_or_else(|| {
                    SignError::KeyNotFound("no active wallet".into()).into_signing_failed()
                })?;
                let account = signing_account(&context, &payload)
                    .map_err(SignError::into_signing_failed)?
                    .clone();
                let backend = self.signers.select_backend(context.wallet.wallet_type);
                log_debug!(
                    "request {}: wallet {} ({:?}) -> {:?}, account #{}",
                    id,
                    context.wallet.id,
                    context.wallet.wallet_type,
                    backend.kind(),
                    account.index
                );

                self.advance(id, RequestStatus::Signing);
                let job = SigningJob {
                    method,
                    payload,
                    account,
                    backend,
                };
                self.sign_and_deliver(id, job, None).await
            }
        }
    }

    /// 调用后端签名；需要 MFA 时把现场停在 pending 条目里
    async fn sign_and_deliver(
        &self,
        id: &RequestId,
        job: SigningJob,
        mfa: Option<&MfaProof>,
    ) -> Result<SignResult, SignError> {
        let outcome = job
            .backend
            .sign(&job.payload, &job.account, mfa)
            .await
            .map_err(SignError::into_signing_failed)?;

        match outcome {
            SignOutcome::Signed(signed) => self.deliver(job.method, &job.payload, signed).await,
            SignOutcome::NeedsMfa(challenge) => {
                log_info!("request {} needs MFA ({} challenge {})", id, challenge.kind, challenge.id);
                {
                    let mut pending = lock(&self.pending);
                    if let Some(entry) = pending.get_mut(id) {
                        entry.cancel = None;
                        entry.parked = Some(ParkedSigning {
                            job,
                            challenge: challenge.clone(),
                        });
                    }
                }
                if let Some(after) = mfa_deadline(&challenge, self.gate.deadline()) {
                    expire_parked(Arc::downgrade(&self.pending), id.clone(), challenge.id.clone(), after);
                }
                Ok(SignResult::MfaRequired {
                    request_id: id.clone(),
                    challenge,
                })
            }
        }
    }

    /// 发送类方法广播并返回交易哈希，其余返回签名
    async fn deliver(
        &self,
        method: RpcMethod,
        payload: &SignPayload,
        signed: SignedPayload,
    ) -> Result<SignResult, SignError> {
        match payload {
            SignPayload::Transaction(tx) if method.broadcasts() => {
                let hash = self
                    .provider
                    .broadcast(tx, &signed)
                    .await
                    .map_err(|e| match e {
                        SignError::BroadcastFailed(_) => e,
                        other => SignError::BroadcastFailed(other.to_string()),
                    })?;
                Ok(SignResult::TxHash(hash))
            }
            SignPayload::Transaction(_) => Ok(SignResult::SignedTransaction {
                signature: bytes_to_hex(&signed.signature),
                raw: signed.raw_transaction.as_ref().map(|raw| bytes_to_hex(raw)),
            }),
            // avalanche_signMessage 的签名按 cb58 返回
            SignPayload::Message(message) if message.kind == MessageKind::Avalanche => {
                Ok(SignResult::Signature(to_cb58(&signed.signature)))
            }
            SignPayload::Message(_) => Ok(SignResult::Signature(bytes_to_hex(&signed.signature))),
        }
    }

    fn select_account(
        &self,
        context: Option<Arc<WalletContext>>,
        index: u32,
    ) -> Result<SignResult, SignError> {
        let context =
            context.ok_or_else(|| SignError::MalformedParams("no active wallet".into()))?;
        if context.account_by_index(index).is_none() {
            return Err(SignError::MalformedParams(format!("account #{} does not exist", index)));
        }
        // 只有活跃钱包本身才会被切换；显式上下文由调用方自己管理
        if self
            .wallet
            .snapshot()
            .is_some_and(|active| active.wallet.id == context.wallet.id)
        {
            let mut next = (*context).clone();
            next.active_index = index;
            self.wallet.switch(next);
        }
        Ok(SignResult::AccountSelected(index))
    }

    /// 结果 -> 终态。MFA 挑战不是终态，条目保留等待 `submit_mfa`。
    fn finish(&self, id: &RequestId, result: &Result<SignResult, SignError>, guard: &mut EntryGuard<'_>) {
        let terminal = match result {
            Ok(SignResult::MfaRequired { .. }) => {
                guard.keep = true;
                return;
            }
            Ok(_) => RequestStatus::Completed,
            Err(SignError::UserRejected) => RequestStatus::Rejected,
            Err(SignError::ApprovalTimeout) => RequestStatus::TimedOut,
            Err(SignError::Cancelled) => RequestStatus::Cancelled,
            Err(_) => RequestStatus::Failed,
        };
        self.advance(id, terminal);
        match result {
            Ok(_) => log_info!("request {} completed", id),
            Err(e) => log_warn!("request {} ended as {:?}: {}", id, terminal, e),
        }
    }

    /// 只允许向前推进；非法跳转属于编程错误
    fn advance(&self, id: &RequestId, next: RequestStatus) {
        let mut pending = lock(&self.pending);
        let Some(entry) = pending.get_mut(id) else {
            return;
        };
        match entry.status.advance(next) {
            Ok(status) => {
                log_debug!("request {}: {:?} -> {:?}", id, entry.status, status);
                entry.status = status;
            }
            Err(e) => {
                log_error!("request {}: {}", id, e);
                debug_assert!(false, "request {}: {}", id, e);
            }
        }
    }
}

/// MFA 挑战的有效期：挑战自带的过期时间优先，否则沿用审批期限
fn mfa_deadline(challenge: &MfaChallenge, fallback: Option<Duration>) -> Option<Duration> {
    match challenge.expires_at {
        Some(expires_at) => Some((expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)),
        None => fallback,
    }
}

/// 到期后仍停在同一个挑战上的请求以 `TimedOut` 结束
fn expire_parked(pending: Weak<PendingRequests>, id: RequestId, challenge_id: String, after: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let Some(pending) = pending.upgrade() else {
            return;
        };
        let mut pending = lock(&pending);
        let still_parked = pending
            .get(&id)
            .and_then(|entry| entry.parked.as_ref())
            .is_some_and(|parked| parked.challenge.id == challenge_id);
        if !still_parked {
            return;
        }
        if let Some(entry) = pending.remove(&id) {
            match entry.status.advance(RequestStatus::TimedOut) {
                Ok(_) => log_warn!(
                    "request {} ended as TimedOut: MFA challenge {} expired after {:?}",
                    id,
                    challenge_id,
                    after
                ),
                Err(e) => log_error!("request {}: {}", id, e),
            }
        }
    });
}

/// 签名账户：显式账户序号 > `from` 地址 > 当前活跃账户
fn signing_account<'a>(
    context: &'a WalletContext,
    payload: &SignPayload,
) -> Result<&'a Account, SignError> {
    let vm = payload.chain().vm();
    let by_index = match payload {
        SignPayload::Message(message) => message.account_index,
        SignPayload::Transaction(_) => None,
    };

    let account = match (by_index, payload.from()) {
        (Some(index), _) => context.account_by_index(index),
        (None, "") => context.active_account(),
        (None, from) => context.account_by_address(vm, from),
    };
    account.ok_or_else(|| {
        SignError::KeyNotFound(match (by_index, payload.from()) {
            (Some(index), _) => format!("account #{} in wallet {}", index, context.wallet.id),
            (None, "") => format!("active account in wallet {}", context.wallet.id),
            (None, from) => format!("{} in wallet {}", from, context.wallet.id),
        })
    })
}
