// services/approval/approval_gate.rs

use crate::errors::SignError;
use crate::models::domain::{DisplayPayload, RequestId};
use crate::{log_debug, log_info, log_warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

/// UI 给出的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserDecision {
    Approve,
    Reject,
}

/// 等待方看到的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Timeout,
    Cancelled,
}

impl From<UserDecision> for Decision {
    fn from(decision: UserDecision) -> Self {
        match decision {
            UserDecision::Approve => Decision::Approve,
            UserDecision::Reject => Decision::Reject,
        }
    }
}

/// 推送给 UI 的审批提示
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalPrompt {
    pub request_id: RequestId,
    pub display: DisplayPayload,
}

struct PendingApproval {
    sender: oneshot::Sender<Decision>,
    display: DisplayPayload,
}

type PendingMap = Arc<Mutex<HashMap<RequestId, PendingApproval>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<RequestId, PendingApproval>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

/// 挂起中的审批。插入、移除都在同一把锁下完成，
/// 超时和 `resolve` 只会有一方拿到条目。
pub struct ApprovalGate {
    pending: PendingMap,
    prompts: mpsc::UnboundedSender<ApprovalPrompt>,
    deadline: Option<Duration>,
}

impl ApprovalGate {
    /// `deadline = None` 表示一直等待 UI
    pub fn new(deadline: Option<Duration>) -> (Self, mpsc::UnboundedReceiver<ApprovalPrompt>) {
        let (prompts, receiver) = mpsc::unbounded_channel();
        let gate = Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            prompts,
            deadline,
        };
        (gate, receiver)
    }

    /// 每个请求 id 同时只能有一个挂起的审批
    pub fn request(
        &self,
        id: &RequestId,
        display: DisplayPayload,
    ) -> Result<PendingDecision, SignError> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.contains_key(id) {
                return Err(SignError::ApprovalAlreadyPending(id.to_string()));
            }
            pending.insert(
                id.clone(),
                PendingApproval {
                    sender,
                    display: display.clone(),
                },
            );
        }

        let prompt = ApprovalPrompt {
            request_id: id.clone(),
            display,
        };
        if self.prompts.send(prompt).is_err() {
            log_warn!("审批提示通道已关闭，请求 {} 只能等待超时或取消", id);
        }
        log_info!("request {} is awaiting approval", id);

        Ok(PendingDecision {
            id: id.clone(),
            receiver,
            deadline: self.deadline,
            pending: self.pending.clone(),
        })
    }

    /// 没有对应的挂起审批时返回 `StaleResolution`，不影响任何其它请求
    pub fn resolve(&self, id: &RequestId, decision: UserDecision) -> Result<(), SignError> {
        let mut pending = lock(&self.pending);
        let Some(entry) = pending.remove(id) else {
            log_warn!("stale resolution {:?} for request {}", decision, id);
            return Err(SignError::StaleResolution(id.to_string()));
        };
        // 在锁内发送：超时方拿不到条目时一定能从通道里读到这个决定
        let _ = entry.sender.send(decision.into());
        log_info!("request {} resolved: {:?}", id, decision);
        Ok(())
    }

    /// 移除挂起的审批，之后迟到的 `resolve` 都是 stale
    pub fn cancel(&self, id: &RequestId) -> bool {
        let mut pending = lock(&self.pending);
        match pending.remove(id) {
            Some(entry) => {
                let _ = entry.sender.send(Decision::Cancelled);
                log_debug!("approval for {} cancelled", id);
                true
            }
            None => false,
        }
    }

    /// 审批等待上限，也作为未给出过期时间的 MFA 挑战的有效期
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        lock(&self.pending).contains_key(id)
    }

    pub fn pending_ids(&self) -> Vec<RequestId> {
        lock(&self.pending).keys().cloned().collect()
    }

    /// UI 重连后重新拉取仍在等待的审批内容
    pub fn displays(&self) -> Vec<DisplayPayload> {
        lock(&self.pending)
            .values()
            .map(|entry| entry.display.clone())
            .collect()
    }
}

/// 挂起审批的等待端。被 drop（请求被取消）时同时移除挂起条目。
pub struct PendingDecision {
    id: RequestId,
    receiver: oneshot::Receiver<Decision>,
    deadline: Option<Duration>,
    pending: PendingMap,
}

impl PendingDecision {
    pub async fn wait(mut self) -> Decision {
        let received = match self.deadline {
            None => (&mut self.receiver).await.ok(),
            Some(deadline) => match timeout(deadline, &mut self.receiver).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    if lock(&self.pending).remove(&self.id).is_some() {
                        log_warn!("request {} approval timed out after {:?}", self.id, deadline);
                        return Decision::Timeout;
                    }
                    // resolve 已经先拿走了条目，决定就在通道里
                    self.receiver.try_recv().ok()
                }
            },
        };

        // 发送端被丢弃（网关被销毁）按取消处理
        received.unwrap_or(Decision::Cancelled)
    }
}

impl Drop for PendingDecision {
    fn drop(&mut self) {
        // 正常结束时条目已被 resolve / cancel / 超时移除
        lock(&self.pending).remove(&self.id);
    }
}
