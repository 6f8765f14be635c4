use crate::errors::SignError;
use crate::log_warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// 指数退避 + 随机抖动的重试策略。
///
/// 只对 `SignError::NetworkError` 重试，其余错误（拒绝、MFA、token 刷新失败等）
/// 原样返回给上层。
#[derive(Debug, Clone, Copy)]
pub struct RetryAdapter {
    max_retries: usize,
    base_delay: Duration,
}

impl RetryAdapter {
    /// `max_retries` 为总尝试次数，至少 1 次
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// 不重试：只调用一次
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// 第 `attempt` 次重试前的等待时间：base × 2^(attempt-1)，外加 0~10% 抖动
    fn backoff(&self, attempt: usize) -> Duration {
        // 指数最高限制在 2^10 = 1024
        let exponent = (attempt - 1).min(10);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);

        // 防止多个重试任务在同一时间点"齐射"远端
        let jitter = rand::thread_rng().gen_range(0..=(delay_ms / 10 + 1));
        Duration::from_millis(delay_ms.saturating_add(jitter))
    }

    pub async fn retry_call<T, F, Fut>(&self, label: &str, mut f: F) -> Result<T, SignError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, SignError>> + Send,
    {
        let mut last_error: Option<SignError> = None;
        for attempt in 0..self.max_retries {
            // 从第二次尝试开始等待
            if attempt > 0 {
                let delay = self.backoff(attempt);
                log_warn!(
                    "{} 调用失败，正在进行第 {} 次重试，等待 {:?}...",
                    label,
                    attempt + 1,
                    delay
                );
                sleep(delay).await;
            }
            match f().await {
                Ok(result) => return Ok(result),
                Err(e @ SignError::NetworkError(_)) => {
                    log_warn!("{} 调用失败 (第 {} 次): {}", label, attempt + 1, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            SignError::NetworkError(format!("{}: no attempt was made", label))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_network_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = RetryAdapter::new(3, Duration::from_millis(100));
        let counter = calls.clone();
        let result = adapter
            .retry_call("test", move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SignError::NetworkError("reset".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = RetryAdapter::new(5, Duration::from_millis(100));
        let counter = calls.clone();
        let result: Result<(), _> = adapter
            .retry_call("test", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SignError::RefreshFailed("expired".into()))
                }
            })
            .await;
        assert!(matches!(result, Err(SignError::RefreshFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_with_last_network_error() {
        let adapter = RetryAdapter::new(2, Duration::from_millis(10));
        let result: Result<(), _> = adapter
            .retry_call("test", || async { Err(SignError::NetworkError("down".into())) })
            .await;
        assert_eq!(result, Err(SignError::NetworkError("down".into())));
    }
}
