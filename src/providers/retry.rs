//! 有界重试策略
//!
//! 上游调用失败时按指数退避重试。策略本身只做延迟计算，
//! 不持有定时器，便于在测试中用毫秒级延迟和虚拟时钟验证。
//!
//! 只重试 [`ProviderError::is_retryable`] 为真的错误（传输层
//! 失败、超时、5xx）；4xx 不属于临时故障，重试只会白白消耗
//! 上游配额，一律立即返回。

use std::time::Duration;
use tracing::{info, warn};

use crate::config::RetrySettings;
use crate::models::ChatCompletionRequest;
use crate::providers::ProviderError;
use crate::streaming::traits::{StreamResponse, StreamingProvider};

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 退避基础延迟
    pub base_delay: Duration,
    /// 退避倍率
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    /// 从配置构造策略
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff_multiplier: settings.backoff_multiplier.max(1),
        }
    }

    /// 计算第 attempt 次尝试失败后的等待时间（attempt 从 1 开始）
    ///
    /// base * multiplier^(attempt-1)，即默认配置下 1s、2s、4s...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.backoff_multiplier.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor)
    }
}

/// 带重试的流式调用
///
/// 每次尝试发起一次上游调用；拿到流即返回，流建立之后的
/// 失败不再回到这里重试（此时输出可能已经开始）。
pub async fn call_stream_with_retry(
    provider: &dyn StreamingProvider,
    request: &ChatCompletionRequest,
    policy: &RetryPolicy,
) -> Result<StreamResponse, ProviderError> {
    let mut attempt = 1u32;

    loop {
        match provider.call_api_stream(request).await {
            Ok(stream) => {
                if attempt > 1 {
                    info!(
                        provider = provider.provider_name(),
                        attempt, "[RETRY] 重试后成功"
                    );
                }
                return Ok(stream);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    provider = provider.provider_name(),
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "[RETRY] 上游调用失败，退避后重试"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// ============================================================================
// 测试模块
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::streaming::StreamError;

    /// 按脚本失败若干次后成功的假 Provider
    struct MockProvider {
        calls: AtomicU32,
        fail_first: u32,
        error: ProviderError,
    }

    impl MockProvider {
        fn failing(fail_first: u32, error: ProviderError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                error,
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StreamingProvider for MockProvider {
        async fn call_api_stream(
            &self,
            _request: &ChatCompletionRequest,
        ) -> Result<StreamResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(self.error.clone())
            } else {
                let chunks: Vec<Result<Bytes, StreamError>> =
                    vec![Ok(Bytes::from("data: [DONE]\n"))];
                Ok(Box::pin(stream::iter(chunks)))
            }
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn provider_name(&self) -> &'static str {
            "MockProvider"
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 2,
        }
    }

    #[test]
    fn test_delay_is_exponential() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_policy_from_settings_clamps_zero() {
        let settings = RetrySettings {
            max_attempts: 0,
            base_delay_ms: 100,
            backoff_multiplier: 0,
        };
        let policy = RetryPolicy::from_settings(&settings);

        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff_multiplier, 1);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_first_success_makes_single_call() {
        let provider = MockProvider::failing(0, ProviderError::NoResponseBody);
        let request = ChatCompletionRequest::streaming("m", "p");

        let result = call_stream_with_retry(&provider, &request, &fast_policy()).await;

        assert!(result.is_ok());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_retried_to_ceiling() {
        let provider = MockProvider::failing(
            u32::MAX,
            ProviderError::ServerError {
                status: 500,
                message: "internal".to_string(),
            },
        );
        let request = ChatCompletionRequest::streaming("m", "p");
        let policy = RetryPolicy::default();

        let started = tokio::time::Instant::now();
        let err = call_stream_with_retry(&provider, &request, &policy)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ProviderError::ServerError { status: 500, .. }));
        assert_eq!(provider.call_count(), 3);
        // 虚拟时钟验证指数退避：1s + 2s
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_recovers_on_retry() {
        let provider =
            MockProvider::failing(1, ProviderError::NetworkError("reset".to_string()));
        let request = ChatCompletionRequest::streaming("m", "p");

        let result = call_stream_with_retry(&provider, &request, &fast_policy()).await;

        assert!(result.is_ok());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried() {
        let provider = MockProvider::failing(
            u32::MAX,
            ProviderError::RateLimitError("HTTP 429".to_string()),
        );
        let request = ChatCompletionRequest::streaming("m", "p");

        let err = call_stream_with_retry(&provider, &request, &fast_policy())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ProviderError::RateLimitError(_)));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let provider = MockProvider::failing(
            u32::MAX,
            ProviderError::AuthenticationError("HTTP 401".to_string()),
        );
        let request = ChatCompletionRequest::streaming("m", "p");

        let err = call_stream_with_retry(&provider, &request, &fast_policy())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ProviderError::AuthenticationError(_)));
        assert_eq!(provider.call_count(), 1);
    }
}
