//! 生成接口端到端功能验证测试
//!
//! 用脚本化的假 Provider 驱动完整路由，验证：
//! - 提示词校验与凭证检查在任何上游调用之前完成
//! - 上游错误分类、重试次数与对外状态码
//! - 流式响应的增量转发、flush 与中断语义

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use futures::{stream, StreamExt};
use tower::ServiceExt;

use thesiscast_lib::config::Config;
use thesiscast_lib::models::ChatCompletionRequest;
use thesiscast_lib::providers::ProviderError;
use thesiscast_lib::server::{build_router, AppState};
use thesiscast_lib::streaming::{StreamError, StreamResponse, StreamingProvider, INTERRUPT_NOTICE};

// ============================================================================
// 测试辅助
// ============================================================================

/// 假 Provider 的行为脚本
#[derive(Clone)]
enum MockBehavior {
    /// 每次调用都返回同一个错误
    Fail(ProviderError),
    /// 返回给定的字节流
    Chunks(Vec<Result<Bytes, StreamError>>),
}

/// 脚本化的假 Provider，记录调用次数
struct MockProvider {
    calls: AtomicU32,
    configured: bool,
    behavior: MockBehavior,
}

impl MockProvider {
    fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            configured: true,
            behavior,
        })
    }

    fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            configured: false,
            behavior: MockBehavior::Fail(ProviderError::NoResponseBody),
        })
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Fail(err) => Err(err.clone()),
            MockBehavior::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks.clone()))),
        }
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn provider_name(&self) -> &'static str {
        "MockProvider"
    }
}

/// 测试用配置：重试退避压到 1ms，避免拖慢用例
fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.base_delay_ms = 1;
    config
}

fn router_with(provider: Arc<MockProvider>, config: Config) -> axum::Router {
    build_router(AppState::new(Arc::new(config), provider))
}

fn generate_request(prompt: &str) -> Request<Body> {
    let body = serde_json::json!({ "prompt": prompt }).to_string();
    Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn content_record(text: &str) -> String {
    format!(
        "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
        serde_json::to_string(text).unwrap()
    )
}

async fn error_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// 逐帧读取流式 body，返回读到的文本与收尾错误（若有）
async fn drain_stream_body(
    response: axum::response::Response,
) -> (String, Option<axum::Error>) {
    let mut stream = response.into_body().into_data_stream();
    let mut text = String::new();
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(bytes) => text.push_str(std::str::from_utf8(&bytes).unwrap()),
            Err(e) => return (text, Some(e)),
        }
    }
    (text, None)
}

// ============================================================================
// 校验与配置
// ============================================================================

#[tokio::test]
async fn test_empty_prompt_rejected_without_upstream_call() {
    let provider = MockProvider::new(MockBehavior::Chunks(vec![]));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("   \n ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_PROMPT");
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_over_length_prompt_rejected() {
    let provider = MockProvider::new(MockBehavior::Chunks(vec![]));
    let mut config = test_config();
    config.server.max_prompt_chars = 10;
    let router = router_with(provider.clone(), config);

    let response = router
        .oneshot(generate_request(&"字".repeat(11)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "INVALID_PROMPT");
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_missing_credential_rejected_without_upstream_call() {
    let provider = MockProvider::unconfigured();
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("正常提示词")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "CONFIGURATION_ERROR");
    // 对外信息不泄漏内部细节
    assert!(!body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("MockProvider"));
    assert!(body["error"].get("details").is_none());
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_details_exposed_in_debug_config() {
    let provider = MockProvider::unconfigured();
    let mut config = test_config();
    config.server.expose_error_details = true;
    let router = router_with(provider, config);

    let response = router.oneshot(generate_request("正常提示词")).await.unwrap();

    let body = error_body(response).await;
    assert!(body["error"]["details"]
        .as_str()
        .unwrap()
        .contains("MockProvider"));
}

// ============================================================================
// 上游错误分类与重试
// ============================================================================

#[tokio::test]
async fn test_rate_limit_surfaced_without_retry() {
    let provider = MockProvider::new(MockBehavior::Fail(ProviderError::from_http_status(
        429,
        "Too Many Requests",
    )));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写开题报告")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "RATE_LIMIT");
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_auth_error_surfaced_without_retry() {
    let provider = MockProvider::new(MockBehavior::Fail(ProviderError::from_http_status(
        401,
        "Unauthorized",
    )));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写开题报告")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_server_error_retried_then_surfaced_as_502() {
    let provider = MockProvider::new(MockBehavior::Fail(ProviderError::from_http_status(
        500,
        "Internal Server Error",
    )));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写开题报告")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "UPSTREAM_SERVER_ERROR");
    // 重试到上限：默认 3 次尝试
    assert_eq!(provider.call_count(), 3);
}

#[tokio::test]
async fn test_service_unavailable_maps_to_502() {
    let provider = MockProvider::new(MockBehavior::Fail(ProviderError::from_http_status(
        503,
        "Service Unavailable",
    )));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写开题报告")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_no_response_body_maps_to_502() {
    let provider = MockProvider::new(MockBehavior::Fail(ProviderError::NoResponseBody));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写开题报告")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = error_body(response).await;
    assert_eq!(body["error"]["code"], "NO_RESPONSE_BODY");
    assert_eq!(provider.call_count(), 1);
}

// ============================================================================
// 流式转发
// ============================================================================

#[tokio::test]
async fn test_successful_stream_relays_tokens_in_order() {
    let chunks = vec![
        Ok(Bytes::from(content_record("研究背景："))),
        Ok(Bytes::from(format!(
            "{}{}",
            content_record("随着深度学习"),
            content_record("的发展")
        ))),
        Ok(Bytes::from("data: [DONE]\n".to_string())),
    ];
    let provider = MockProvider::new(MockBehavior::Chunks(chunks));
    let router = router_with(provider.clone(), test_config());

    let response = router.oneshot(generate_request("写研究背景")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let (text, err) = drain_stream_body(response).await;
    assert_eq!(text, "研究背景：随着深度学习的发展");
    assert!(err.is_none());
    // 首次成功只调用一次上游
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_record_split_across_chunks_is_transparent() {
    let record = content_record("Hi");
    let (a, b) = record.split_at(20);
    let chunks = vec![
        Ok(Bytes::copy_from_slice(a.as_bytes())),
        Ok(Bytes::copy_from_slice(b.as_bytes())),
    ];
    let provider = MockProvider::new(MockBehavior::Chunks(chunks));
    let router = router_with(provider, test_config());

    let response = router.oneshot(generate_request("hello")).await.unwrap();
    let (text, err) = drain_stream_body(response).await;

    assert_eq!(text, "Hi");
    assert!(err.is_none());
}

#[tokio::test]
async fn test_unterminated_tail_flushed_at_end() {
    // 最后一条记录没有换行符，只有流结束时的 flush 能回收它
    let tail = content_record("收尾内容");
    let chunks = vec![Ok(Bytes::from(tail.trim_end_matches('\n').to_string()))];
    let provider = MockProvider::new(MockBehavior::Chunks(chunks));
    let router = router_with(provider, test_config());

    let response = router.oneshot(generate_request("hello")).await.unwrap();
    let (text, err) = drain_stream_body(response).await;

    assert_eq!(text, "收尾内容");
    assert!(err.is_none());
}

#[tokio::test]
async fn test_malformed_records_skipped_mid_stream() {
    let chunks = vec![
        Ok(Bytes::from(format!(
            "data: {{broken}}\n{}",
            content_record("前半")
        ))),
        Ok(Bytes::from(content_record("后半"))),
    ];
    let provider = MockProvider::new(MockBehavior::Chunks(chunks));
    let router = router_with(provider, test_config());

    let response = router.oneshot(generate_request("hello")).await.unwrap();
    let (text, err) = drain_stream_body(response).await;

    assert_eq!(text, "前半后半");
    assert!(err.is_none());
}

#[tokio::test]
async fn test_mid_stream_failure_appends_notice_and_errors() {
    let chunks = vec![
        Ok(Bytes::from(content_record("已经输出的部分"))),
        Err(StreamError::network("connection reset by peer")),
    ];
    let provider = MockProvider::new(MockBehavior::Chunks(chunks));
    let router = router_with(provider, test_config());

    let response = router.oneshot(generate_request("hello")).await.unwrap();

    // 输出已经开始，状态码仍是 200
    assert_eq!(response.status(), StatusCode::OK);

    let (text, err) = drain_stream_body(response).await;
    assert!(text.starts_with("已经输出的部分"));
    assert!(text.ends_with(INTERRUPT_NOTICE));
    // 连接以错误状态关闭，区别于干净完成
    assert!(err.is_some());
}

// ============================================================================
// 其他端点
// ============================================================================

#[tokio::test]
async fn test_healthz() {
    let provider = MockProvider::new(MockBehavior::Chunks(vec![]));
    let router = router_with(provider, test_config());

    let response = router
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_request_body_is_client_error() {
    let provider = MockProvider::new(MockBehavior::Chunks(vec![]));
    let router = router_with(provider.clone(), test_config());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/generate")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert_eq!(provider.call_count(), 0);
}
