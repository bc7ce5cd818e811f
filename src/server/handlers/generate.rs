//! 生成端点处理器
//!
//! 处理 `/api/generate` 的流式生成请求。
//!
//! # 流式传输支持
//!
//! 校验通过后发起一次（带重试的）上游流式调用，之后把上游
//! chunk 逐个喂给解析器，产出的文本增量立即下发，不做批量
//! 缓冲。输出开始之前的失败以结构化 JSON 错误返回；输出开始
//! 之后的失败在流内追加提示并以错误状态关闭连接。

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ChatCompletionRequest, GenerateRequest};
use crate::providers::{call_stream_with_retry, ProviderError, RetryPolicy};
use crate::server::{ApiError, AppState};
use crate::streaming::{with_timeout, TokenRelayStream};

/// 健康检查
pub async fn healthz() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

/// 流式生成
///
/// 成功时返回 `text/plain` 的分块响应，长度未知，调用方读到
/// 流关闭为止。
pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let expose_details = state.config.server.expose_error_details;

    // 校验失败不发起任何上游调用
    let prompt = match request.validated_prompt(state.config.server.max_prompt_chars) {
        Ok(prompt) => prompt.to_string(),
        Err(e) => {
            warn!(request_id = %request_id, "[GENERATE] 提示词校验失败: {}", e);
            return ApiError::invalid_prompt(&e).into_response();
        }
    };

    // 凭证缺失同样在任何网络调用之前拒绝
    if !state.provider.is_configured() {
        let err = ProviderError::ConfigurationError(format!(
            "{} 凭证未配置",
            state.provider.provider_name()
        ));
        return ApiError::from_provider(&err, expose_details).into_response();
    }

    info!(
        request_id = %request_id,
        prompt_chars = prompt.chars().count(),
        model = %state.config.provider.model,
        "[GENERATE] 收到生成请求"
    );

    let chat_request = ChatCompletionRequest::streaming(&state.config.provider.model, prompt);
    let policy = RetryPolicy::from_settings(&state.config.retry);

    let source =
        match call_stream_with_retry(state.provider.as_ref(), &chat_request, &policy).await {
            Ok(source) => source,
            Err(e) => {
                // 还没有任何输出，可以返回结构化错误
                return ApiError::from_provider(&e, expose_details).into_response();
            }
        };

    // 流一旦建立，状态码已定格为 200，后续失败只能在流内表达
    let relay = TokenRelayStream::new(request_id, source, &state.config.stream);
    let timed = with_timeout(relay, &state.config.stream);

    let body_stream = timed.map(|result| -> Result<Bytes, std::io::Error> {
        match result {
            Ok(token) => Ok(Bytes::from(token)),
            // 以 io::Error 收尾让连接以错误状态关闭，
            // 调用方由此区分部分成功与完整成功
            Err(e) => Err(e.into_io_error()),
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": {"code": "INTERNAL", "message": "构建流式响应失败"}})),
            )
                .into_response()
        })
}
