//! OpenRouter Provider（OpenAI 兼容 API）
//!
//! 通过 OpenRouter 的 chat/completions 接口发起流式生成调用。
//! 凭证、模型与可选的来源头在进程启动时从配置注入，请求路径
//! 不再读取任何环境变量。

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{ProviderConfig, StreamSettings};
use crate::models::ChatCompletionRequest;
use crate::providers::ProviderError;
use crate::streaming::traits::{
    reqwest_stream_to_stream_response, StreamResponse, StreamingProvider,
};

/// OpenRouter Provider
pub struct OpenRouterProvider {
    config: ProviderConfig,
    client: Client,
}

impl OpenRouterProvider {
    /// 从配置创建 Provider
    ///
    /// 单次尝试的总超时在 HTTP 客户端层面生效，覆盖连接、
    /// 发送与响应读取的全过程。
    pub fn new(config: ProviderConfig, stream_settings: &StreamSettings) -> Self {
        let client = Client::builder()
            .timeout(stream_settings.timeout_duration())
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client }
    }

    /// 获取配置的模型标识
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// 构建完整的 API URL
    ///
    /// 兼容用户输入的 base_url 带或不带 /v1 后缀。
    fn build_url(&self, endpoint: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{}/{}", base, endpoint)
        } else {
            format!("{}/v1/{}", base, endpoint)
        }
    }
}

#[async_trait]
impl StreamingProvider for OpenRouterProvider {
    /// 发起流式 API 调用
    ///
    /// 单次 POST，`stream: true`。状态码不成功时读取 body 并
    /// 按状态分类；成功但上游声明空 body 时报 `NoResponseBody`。
    async fn call_api_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<StreamResponse, ProviderError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ProviderError::ConfigurationError("OPENROUTER_API_KEY 未设置".to_string())
        })?;

        let url = self.build_url("chat/completions");

        tracing::info!(
            "[OPENROUTER_STREAM] 发起流式请求: url={} model={}",
            url,
            request.model
        );

        let mut builder = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");

        // OpenRouter 的来源统计头，配置了才发送
        if let Some(referer) = &self.config.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.title {
            builder = builder.header("X-Title", title);
        }

        let resp = builder
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!("[OPENROUTER_STREAM] 请求失败: {} - {}", status, body);
            return Err(ProviderError::from_http_status(status.as_u16(), &body));
        }

        // 状态成功但上游明确声明没有内容
        if resp.content_length() == Some(0) {
            tracing::error!("[OPENROUTER_STREAM] 响应 body 为空: status={}", status);
            return Err(ProviderError::NoResponseBody);
        }

        tracing::info!("[OPENROUTER_STREAM] 流式响应开始: status={}", status);

        Ok(reqwest_stream_to_stream_response(resp))
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    fn provider_name(&self) -> &'static str {
        "OpenRouterProvider"
    }
}
