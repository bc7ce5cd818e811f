//! StreamingProvider Trait 定义
//!
//! 为上游 Provider 定义流式调用接口。中继逻辑只依赖该 trait，
//! 测试中用假 Provider 替换真实网络调用。

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

use crate::models::ChatCompletionRequest;
use crate::providers::ProviderError;
use crate::streaming::StreamError;

/// 流式响应类型别名
///
/// 每个 Item 是上游返回的一个原始字节 chunk 或传输层错误。
/// 使用 `Pin<Box<...>>` 以支持动态分发和异步迭代。
pub type StreamResponse = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

/// 流式 Provider Trait
///
/// 每个请求只发起一次流式调用；重试由调用方的重试策略控制，
/// Provider 本身不做重试。
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// 发起流式 API 调用
    ///
    /// 成功时返回字节流，调用者逐 chunk 处理；失败时返回分类
    /// 后的 Provider 错误。返回 `Ok` 即表示上游已接受请求并
    /// 开始返回数据。
    async fn call_api_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<StreamResponse, ProviderError>;

    /// 检查凭证等配置是否就绪
    ///
    /// 返回 `false` 时调用方应在发起任何网络调用之前拒绝请求。
    fn is_configured(&self) -> bool;

    /// 获取 Provider 名称，用于日志和错误消息
    fn provider_name(&self) -> &'static str;
}

/// 将 reqwest 的 bytes_stream 转换为 StreamResponse
pub fn reqwest_stream_to_stream_response(response: reqwest::Response) -> StreamResponse {
    use futures::StreamExt;

    let stream = response.bytes_stream().map(|result| result.map_err(StreamError::from));

    Box::pin(stream)
}
