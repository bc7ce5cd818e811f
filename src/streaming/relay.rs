//! 中继流
//!
//! 把上游的原始字节流转换为可直接下发的纯文本增量流：
//! 逐 chunk 喂给 [`SseTokenParser`]，产出的增量立即转发，
//! 不做任何批量缓冲。上游正常结束时 flush 解析器回收残留
//! 内容；流中途失败时向下游追加一条可读的中断提示，再以
//! 错误状态收尾，让调用方能区分"部分成功"与"完整成功"。

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::{debug, error, warn};

use crate::config::StreamSettings;
use crate::streaming::error::StreamError;
use crate::streaming::extractor::SseTokenParser;
use crate::streaming::metrics::StreamMetrics;
use crate::streaming::traits::StreamResponse;

/// 流中途失败时追加给下游的中断提示
///
/// 此时 HTTP 状态已经发出，错误只能以文本形式混入输出。
pub const INTERRUPT_NOTICE: &str = "\n\n[错误: 生成已中断，请重试]";

/// 中继流的完成状态
///
/// 三态结局：干净完成、输出过部分内容后中断、解码熔断。
/// "未输出任何内容即失败"不会走到中继流，由调用方在建流
/// 之前以结构化错误返回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayState {
    /// 正在转发
    Streaming,
    /// 上游正常结束，输出完整
    Completed,
    /// 传输层中途失败，输出不完整
    Interrupted,
    /// 解码熔断，输出不完整
    Failed(String),
}

/// 中继流
///
/// 封装单个请求的上游字节流、解析器与指标，实现 [`Stream`]。
/// 每个请求独占一个实例，跨请求不共享任何可变状态。
pub struct TokenRelayStream {
    /// 请求标识，仅用于日志
    request_id: String,
    /// 上游字节流
    source: StreamResponse,
    /// SSE 解析器
    parser: SseTokenParser,
    /// 指标
    metrics: StreamMetrics,
    /// 跨 chunk 的 UTF-8 残字节
    utf8_remainder: Vec<u8>,
    /// 已解析待下发的增量
    pending_tokens: Vec<String>,
    /// 排空 pending 后要抛出的收尾错误
    trailing_error: Option<StreamError>,
    /// 完成状态
    state: RelayState,
    /// 是否已结束
    finished: bool,
}

impl TokenRelayStream {
    /// 创建新的中继流
    pub fn new(request_id: impl Into<String>, source: StreamResponse, settings: &StreamSettings) -> Self {
        Self {
            request_id: request_id.into(),
            source,
            parser: SseTokenParser::with_limits(
                settings.max_pending_bytes,
                settings.max_decode_errors,
            ),
            metrics: StreamMetrics::new(),
            utf8_remainder: Vec::new(),
            pending_tokens: Vec::new(),
            trailing_error: None,
            state: RelayState::Streaming,
            finished: false,
        }
    }

    /// 获取完成状态
    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// 获取指标
    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    /// 解码一个字节 chunk，处理跨 chunk 被截断的 UTF-8 序列
    ///
    /// 多字节字符（生成内容以中文为主）可能恰好被 chunk 边界
    /// 切开，残字节保留到下一个 chunk 再拼接；真正非法的字节
    /// 序列替换为 U+FFFD 后继续。
    fn decode_utf8_chunk(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.utf8_remainder);
        data.extend_from_slice(bytes);

        let mut text = String::with_capacity(data.len());
        let mut rest: &[u8] = &data;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or(""));
                    match e.error_len() {
                        Some(len) => {
                            text.push('\u{FFFD}');
                            rest = &after[len..];
                        }
                        None => {
                            // 末尾是不完整的多字节字符，留给下一个 chunk
                            self.utf8_remainder = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// 处理一个上游 chunk，返回新产出的增量
    fn process_bytes(&mut self, bytes: &[u8]) -> Result<Vec<String>, StreamError> {
        self.metrics.record_chunk(bytes.len());

        let text = self.decode_utf8_chunk(bytes);
        let errors_before = self.parser.decode_errors();
        let result = self.parser.process(&text);

        if let Ok(tokens) = &result {
            let errors_after = self.parser.decode_errors();
            if errors_after > errors_before {
                for _ in errors_before..errors_after {
                    self.metrics.record_decode_error();
                }
            }
            self.metrics.record_tokens(tokens.len());
        }

        result
    }

    /// 上游正常结束：flush 解析器并记录指标
    fn finish_stream(&mut self) -> Vec<String> {
        let tokens = self.parser.finish();
        self.metrics.record_tokens(tokens.len());
        self.metrics.finish();
        self.metrics.log_summary(&self.request_id);

        self.state = RelayState::Completed;
        debug!(request_id = %self.request_id, "[RELAY] 流式传输完成");
        tokens
    }

    /// 传输层中途失败：追加中断提示并安排错误收尾
    fn interrupt_stream(&mut self, err: StreamError) {
        error!(
            request_id = %self.request_id,
            error = %err,
            "[RELAY] 流中途传输失败"
        );
        self.metrics.finish();
        self.metrics.log_summary(&self.request_id);

        self.state = RelayState::Interrupted;
        self.pending_tokens.push(INTERRUPT_NOTICE.to_string());
        self.trailing_error = Some(err);
    }

    /// 解码熔断：不追加提示，直接以错误收尾
    ///
    /// 已经发出的增量不回收，下游收到错误状态的关闭即可判断
    /// 输出不完整。
    fn fail_stream(&mut self, err: StreamError) -> StreamError {
        error!(
            request_id = %self.request_id,
            error = %err,
            "[RELAY] 解码熔断，放弃本流"
        );
        self.metrics.record_decode_error();
        self.metrics.finish();
        self.metrics.log_summary(&self.request_id);

        self.state = RelayState::Failed(err.to_string());
        self.finished = true;
        err
    }
}

impl Stream for TokenRelayStream {
    type Item = Result<String, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // 先排空已解析的增量
        if !self.pending_tokens.is_empty() {
            let token = self.pending_tokens.remove(0);
            return Poll::Ready(Some(Ok(token)));
        }

        // pending 排空后抛出收尾错误
        if let Some(err) = self.trailing_error.take() {
            self.finished = true;
            return Poll::Ready(Some(Err(err)));
        }

        if self.finished {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.source).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => match self.process_bytes(&bytes) {
                Ok(mut tokens) => {
                    if tokens.is_empty() {
                        // 本 chunk 没有产出完整增量，继续读下一个
                        cx.waker().wake_by_ref();
                        Poll::Pending
                    } else {
                        let first = tokens.remove(0);
                        self.pending_tokens = tokens;
                        Poll::Ready(Some(Ok(first)))
                    }
                }
                Err(err) => {
                    let err = self.fail_stream(err);
                    Poll::Ready(Some(Err(err)))
                }
            },
            Poll::Ready(Some(Err(err))) => {
                self.interrupt_stream(err);
                // interrupt_stream 刚放入中断提示
                let token = self.pending_tokens.remove(0);
                Poll::Ready(Some(Ok(token)))
            }
            Poll::Ready(None) => {
                let mut tokens = self.finish_stream();
                self.finished = true;

                if tokens.is_empty() {
                    Poll::Ready(None)
                } else {
                    let first = tokens.remove(0);
                    self.pending_tokens = tokens;
                    Poll::Ready(Some(Ok(first)))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// 超时包装
// ============================================================================

/// 为流添加总超时与 chunk 间隔超时
pub fn with_timeout<S>(stream: S, settings: &StreamSettings) -> TimeoutStream<S>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    TimeoutStream::new(stream, settings.timeout_duration(), settings.chunk_timeout_duration())
}

/// 带超时的流包装器
///
/// 两个独立的截止时间：整个流的总时长，以及相邻两个 Item 的
/// 最大间隔。任一触发都以 [`StreamError::Timeout`] 收尾。
pub struct TimeoutStream<S>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    inner: S,
    deadline: Pin<Box<Sleep>>,
    chunk_timer: Pin<Box<Sleep>>,
    chunk_timeout: Duration,
    finished: bool,
}

impl<S> TimeoutStream<S>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    /// 创建新的超时流
    pub fn new(inner: S, total_timeout: Duration, chunk_timeout: Duration) -> Self {
        Self {
            inner,
            deadline: Box::pin(sleep(total_timeout)),
            chunk_timer: Box::pin(sleep(chunk_timeout)),
            chunk_timeout,
            finished: false,
        }
    }
}

impl<S> Stream for TimeoutStream<S>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    type Item = Result<String, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        // 超时定时器注册 waker，流停滞时也能被唤醒
        if self.deadline.as_mut().poll(cx).is_ready()
            || self.chunk_timer.as_mut().poll(cx).is_ready()
        {
            warn!("[RELAY] 流式响应超时");
            self.finished = true;
            return Poll::Ready(Some(Err(StreamError::Timeout)));
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => {
                let next_deadline = Instant::now() + self.chunk_timeout;
                self.chunk_timer.as_mut().reset(next_deadline);
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// 从流中收集全部增量文本
///
/// 用于测试和调试。
pub async fn collect_tokens<S>(mut stream: S) -> Result<String, StreamError>
where
    S: Stream<Item = Result<String, StreamError>> + Unpin,
{
    use futures::StreamExt;

    let mut content = String::new();
    while let Some(result) = stream.next().await {
        match result {
            Ok(token) => content.push_str(&token),
            Err(e) => return Err(e),
        }
    }
    Ok(content)
}

// ============================================================================
// 测试模块
// ============================================================================
