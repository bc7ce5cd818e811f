//! SSE 内容增量解析器
//!
//! 上游以行分隔的事件流返回生成结果，每条有效行形如
//! `data: {...}`，哨兵行 `data: [DONE]` 标记逻辑结束。传输层的
//! chunk 边界与行边界无关，一条 JSON 记录可能被拆进多个 chunk，
//! 因此解析器必须跨 chunk 缓存最后一个不完整的行。
//!
//! 解析器是纯同步的状态机，不含任何并发和 I/O，每个流式会话
//! 独占一个实例。

use tracing::{debug, warn};

use crate::streaming::error::StreamError;

/// 解析器状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// 等待数据
    Idle,
    /// 正在解析
    Parsing,
    /// 已完成
    Completed,
    /// 熔断后的错误状态
    Failed(String),
}

impl Default for ParserState {
    fn default() -> Self {
        Self::Idle
    }
}

/// SSE 内容增量解析器
///
/// 逐 chunk 接收文本，按行重组后提取 `choices[0].delta.content`
/// 文本增量。畸形记录会被跳过并计数：跨 chunk 截断的 JSON 是
/// 常态而非错误，只有连续大量真正畸形的记录才说明流已不可用，
/// 此时通过熔断阈值升级为致命解码失败。
///
/// # 示例
///
/// ```ignore
/// let mut parser = SseTokenParser::new();
///
/// let tokens = parser.process(chunk)?;
/// for token in tokens {
///     // 按到达顺序转发
/// }
///
/// // 流结束时回收缓冲区里最后一个未换行的记录
/// let tail = parser.finish();
/// ```
#[derive(Debug)]
pub struct SseTokenParser {
    /// 待处理缓冲区，最多保存一个不完整的行
    pending: String,

    /// 累计解码错误数，成功提取一次即清零
    decode_errors: u32,

    /// 当前状态
    state: ParserState,

    /// 缓冲区上限（字节），防止上游永不发送换行导致内存失控
    max_pending_bytes: usize,

    /// 解码错误熔断阈值
    max_decode_errors: u32,
}

impl Default for SseTokenParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseTokenParser {
    /// 默认缓冲区上限
    pub const DEFAULT_MAX_PENDING_BYTES: usize = 100_000;

    /// 默认解码错误熔断阈值
    pub const DEFAULT_MAX_DECODE_ERRORS: u32 = 10;

    /// SSE 数据行前缀
    const DATA_PREFIX: &'static str = "data: ";

    /// 流结束哨兵
    const DONE_MARKER: &'static str = "[DONE]";

    /// 创建新的解析器
    pub fn new() -> Self {
        Self::with_limits(
            Self::DEFAULT_MAX_PENDING_BYTES,
            Self::DEFAULT_MAX_DECODE_ERRORS,
        )
    }

    /// 创建带自定义熔断阈值的解析器
    pub fn with_limits(max_pending_bytes: usize, max_decode_errors: u32) -> Self {
        Self {
            pending: String::new(),
            decode_errors: 0,
            state: ParserState::Idle,
            max_pending_bytes,
            max_decode_errors,
        }
    }

    /// 获取当前状态
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// 获取累计解码错误数
    pub fn decode_errors(&self) -> u32 {
        self.decode_errors
    }

    /// 获取待处理缓冲区大小（字节）
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// 重置解析器状态
    ///
    /// 会话被主动重启时使用。
    pub fn reset(&mut self) {
        self.pending.clear();
        self.decode_errors = 0;
        self.state = ParserState::Idle;
    }

    /// 处理一个文本 chunk，返回按行序提取出的内容增量
    ///
    /// chunk 边界任意：同一字节序列无论如何切分，产出的增量
    /// 序列完全一致。单条畸形记录只计数不报错；累计达到熔断
    /// 阈值时返回致命解码错误，已返回给调用方的增量不受影响。
    pub fn process(&mut self, chunk: &str) -> Result<Vec<String>, StreamError> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        if self.state == ParserState::Idle {
            self.state = ParserState::Parsing;
        }

        self.pending.push_str(chunk);

        // 熔断：上游持续不发送换行符，缓冲区永远无法解析出完整行。
        // 整体丢弃并计一次解码错误，本次调用不产出任何增量。
        if self.pending.len() > self.max_pending_bytes {
            warn!(
                pending_bytes = self.pending.len(),
                limit = self.max_pending_bytes,
                "[SSE_PARSER] 待处理缓冲区超限，整体丢弃"
            );
            self.pending.clear();
            self.pending.shrink_to_fit();
            return self.record_decode_error("缓冲区溢出后丢弃").map(|_| Vec::new());
        }

        let mut tokens = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending[..pos].to_string();
            self.pending.drain(..=pos);
            self.handle_line(line.trim(), &mut tokens)?;
        }

        Ok(tokens)
    }

    /// 流结束时回收缓冲区中最后一个未换行的记录
    ///
    /// 上游在最后一条记录后未必发送换行符，这里补一个换行重跑
    /// `process`，把残留内容当作完整行处理。flush 阶段的任何错误
    /// 都被吞掉：流已经结束，没有可恢复的动作。
    pub fn finish(&mut self) -> Vec<String> {
        if self.pending.trim().is_empty() {
            self.pending.clear();
            self.state = ParserState::Completed;
            return Vec::new();
        }

        let tokens = match self.process("\n") {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "[SSE_PARSER] flush 阶段解码失败，忽略残留内容");
                Vec::new()
            }
        };

        if !matches!(self.state, ParserState::Failed(_)) {
            self.state = ParserState::Completed;
        }
        tokens
    }

    /// 处理一个完整的行
    fn handle_line(&mut self, line: &str, tokens: &mut Vec<String>) -> Result<(), StreamError> {
        // 空行和 `:` 开头的协议注释行直接忽略，不计入错误
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }

        // 非 data 行（如 event:、id:）对内容提取无意义
        let Some(payload) = line.strip_prefix(Self::DATA_PREFIX) else {
            return Ok(());
        };

        // 哨兵行在任何位置出现都只是被消费，不产出增量也不计错误
        if payload == Self::DONE_MARKER {
            debug!("[SSE_PARSER] 收到 [DONE] 哨兵");
            return Ok(());
        }

        match Self::extract_content(payload) {
            Some(content) => {
                // 结构正确即视为成功，错误计数清零
                self.decode_errors = 0;
                if let Some(text) = content {
                    tokens.push(text);
                }
                Ok(())
            }
            None => {
                // 畸形负载：被 chunk 边界截断的 JSON 属于正常现象，
                // 只有看起来本应完整的负载才值得留下告警
                if Self::looks_complete(payload) {
                    warn!(
                        payload_bytes = payload.len(),
                        "[SSE_PARSER] 跳过畸形记录"
                    );
                }
                self.record_decode_error("连续畸形记录")
            }
        }
    }

    /// 从 JSON 负载中提取内容增量
    ///
    /// 返回 `None` 表示结构不符合预期（按解码失败处理）；
    /// 返回 `Some(None)` 表示结构正确但本条记录没有文本增量
    /// （如 role 预告、finish_reason 收尾记录）。
    fn extract_content(payload: &str) -> Option<Option<String>> {
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;

        let choices = value.get("choices")?.as_array()?;
        let first = choices.first()?;
        let delta = first.get("delta")?.as_object()?;

        let content = delta
            .get("content")
            .and_then(|c| c.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Some(content)
    }

    /// 判断负载是否"看起来完整"
    ///
    /// 只影响日志噪音，不影响增量产出：太短或没有闭合符的负载
    /// 多半是被 chunk 边界无辜截断的，不值得告警。
    fn looks_complete(payload: &str) -> bool {
        payload.len() > 20 && (payload.ends_with('}') || payload.ends_with(']'))
    }

    /// 记录一次解码错误，达到熔断阈值时升级为致命失败
    fn record_decode_error(&mut self, context: &str) -> Result<(), StreamError> {
        self.decode_errors += 1;

        if self.decode_errors >= self.max_decode_errors {
            let message = format!(
                "{}: 解码错误达到 {} 次，放弃本流",
                context, self.decode_errors
            );
            self.state = ParserState::Failed(message.clone());
            return Err(StreamError::decode(message));
        }

        Ok(())
    }
}

// ============================================================================
// 测试模块
// ============================================================================
