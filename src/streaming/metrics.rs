//! 流式传输指标类型
//!
//! 记录单个流式会话的吞吐与错误统计，流结束时输出一条汇总日志。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 流式传输指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// 首字节时间（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<u64>,

    /// 接收到的 chunk 总数
    pub chunk_count: u32,

    /// 接收到的总字节数
    pub total_bytes: usize,

    /// 转发给下游的内容增量数量
    pub token_count: u32,

    /// 解码错误数量
    pub decode_error_count: u32,

    /// 开始时间
    pub start_time: DateTime<Utc>,

    /// 结束时间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self {
            ttfb_ms: None,
            chunk_count: 0,
            total_bytes: 0,
            token_count: 0,
            decode_error_count: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

impl StreamMetrics {
    /// 创建新的指标实例
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录收到一个 chunk
    ///
    /// 首个 chunk 同时记录 TTFB。
    pub fn record_chunk(&mut self, bytes: usize) {
        if self.chunk_count == 0 {
            let elapsed = (Utc::now() - self.start_time).num_milliseconds().max(0);
            self.ttfb_ms = Some(elapsed as u64);
        }
        self.chunk_count += 1;
        self.total_bytes += bytes;
    }

    /// 记录转发了若干内容增量
    pub fn record_tokens(&mut self, count: usize) {
        self.token_count += count as u32;
    }

    /// 记录一次解码错误
    pub fn record_decode_error(&mut self) {
        self.decode_error_count += 1;
    }

    /// 标记流结束
    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// 流持续时间（毫秒）
    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as u64)
    }

    /// 输出汇总日志
    pub fn log_summary(&self, request_id: &str) {
        info!(
            request_id,
            chunk_count = self.chunk_count,
            total_bytes = self.total_bytes,
            token_count = self.token_count,
            decode_errors = self.decode_error_count,
            ttfb_ms = ?self.ttfb_ms,
            duration_ms = ?self.duration_ms(),
            "[STREAM_METRICS] 流式会话结束"
        );
    }
}

// ============================================================================
// 测试模块
// ============================================================================
