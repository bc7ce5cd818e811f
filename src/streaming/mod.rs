//! 流式传输核心模块
//!
//! 提供从上游事件流到下游纯文本增量流的端到端转发支持。
//!
//! # 主要组件
//!
//! - `error`: 流式错误类型定义
//! - `extractor`: SSE 内容增量解析器
//! - `relay`: 中继流与超时包装
//! - `metrics`: 流式指标类型定义
//! - `traits`: StreamingProvider trait 定义

pub mod error;
pub mod extractor;
pub mod metrics;
pub mod relay;
pub mod traits;

// 重新导出核心类型
pub use error::StreamError;
pub use extractor::{ParserState, SseTokenParser};
pub use metrics::StreamMetrics;
pub use relay::{
    collect_tokens, with_timeout, RelayState, TimeoutStream, TokenRelayStream, INTERRUPT_NOTICE,
};
pub use traits::{reqwest_stream_to_stream_response, StreamResponse, StreamingProvider};
