//! 流式传输错误类型
//!
//! 定义中继流式传输过程中可能发生的各种错误。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 流式传输错误
///
/// 涵盖从上游读取、解码到向下游转发的全部错误情况。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum StreamError {
    /// 网络错误
    ///
    /// 连接被重置、读取失败或 DNS 解析失败时发生。
    Network(String),

    /// 超时
    ///
    /// 单次尝试超过总超时，或两个 chunk 之间等待过久。
    Timeout,

    /// 解码失败
    ///
    /// 连续畸形记录达到熔断阈值后的不可恢复失败。
    /// 单条畸形记录不会产生该错误，只会被跳过并计数。
    Decode(String),

    /// 缓冲区溢出
    ///
    /// 上游持续不发送换行符，待处理缓冲区超过上限。
    BufferOverflow,

    /// 客户端断开连接
    ClientDisconnected,

    /// 内部错误
    Internal(String),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Network(msg) => write!(f, "网络错误: {}", msg),
            StreamError::Timeout => write!(f, "流式响应超时"),
            StreamError::Decode(msg) => write!(f, "解码失败: {}", msg),
            StreamError::BufferOverflow => write!(f, "缓冲区溢出"),
            StreamError::ClientDisconnected => write!(f, "客户端已断开连接"),
            StreamError::Internal(msg) => write!(f, "内部错误: {}", msg),
        }
    }
}

impl std::error::Error for StreamError {}

// ============================================================================
// From trait 实现 - 用于错误转换
// ============================================================================

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Network(err.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout
        } else if err.is_connect() {
            StreamError::Network(format!("连接失败: {}", err))
        } else {
            StreamError::Network(err.to_string())
        }
    }
}

// ============================================================================
// 辅助方法
// ============================================================================

impl StreamError {
    /// 创建网络错误
    pub fn network(msg: impl Into<String>) -> Self {
        StreamError::Network(msg.into())
    }

    /// 创建解码错误
    pub fn decode(msg: impl Into<String>) -> Self {
        StreamError::Decode(msg.into())
    }

    /// 创建内部错误
    pub fn internal(msg: impl Into<String>) -> Self {
        StreamError::Internal(msg.into())
    }

    /// 判断错误是否发生在传输层
    ///
    /// 传输层失败在流中途发生时，向下游追加一条可读的中断提示
    /// 后以错误状态关闭；解码熔断则直接以错误状态关闭。
    pub fn is_transport(&self) -> bool {
        matches!(self, StreamError::Network(_) | StreamError::Timeout)
    }

    /// 转换为 io::Error
    ///
    /// 下游 HTTP body 流以 io::Error 收尾时，连接会以错误状态
    /// 关闭，调用方由此区分部分成功与完整成功。
    pub fn into_io_error(self) -> std::io::Error {
        let kind = match &self {
            StreamError::Timeout => std::io::ErrorKind::TimedOut,
            StreamError::ClientDisconnected => std::io::ErrorKind::BrokenPipe,
            StreamError::Network(_) => std::io::ErrorKind::ConnectionAborted,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, self.to_string())
    }
}

// ============================================================================
// 测试模块
// ============================================================================
