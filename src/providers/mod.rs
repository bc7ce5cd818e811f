//! 上游 Provider 模块
//!
//! # 主要组件
//!
//! - `error`: 统一的 Provider 错误类型
//! - `openrouter`: OpenRouter Provider 实现
//! - `retry`: 有界重试策略

pub mod error;
pub mod openrouter;
pub mod retry;

pub use error::ProviderError;
pub use openrouter::OpenRouterProvider;
pub use retry::{call_stream_with_retry, RetryPolicy};
