//! thesiscast - 毕业设计写作助手的 AI 生成中继服务
//!
//! 接收前端提交的提示词，转发到 OpenRouter 兼容的上游模型
//! 接口，把流式返回的内容增量实时中继给调用方。

pub mod config;
pub mod models;
pub mod providers;
pub mod server;
pub mod streaming;
pub mod telemetry;
