//! 数据模型模块
//!
//! 定义对外接口和上游接口使用的请求/响应类型。

pub mod generate;
pub mod openai;

pub use generate::{GenerateRequest, PromptError};
pub use openai::{ChatCompletionRequest, ChatMessage};
