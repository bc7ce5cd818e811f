//! OpenAI 兼容的上游请求类型
//!
//! OpenRouter 等聚合服务使用 OpenAI 的 chat/completions 接口形状，
//! 这里只保留本服务实际发送的字段。

use serde::{Deserialize, Serialize};

/// 聊天消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// 角色：system / user / assistant
    pub role: String,
    /// 消息内容
    pub content: String,
}

impl ChatMessage {
    /// 创建用户消息
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// 聊天补全请求
///
/// 序列化后作为上游 POST body 发送。`stream` 恒为 true，
/// 本服务不发起非流式调用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// 模型标识
    pub model: String,
    /// 是否流式返回
    pub stream: bool,
    /// 消息列表
    pub messages: Vec<ChatMessage>,
    /// 采样温度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// 最大生成 token 数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    /// 从单条用户提示词构建流式请求
    pub fn streaming(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            messages: vec![ChatMessage::user(prompt)],
            temperature: None,
            max_tokens: None,
        }
    }

    /// 设置采样温度
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// 设置最大生成 token 数
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_request_shape() {
        let request = ChatCompletionRequest::streaming("deepseek/deepseek-chat", "写一段开题报告");

        assert!(request.stream);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.messages[0].content, "写一段开题报告");
    }

    #[test]
    fn test_optional_fields_skipped() {
        let request = ChatCompletionRequest::streaming("m", "p");
        let json = serde_json::to_value(&request).unwrap();

        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream"], serde_json::json!(true));
    }

    #[test]
    fn test_builder_fields_serialized() {
        let request = ChatCompletionRequest::streaming("m", "p")
            .with_temperature(0.7)
            .with_max_tokens(2048);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["temperature"], serde_json::json!(0.7));
        assert_eq!(json["max_tokens"], serde_json::json!(2048));
    }
}
