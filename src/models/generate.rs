//! 生成请求类型与提示词校验
//!
//! 前端把表单内容拼成一段自然语言提示词后提交到 `/api/generate`，
//! 这里负责在发起任何上游调用之前完成校验。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 生成请求
///
/// 请求体只有一个字段，提示词在提交后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// 自然语言提示词
    pub prompt: String,
}

/// 提示词校验错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// 去除首尾空白后为空
    Empty,
    /// 超过配置的最大长度（字符数）
    TooLong { length: usize, max: usize },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::Empty => write!(f, "提示词不能为空"),
            PromptError::TooLong { length, max } => {
                write!(f, "提示词过长: {} 字符，上限 {}", length, max)
            }
        }
    }
}

impl std::error::Error for PromptError {}

impl GenerateRequest {
    /// 校验并返回规范化后的提示词
    ///
    /// 先去除首尾空白再检查：空提示词和超长提示词都在这里拒绝，
    /// 校验失败时调用方不得发起上游请求。
    pub fn validated_prompt(&self, max_chars: usize) -> Result<&str, PromptError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(PromptError::Empty);
        }

        let length = prompt.chars().count();
        if length > max_chars {
            return Err(PromptError::TooLong {
                length,
                max: max_chars,
            });
        }

        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_prompt_is_trimmed() {
        let request = GenerateRequest {
            prompt: "  基于深度学习的图像识别系统  ".to_string(),
        };

        let prompt = request.validated_prompt(10_000).unwrap();
        assert_eq!(prompt, "基于深度学习的图像识别系统");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let request = GenerateRequest {
            prompt: "   \n\t ".to_string(),
        };

        assert_eq!(request.validated_prompt(10_000), Err(PromptError::Empty));
    }

    #[test]
    fn test_over_limit_rejected() {
        let request = GenerateRequest {
            prompt: "字".repeat(101),
        };

        assert_eq!(
            request.validated_prompt(100),
            Err(PromptError::TooLong {
                length: 101,
                max: 100
            })
        );
    }

    #[test]
    fn test_limit_counts_chars_not_bytes() {
        // 100 个汉字是 300 字节，但按字符数计仍在上限内
        let request = GenerateRequest {
            prompt: "字".repeat(100),
        };

        assert!(request.validated_prompt(100).is_ok());
    }
}
