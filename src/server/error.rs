//! 对外的结构化错误响应
//!
//! 任何在输出开始之前发生的失败，都以统一的 JSON 形状返回：
//! `{"error": {"code", "message", "details?"}}`。输出开始之后
//! 的失败走流内提示，不再使用该类型。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::models::PromptError;
use crate::providers::ProviderError;

/// 结构化错误响应
///
/// `details` 携带内部诊断信息，仅在非生产配置下填充。
#[derive(Debug, Clone)]
pub struct ApiError {
    /// 机器可读错误码
    pub code: &'static str,
    /// 用户可读信息
    pub message: String,
    /// HTTP 状态码
    pub status: StatusCode,
    /// 内部诊断细节
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// 提示词校验失败
    pub fn invalid_prompt(err: &PromptError) -> Self {
        Self {
            code: "INVALID_PROMPT",
            message: err.to_string(),
            status: StatusCode::BAD_REQUEST,
            details: None,
        }
    }

    /// 从 Provider 错误构造
    ///
    /// `expose_details` 为真时附带内部诊断信息，生产环境保持关闭。
    pub fn from_provider(err: &ProviderError, expose_details: bool) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        Self {
            code: err.error_code(),
            message: err.user_message(),
            status,
            details: expose_details
                .then(|| serde_json::Value::String(err.internal_detail())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(
            code = self.code,
            status = self.status.as_u16(),
            "[API_ERROR] {}",
            self.message
        );

        let mut error = serde_json::json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }

        (self.status, Json(serde_json::json!({ "error": error }))).into_response()
    }
}
