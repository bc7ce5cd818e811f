//! 统一的 Provider 错误类型
//!
//! 把上游调用的各类失败归入固定的分类，区分可重试和不可重试
//! 错误，并为每一类提供机器可读的错误码与对外的 HTTP 状态。

use std::error::Error;
use std::fmt;

/// Provider 统一错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 网络错误（可重试）
    /// 连接失败、连接被重置、DNS 解析失败等传输层问题
    NetworkError(String),

    /// 超时（可重试）
    /// 单次尝试超过配置的截止时间
    Timeout(String),

    /// 认证错误（不可重试）
    /// 上游返回 401/403，凭证无效或无权限
    AuthenticationError(String),

    /// 配置错误（不可重试）
    /// 凭证缺失等部署问题，在发起网络调用之前即被拒绝
    ConfigurationError(String),

    /// 限流错误（不可重试，调用方应稍后再试）
    /// 上游返回 429
    RateLimitError(String),

    /// 服务不可用（可重试）
    /// 上游返回 503
    ServiceUnavailable(String),

    /// 服务器错误（可重试）
    /// 503 以外的 5xx
    ServerError { status: u16, message: String },

    /// 请求错误（不可重试）
    /// 401/429 以外的 4xx，保留上游状态码原样转发
    RequestError { status: u16, message: String },

    /// 响应缺少 body（不可重试）
    /// 状态码成功但上游没有返回任何可读取的内容
    NoResponseBody,

    /// 未知错误
    Unknown(String),
}

impl ProviderError {
    /// 判断错误是否可重试
    ///
    /// 只有传输层失败、超时和上游 5xx 可重试；4xx（包括认证
    /// 与限流）立即返回给调用方。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::NetworkError(_)
                | ProviderError::Timeout(_)
                | ProviderError::ServiceUnavailable(_)
                | ProviderError::ServerError { .. }
        )
    }

    /// 获取机器可读的错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            ProviderError::NetworkError(_) => "UPSTREAM_ERROR",
            ProviderError::Timeout(_) => "TIMEOUT",
            ProviderError::AuthenticationError(_) => "AUTH_ERROR",
            ProviderError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            ProviderError::RateLimitError(_) => "RATE_LIMIT",
            ProviderError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ProviderError::ServerError { .. } => "UPSTREAM_SERVER_ERROR",
            ProviderError::RequestError { .. } => "UPSTREAM_ERROR",
            ProviderError::NoResponseBody => "NO_RESPONSE_BODY",
            ProviderError::Unknown(_) => "UPSTREAM_ERROR",
        }
    }

    /// 获取对外的 HTTP 状态码
    ///
    /// 上游 5xx 一律以 502 转发；4xx 保留上游自己的状态码；
    /// 配置错误对外是 500；超时对外是 504。
    pub fn http_status(&self) -> u16 {
        match self {
            ProviderError::NetworkError(_) => 502,
            ProviderError::Timeout(_) => 504,
            ProviderError::AuthenticationError(_) => 401,
            ProviderError::ConfigurationError(_) => 500,
            ProviderError::RateLimitError(_) => 429,
            ProviderError::ServiceUnavailable(_) => 502,
            ProviderError::ServerError { .. } => 502,
            ProviderError::RequestError { status, .. } => *status,
            ProviderError::NoResponseBody => 502,
            ProviderError::Unknown(_) => 502,
        }
    }

    /// 获取用户可读的错误信息
    ///
    /// 配置类错误只给出笼统描述，不向调用方泄漏部署细节。
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::NetworkError(_) => "网络连接失败，请稍后重试".to_string(),
            ProviderError::Timeout(_) => "生成服务响应超时，请稍后重试".to_string(),
            ProviderError::AuthenticationError(_) => "上游认证失败，请联系管理员".to_string(),
            ProviderError::ConfigurationError(_) => "服务配置不完整，请联系管理员".to_string(),
            ProviderError::RateLimitError(_) => "请求过于频繁，请稍后重试".to_string(),
            ProviderError::ServiceUnavailable(_) => "生成服务暂时不可用，请稍后重试".to_string(),
            ProviderError::ServerError { .. } => "生成服务出错，请稍后重试".to_string(),
            ProviderError::RequestError { message, .. } => format!("请求被上游拒绝: {}", message),
            ProviderError::NoResponseBody => "生成服务没有返回内容".to_string(),
            ProviderError::Unknown(_) => "发生未知错误，请稍后重试".to_string(),
        }
    }

    /// 获取内部诊断信息，仅在非生产配置下对外输出
    pub fn internal_detail(&self) -> String {
        match self {
            ProviderError::NetworkError(msg)
            | ProviderError::Timeout(msg)
            | ProviderError::AuthenticationError(msg)
            | ProviderError::ConfigurationError(msg)
            | ProviderError::RateLimitError(msg)
            | ProviderError::ServiceUnavailable(msg)
            | ProviderError::Unknown(msg) => msg.clone(),
            ProviderError::ServerError { status, message }
            | ProviderError::RequestError { status, message } => {
                format!("HTTP {} - {}", status, message)
            }
            ProviderError::NoResponseBody => "上游响应 body 为空".to_string(),
        }
    }

    /// 从上游 HTTP 状态码创建错误
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let message = truncate_message(body, 200);
        match status {
            401 | 403 => ProviderError::AuthenticationError(format!("HTTP {} - {}", status, message)),
            429 => ProviderError::RateLimitError(format!("HTTP {} - {}", status, message)),
            503 => ProviderError::ServiceUnavailable(format!("HTTP {} - {}", status, message)),
            500..=599 => ProviderError::ServerError { status, message },
            400..=499 => ProviderError::RequestError { status, message },
            _ => ProviderError::Unknown(format!("HTTP {} - {}", status, message)),
        }
    }

    /// 从 reqwest 错误创建
    pub fn from_reqwest_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_connect() {
            ProviderError::NetworkError(format!("无法连接到上游: {}", err))
        } else if let Some(status) = err.status() {
            ProviderError::from_http_status(status.as_u16(), &err.to_string())
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code(), self.internal_detail())
    }
}

impl Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::from_reqwest_error(&err)
    }
}

/// 截断消息到指定长度（按字符边界）
fn truncate_message(msg: &str, max_len: usize) -> String {
    if msg.chars().count() <= max_len {
        msg.to_string()
    } else {
        let truncated: String = msg.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}
