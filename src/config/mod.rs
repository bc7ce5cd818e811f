//! 配置管理模块
//!
//! 进程启动时从环境变量读取一次配置，构造不可变的 [`Config`]，
//! 之后以 `Arc<Config>` 传入各请求处理逻辑。请求路径上不允许再
//! 临时读取环境变量。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量的值无法解析
    #[error("环境变量 {name} 的值无效: {value}")]
    InvalidValue { name: String, value: String },
}

/// 服务端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 请求体大小上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// 提示词最大长度（字符数）
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// 是否在错误响应中附带内部细节（仅限非生产环境开启）
    #[serde(default)]
    pub expose_error_details: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_max_body_bytes() -> usize {
    64 * 1024 // 64KB，足够容纳最长提示词的 JSON 包装
}

fn default_max_prompt_chars() -> usize {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
            max_prompt_chars: default_max_prompt_chars(),
            expose_error_details: false,
        }
    }
}

/// 上游 Provider 配置
///
/// 凭证允许缺失：服务可以无凭证启动，但请求会在发起任何
/// 网络调用之前被拒绝。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key
    pub api_key: Option<String>,
    /// 接口基地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 模型标识
    #[serde(default = "default_model")]
    pub model: String,
    /// HTTP-Referer 头（OpenRouter 用于来源统计）
    #[serde(default)]
    pub referer: Option<String>,
    /// X-Title 头（OpenRouter 展示的应用名）
    #[serde(default)]
    pub title: Option<String>,
}

fn default_base_url() -> String {
    "https://openrouter.ai/api".to_string()
}

fn default_model() -> String {
    "deepseek/deepseek-chat".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            referer: None,
            title: None,
        }
    }
}

/// 重试配置
///
/// 只对上游 5xx 和传输层失败生效，4xx 一律不重试。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// 最大尝试次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 退避基础延迟（毫秒）
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 退避倍率，每次尝试后乘以该值
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// 流式配置
///
/// 控制单次上游调用的超时和解码器的熔断阈值。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// 单次尝试的总超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// 两个 chunk 之间的最大等待时间（毫秒）
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_timeout_ms: u64,
    /// 解码器待处理缓冲区上限（字节）
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,
    /// 解码错误熔断阈值
    #[serde(default = "default_max_decode_errors")]
    pub max_decode_errors: u32,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_chunk_timeout_ms() -> u64 {
    30_000
}

fn default_max_pending_bytes() -> usize {
    100_000
}

fn default_max_decode_errors() -> u32 {
    10
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            chunk_timeout_ms: default_chunk_timeout_ms(),
            max_pending_bytes: default_max_pending_bytes(),
            max_decode_errors: default_max_decode_errors(),
        }
    }
}

impl StreamSettings {
    /// 创建新的流式配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置总超时
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// 设置 chunk 超时
    pub fn with_chunk_timeout_ms(mut self, chunk_timeout_ms: u64) -> Self {
        self.chunk_timeout_ms = chunk_timeout_ms;
        self
    }

    /// 设置缓冲区上限
    pub fn with_max_pending_bytes(mut self, max_pending_bytes: usize) -> Self {
        self.max_pending_bytes = max_pending_bytes;
        self
    }

    /// 设置解码错误熔断阈值
    pub fn with_max_decode_errors(mut self, max_decode_errors: u32) -> Self {
        self.max_decode_errors = max_decode_errors;
        self
    }

    /// 获取总超时 Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 获取 chunk 超时 Duration
    pub fn chunk_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.chunk_timeout_ms)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志过滤指令，语法同 RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,thesiscast_lib=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// 进程配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 服务端配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上游 Provider 配置
    #[serde(default)]
    pub provider: ProviderConfig,
    /// 重试配置
    #[serde(default)]
    pub retry: RetrySettings,
    /// 流式配置
    #[serde(default)]
    pub stream: StreamSettings,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// 从环境变量构造配置
    ///
    /// 未设置的变量取默认值；已设置但无法解析的数值类变量报错，
    /// 不做静默回退。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = env_string("THESISCAST_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parsed("THESISCAST_PORT")? {
            config.server.port = port;
        }
        if let Some(max_prompt) = env_parsed("THESISCAST_MAX_PROMPT_CHARS")? {
            config.server.max_prompt_chars = max_prompt;
        }
        if let Some(expose) = env_parsed("THESISCAST_EXPOSE_ERROR_DETAILS")? {
            config.server.expose_error_details = expose;
        }

        config.provider.api_key = env_string("OPENROUTER_API_KEY");
        if let Some(base_url) = env_string("OPENROUTER_BASE_URL") {
            config.provider.base_url = base_url;
        }
        if let Some(model) = env_string("OPENROUTER_MODEL") {
            config.provider.model = model;
        }
        config.provider.referer = env_string("OPENROUTER_SITE_URL");
        config.provider.title = env_string("OPENROUTER_SITE_NAME");

        if let Some(max_attempts) = env_parsed("THESISCAST_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(base_delay) = env_parsed("THESISCAST_RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay_ms = base_delay;
        }
        if let Some(timeout) = env_parsed("THESISCAST_STREAM_TIMEOUT_MS")? {
            config.stream.timeout_ms = timeout;
        }
        if let Some(filter) = env_string("THESISCAST_LOG") {
            config.logging.filter = filter;
        }

        Ok(config)
    }
}

/// 读取字符串环境变量，空串视为未设置
fn env_string(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// 读取并解析环境变量
fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env_string(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
