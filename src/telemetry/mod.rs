//! 日志初始化
//!
//! 基于 tracing 的结构化日志。过滤规则优先取 RUST_LOG，
//! 其次取配置中的 filter 字段。

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// 初始化全局日志订阅器
///
/// 进程启动时调用一次；重复调用会被忽略（测试场景）。
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
