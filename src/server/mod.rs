//! HTTP 服务模块
//!
//! # 主要组件
//!
//! - `error`: 对外的结构化错误响应
//! - `handlers`: API 端点处理器
//!
//! 每个请求独占自己的解析器与中继流；跨请求共享的只有只读的
//! `Arc<Config>` 与无状态的 Provider 客户端。

pub mod error;
pub mod handlers;

pub use error::ApiError;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use crate::config::Config;
use crate::providers::OpenRouterProvider;
use crate::streaming::StreamingProvider;

/// 应用状态
///
/// 进程启动时构造一次，此后只读。
#[derive(Clone)]
pub struct AppState {
    /// 进程配置
    pub config: Arc<Config>,
    /// 上游 Provider
    pub provider: Arc<dyn StreamingProvider>,
}

impl AppState {
    /// 创建应用状态
    pub fn new(config: Arc<Config>, provider: Arc<dyn StreamingProvider>) -> Self {
        Self { config, provider }
    }
}

/// 构建路由
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/healthz", get(handlers::healthz))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

/// 启动服务并一直运行
pub async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    let provider = Arc::new(OpenRouterProvider::new(
        config.provider.clone(),
        &config.stream,
    ));
    if !provider.is_configured() {
        tracing::warn!("[SERVER] OPENROUTER_API_KEY 未配置，生成请求将被拒绝");
    }

    let state = AppState::new(config.clone(), provider);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("[SERVER] 监听 http://{}", addr);
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
