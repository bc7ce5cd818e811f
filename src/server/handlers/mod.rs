//! API 端点处理器

mod generate;

pub use generate::{generate, healthz};
