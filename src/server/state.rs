use std::sync::Arc;

use super::error::{Result, Unauthorized};
use crate::DefaultPipeline;

/// 应用状态
pub struct AppState {
    /// 入库和查询流水线
    pub pipeline: DefaultPipeline,
    /// 鉴权 token
    pub token: String,
    /// 请求未指定 k 时使用的默认值
    pub default_k: usize,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(pipeline: DefaultPipeline, token: String, default_k: usize) -> Arc<Self> {
        Arc::new(AppState { pipeline, token, default_k })
    }

    pub fn check_token(&self, token: &str) -> Result<()> {
        if token != self.token {
            return Err(Unauthorized.into());
        }
        Ok(())
    }
}
