//! 注入上下文
//!
//! 封装"我正在处理哪个任务的哪个平台"这一信息

use std::fmt::Display;

/// 注入上下文
#[derive(Debug, Clone)]
pub struct InjectionCtx {
    /// 任务ID
    pub job_id: String,

    /// 平台ID
    pub platform_id: String,
}

impl InjectionCtx {
    pub fn new(job_id: impl Into<String>, platform_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            platform_id: platform_id.into(),
        }
    }
}

impl Display for InjectionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {} 平台 {}]", self.job_id, self.platform_id)
    }
}
