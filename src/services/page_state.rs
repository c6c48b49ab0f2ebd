//! 页面状态检测能力
//!
//! 检测顺序：登录墙（受开关控制）→ 限流标记 → 输入框可定位。
//! 检测从不返回错误，"未在时限内出现" 就是正常结果。

use std::time::Duration;

use tracing::{debug, info};

use crate::infrastructure::PageDom;
use crate::models::{BlockReason, PageState, SelectorSet};
use crate::services::element_resolver::ElementResolver;

/// 各项检测的时限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTimeouts {
    pub signin: Duration,
    pub rate_limit: Duration,
    /// 输入框决定后续所有步骤，时限更长
    pub input: Duration,
}

impl Default for DetectionTimeouts {
    fn default() -> Self {
        Self {
            signin: Duration::from_secs(2),
            rate_limit: Duration::from_secs(2),
            input: Duration::from_secs(12),
        }
    }
}

/// 页面状态检测器
pub struct PageStateDetector<'a> {
    resolver: ElementResolver<'a>,
    timeouts: DetectionTimeouts,
}

impl<'a> PageStateDetector<'a> {
    pub fn new(dom: &'a dyn PageDom, timeouts: DetectionTimeouts) -> Self {
        Self {
            resolver: ElementResolver::new(dom),
            timeouts,
        }
    }

    /// 判定页面是否可以注入
    ///
    /// 登录墙检测误报较多，只有 `signin_detection` 打开时才执行。
    pub async fn detect(&self, selectors: &SelectorSet, signin_detection: bool) -> PageState {
        if signin_detection && !selectors.signin_detect.is_empty() {
            debug!("检测登录墙...");
            if self
                .resolver
                .is_present(&selectors.signin_detect, self.timeouts.signin)
                .await
            {
                info!("🔒 检测到登录墙");
                return PageState::blocked(BlockReason::Signin);
            }
        }

        if !selectors.limit_detect.is_empty() {
            debug!("检测限流标记...");
            if self
                .resolver
                .is_present(&selectors.limit_detect, self.timeouts.rate_limit)
                .await
            {
                info!("⏳ 检测到限流提示");
                return PageState::blocked(BlockReason::RateLimit);
            }
        }

        debug!("等待输入框就绪...");
        if self
            .resolver
            .is_present(&selectors.input, self.timeouts.input)
            .await
        {
            PageState::ready()
        } else {
            info!("⚠️ 输入框在 {:?} 内未就绪", self.timeouts.input);
            PageState::blocked(BlockReason::InputNotFound)
        }
    }
}
