//! 元素解析能力
//!
//! 按排名顺序尝试候选选择器，直到找到可见元素或共享时间预算耗尽。
//!
//! 每个轮询周期按顺序探测全部候选，排名靠前的可见命中优先；
//! 一轮都未命中则等待一个轮询间隔（不超过剩余预算）再试。
//! 预算属于整次调用，而不是单个候选。

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::ResolveError;
use crate::infrastructure::{ElementSnapshot, PageDom};
use crate::models::selector::{describe, Selector};

/// 默认轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 元素解析器
pub struct ElementResolver<'a> {
    dom: &'a dyn PageDom,
    poll_interval: Duration,
}

impl<'a> ElementResolver<'a> {
    pub fn new(dom: &'a dyn PageDom) -> Self {
        Self {
            dom,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// 在 `budget` 内找到第一个可见元素
    ///
    /// 返回的元素一定满足可见性判定；候选列表为空时立即失败。
    pub async fn resolve(
        &self,
        candidates: &[Selector],
        budget: Duration,
    ) -> Result<ElementSnapshot, ResolveError> {
        if candidates.is_empty() {
            return Err(ResolveError::AllSelectorsExhausted { candidates: vec![] });
        }

        let deadline = Instant::now() + budget;
        let mut rounds = 0u32;

        loop {
            rounds += 1;
            if let Some(found) = self.probe_round(candidates).await {
                return Ok(found);
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }

        debug!("🔍 {} 轮探测后所有候选均未命中", rounds);
        Err(ResolveError::AllSelectorsExhausted {
            candidates: describe(candidates),
        })
    }

    /// 在预算内是否出现任一可见标记
    pub async fn is_present(&self, candidates: &[Selector], budget: Duration) -> bool {
        self.resolve(candidates, budget).await.is_ok()
    }

    async fn probe_round(&self, candidates: &[Selector]) -> Option<ElementSnapshot> {
        for (rank, selector) in candidates.iter().enumerate() {
            match self.dom.probe(selector).await {
                Ok(Some(snapshot)) if snapshot.is_visible() => {
                    debug!("✓ 候选 #{} 命中: {}", rank + 1, selector);
                    return Some(snapshot);
                }
                Ok(Some(_)) => debug!("候选 #{} 命中但不可见: {}", rank + 1, selector),
                Ok(None) => {}
                // 非法选择器等错误按未命中处理
                Err(e) => debug!("候选 #{} 探测失败 ({}): {}", rank + 1, selector, e),
            }
        }
        None
    }
}
