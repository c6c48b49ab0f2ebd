//! 回复采集能力
//!
//! 提交后观察整页变更，判断流式回复何时结束并提取纯文本。
//!
//! 完成条件（任一满足即可）：
//! 1. 回复容器文本长度连续 3 个变更批次不变
//! 2. 停止按钮与流式指示器都已消失
//!
//! 两个条件都只在"长度未变化"的批次上检查。
//! 另有硬上限（默认 3 分钟），到时采集当前已有的文本。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::DomError;
use crate::infrastructure::{ElementRef, PageDom};
use crate::models::{HarvestedResponse, ResponseSelectors, Selector};

/// 采集参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestSettings {
    /// 硬上限
    pub ceiling: Duration,
    /// 容器文本长度必须超过该值才会被采用（过滤空壳）
    pub min_container_len: usize,
    /// 连续多少个不变批次视为稳定
    pub stable_batches: u32,
    /// 提取文本时每块的长度
    pub chunk_size: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(180),
            min_container_len: 50,
            stable_batches: 3,
            chunk_size: 5000,
        }
    }
}

/// 单个批次的长度观察结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// 长度变化，稳定计数清零
    Changed,
    /// 长度不变，携带当前连续不变次数
    Unchanged(u32),
}

/// 长度稳定性跟踪
#[derive(Debug, Clone)]
pub struct CompletionTracker {
    last_len: Option<usize>,
    stable_count: u32,
    threshold: u32,
}

impl CompletionTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            last_len: None,
            stable_count: 0,
            threshold,
        }
    }

    pub fn observe(&mut self, len: usize) -> Observation {
        if self.last_len == Some(len) {
            self.stable_count += 1;
            Observation::Unchanged(self.stable_count)
        } else {
            self.last_len = Some(len);
            self.stable_count = 0;
            Observation::Changed
        }
    }

    pub fn is_stable(&self) -> bool {
        self.stable_count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.last_len = None;
        self.stable_count = 0;
    }
}

/// 采集循环的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Complete,
    Ceiling,
    StreamEnded,
}

/// 回复采集器（每次采集一个实例）
pub struct ResponseHarvester {
    dom: Arc<dyn PageDom>,
    selectors: ResponseSelectors,
    settings: HarvestSettings,
    platform_id: String,
    prompt: String,
    sink: Option<mpsc::UnboundedSender<HarvestedResponse>>,
}

impl ResponseHarvester {
    pub fn new(
        dom: Arc<dyn PageDom>,
        selectors: ResponseSelectors,
        settings: HarvestSettings,
        platform_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            dom,
            selectors,
            settings,
            platform_id: platform_id.into(),
            prompt: prompt.into(),
            sink: None,
        }
    }

    /// 采集结果发送到该通道
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<HarvestedResponse>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 运行采集直到完成或到达上限
    pub async fn run(self) -> Option<HarvestedResponse> {
        let mut batches = match self.dom.observe_mutations().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[平台 {}] ⚠️ 无法观察页面变更: {}", self.platform_id, e);
                return None;
            }
        };
        info!("[平台 {}] 👀 开始采集回复", self.platform_id);

        let deadline = Instant::now() + self.settings.ceiling;
        let mut container: Option<ElementRef> = None;
        let mut tracker = CompletionTracker::new(self.settings.stable_batches);

        let finish = loop {
            let batch = match timeout_at(deadline, batches.next()).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break Finish::StreamEnded,
                Err(_) => break Finish::Ceiling,
            };
            debug!("[平台 {}] 变更批次: {} 条记录", self.platform_id, batch.records);

            let Some(element) = container.clone() else {
                if let Some((element, len)) = self.adopt_container().await {
                    tracker.observe(len);
                    container = Some(element);
                }
                continue;
            };

            let len = match self.dom.text_length(&element).await {
                Ok(len) => len,
                Err(e) => {
                    // 容器被重新渲染，重新寻找
                    debug!("[平台 {}] 回复容器失效: {}", self.platform_id, e);
                    container = None;
                    tracker.reset();
                    continue;
                }
            };

            if let Observation::Unchanged(count) = tracker.observe(len) {
                debug!("[平台 {}] 长度 {} 连续 {} 批未变化", self.platform_id, len, count);
                if tracker.is_stable() || self.markers_gone().await {
                    break Finish::Complete;
                }
            }
        };

        match finish {
            Finish::Complete => info!("[平台 {}] ✓ 回复已完成", self.platform_id),
            Finish::Ceiling => warn!(
                "[平台 {}] ⏱️ 达到采集上限 {:?}，采集当前文本",
                self.platform_id, self.settings.ceiling
            ),
            Finish::StreamEnded => debug!("[平台 {}] 变更流已结束", self.platform_id),
        }

        let text = match &container {
            Some(element) => match self.extract_text(element).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("[平台 {}] ⚠️ 提取回复文本失败: {}", self.platform_id, e);
                    String::new()
                }
            },
            None => String::new(),
        };

        if let Err(e) = self.dom.stop_observing().await {
            debug!("[平台 {}] 停止观察失败: {}", self.platform_id, e);
        }

        if text.trim().is_empty() {
            warn!("[平台 {}] ⚠️ 未采集到回复文本", self.platform_id);
            return None;
        }

        let response = HarvestedResponse {
            platform_id: self.platform_id.clone(),
            prompt: self.prompt.clone(),
            text,
            timestamp: Utc::now(),
        };
        info!(
            "[平台 {}] 📥 采集到 {} 字符",
            self.platform_id,
            response.text.chars().count()
        );

        if let Some(sink) = &self.sink {
            if sink.send(response.clone()).is_err() {
                debug!("[平台 {}] 回复接收端已关闭", self.platform_id);
            }
        }

        Some(response)
    }

    /// 按顺序寻找文本足够长的回复容器
    async fn adopt_container(&self) -> Option<(ElementRef, usize)> {
        for selector in &self.selectors.container {
            match self.dom.probe(selector).await {
                Ok(Some(snapshot)) if snapshot.text_len > self.settings.min_container_len => {
                    debug!("[平台 {}] 采用回复容器: {}", self.platform_id, selector);
                    return Some((snapshot.node, snapshot.text_len));
                }
                Ok(_) => {}
                Err(e) => debug!("[平台 {}] 容器探测失败 ({}): {}", self.platform_id, selector, e),
            }
        }
        None
    }

    /// 停止按钮与流式指示器是否都已消失
    async fn markers_gone(&self) -> bool {
        !self.any_exists(&self.selectors.stop_control).await
            && !self.any_exists(&self.selectors.streaming_indicator).await
    }

    async fn any_exists(&self, selectors: &[Selector]) -> bool {
        for selector in selectors {
            if let Ok(true) = self.dom.exists(selector).await {
                return true;
            }
        }
        false
    }

    /// 分块提取文本，块之间让出执行权
    async fn extract_text(&self, element: &ElementRef) -> Result<String, DomError> {
        let total = self.dom.text_length(element).await?;
        // 至少两个单元，保证代理对不会被拆开
        let chunk_size = self.settings.chunk_size.max(2);
        let mut text = String::with_capacity(total);

        let mut start = 0;
        while start < total {
            let chunk = self.dom.text_slice(element, start, chunk_size).await?;
            // 块可能因代理对边界而变短，按实际长度前进
            let advanced = chunk.encode_utf16().count();
            if advanced == 0 {
                break;
            }
            text.push_str(&chunk);
            start += advanced;
            tokio::task::yield_now().await;
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_fires_after_threshold_unchanged_batches() {
        let mut tracker = CompletionTracker::new(3);

        assert_eq!(tracker.observe(60), Observation::Changed);
        assert_eq!(tracker.observe(120), Observation::Changed);
        assert_eq!(tracker.observe(120), Observation::Unchanged(1));
        assert_eq!(tracker.observe(120), Observation::Unchanged(2));
        assert!(!tracker.is_stable());
        assert_eq!(tracker.observe(120), Observation::Unchanged(3));
        assert!(tracker.is_stable());
    }

    #[test]
    fn test_tracker_resets_on_growth() {
        let mut tracker = CompletionTracker::new(3);
        tracker.observe(100);
        tracker.observe(100);
        tracker.observe(100);
        assert_eq!(tracker.observe(140), Observation::Changed);
        assert!(!tracker.is_stable());
        assert_eq!(tracker.observe(140), Observation::Unchanged(1));
    }

    #[test]
    fn test_tracker_reset_forgets_length() {
        let mut tracker = CompletionTracker::new(3);
        tracker.observe(100);
        tracker.reset();
        assert_eq!(tracker.observe(100), Observation::Changed);
    }
}
