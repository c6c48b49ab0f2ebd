//! 标签池 - 编排层
//!
//! ## 职责
//!
//! 维护"平台 → 页面"的映射，每个平台最多一个条目。
//!
//! - 复用：页面仍存在且仍在平台域名下时复用并切到前台
//! - 失效：页面被关闭或用户导航到其他域名时移除条目并新开页面
//! - 巡检：定期移除已被用户关闭的页面，关闭事件则立即移除
//!
//! 池只复用、从不主动关闭页面。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::{HostSurface, PageId};
use crate::models::Platform;

/// 巡检间隔下限
const MIN_RECONCILE_INTERVAL: Duration = Duration::from_secs(1);

/// 池条目的生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// 刚创建或复用，尚未确认加载完成
    Loading,
    Ready,
    /// 巡检发现页面已离开平台域名，下次获取时会被替换
    Stale,
}

/// 池中的一个条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PooledTarget {
    pub platform_id: String,
    pub page: PageId,
    pub last_used_at: DateTime<Utc>,
    pub state: TargetState,
}

/// 标签池
pub struct TabPool {
    host: Arc<dyn HostSurface>,
    entries: Mutex<HashMap<String, PooledTarget>>,
    /// 同一平台的 acquire 串行执行，避免重复开页
    acquire_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TabPool {
    pub fn new(host: Arc<dyn HostSurface>) -> Self {
        Self {
            host,
            entries: Mutex::new(HashMap::new()),
            acquire_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 获取平台对应的页面
    pub async fn acquire(&self, platform: &Platform) -> AppResult<PageId> {
        let lock = self.acquire_lock(platform.id);
        let _guard = lock.lock().await;

        let pooled = self.entries.lock().get(platform.id).map(|entry| entry.page);

        if let Some(page) = pooled {
            match self.host.inspect_page(page).await {
                Ok(Some(info)) if platform.owns_url(&info.url) => {
                    if let Err(e) = self.host.focus_page(page).await {
                        debug!("[平台 {}] 切换页面到前台失败: {}", platform.id, e);
                    }
                    self.touch(platform.id, page);
                    info!("[平台 {}] ♻️ 复用页面 {}", platform.id, page);
                    return Ok(page);
                }
                Ok(Some(info)) => {
                    info!(
                        "[平台 {}] 页面 {} 已离开平台域名 ({})，重新打开",
                        platform.id, page, info.url
                    );
                    self.evict(platform.id, page);
                }
                Ok(None) => {
                    info!("[平台 {}] 页面 {} 已关闭，重新打开", platform.id, page);
                    self.evict(platform.id, page);
                }
                Err(e) => {
                    warn!("[平台 {}] ⚠️ 无法检查页面 {}: {}", platform.id, page, e);
                    self.evict(platform.id, page);
                }
            }
        }

        let page = self.host.open_page(platform.url).await?;
        info!("[平台 {}] 🆕 新开页面 {} → {}", platform.id, page, platform.url);

        self.entries.lock().insert(
            platform.id.to_string(),
            PooledTarget {
                platform_id: platform.id.to_string(),
                page,
                last_used_at: Utc::now(),
                state: TargetState::Loading,
            },
        );
        Ok(page)
    }

    /// 页面加载完成
    pub fn mark_ready(&self, platform_id: &str, page: PageId) {
        if let Some(entry) = self.entries.lock().get_mut(platform_id) {
            if entry.page == page {
                entry.state = TargetState::Ready;
            }
        }
    }

    pub fn get(&self, platform_id: &str) -> Option<PooledTarget> {
        self.entries.lock().get(platform_id).cloned()
    }

    pub fn entries(&self) -> Vec<PooledTarget> {
        let mut entries: Vec<_> = self.entries.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.platform_id.cmp(&b.platform_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// 页面关闭事件：立即移除对应条目
    pub fn handle_closed(&self, page: PageId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.page != page);
        let removed = entries.len() != before;
        if removed {
            debug!("页面 {} 已关闭，移出标签池", page);
        }
        removed
    }

    /// 巡检：移除已关闭的页面，标记离开域名的页面；返回移除数量
    pub async fn reconcile(&self) -> usize {
        let snapshot = self.entries();
        let mut removed = 0;

        for entry in snapshot {
            let expected = crate::models::platform::lookup(&entry.platform_id);
            match self.host.inspect_page(entry.page).await {
                Ok(None) => {
                    if self.evict(&entry.platform_id, entry.page) {
                        removed += 1;
                    }
                }
                Ok(Some(info)) => {
                    let on_domain = expected.is_some_and(|platform| platform.owns_url(&info.url));
                    if !on_domain {
                        self.set_state(&entry.platform_id, entry.page, TargetState::Stale);
                    }
                }
                Err(e) => debug!("巡检页面 {} 失败: {}", entry.page, e),
            }
        }

        if removed > 0 {
            info!("🧹 巡检移除了 {} 个已关闭的页面", removed);
        }
        removed
    }

    /// 启动后台维护：定期巡检 + 关闭事件监听
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        let mut closed = self.host.page_closed_events();

        tokio::spawn(async move {
            // 零间隔会让 interval() panic
            let mut ticker = tokio::time::interval(interval.max(MIN_RECONCILE_INTERVAL));
            // 第一次 tick 立即返回
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.reconcile().await;
                    }
                    event = closed.recv() => match event {
                        Ok(page) => {
                            pool.handle_closed(page);
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("⚠️ 丢失了 {} 个页面关闭事件，立即巡检", missed);
                            pool.reconcile().await;
                        }
                        Err(RecvError::Closed) => {
                            debug!("页面关闭事件通道已关闭，仅保留定期巡检");
                            loop {
                                ticker.tick().await;
                                pool.reconcile().await;
                            }
                        }
                    },
                }
            }
        })
    }

    fn acquire_lock(&self, platform_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.acquire_locks
            .lock()
            .entry(platform_id.to_string())
            .or_default()
            .clone()
    }

    fn touch(&self, platform_id: &str, page: PageId) {
        if let Some(entry) = self.entries.lock().get_mut(platform_id) {
            if entry.page == page {
                entry.last_used_at = Utc::now();
                if entry.state == TargetState::Stale {
                    entry.state = TargetState::Loading;
                }
            }
        }
    }

    fn set_state(&self, platform_id: &str, page: PageId, state: TargetState) {
        if let Some(entry) = self.entries.lock().get_mut(platform_id) {
            if entry.page == page {
                entry.state = state;
            }
        }
    }

    /// 移除条目（仅当它仍指向该页面）
    fn evict(&self, platform_id: &str, page: PageId) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(platform_id) {
            Some(entry) if entry.page == page => {
                entries.remove(platform_id);
                true
            }
            _ => false,
        }
    }
}
