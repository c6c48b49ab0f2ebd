//! 基于 chromiumoxide 的宿主实现
//!
//! 每个页面分配一个 `PageId`，页面代理在宿主进程内运行，
//! 通过 `ChromeDom` 操作页面。CDP 的 `Target.targetDestroyed`
//! 事件被转换为页面关闭通知。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::{EventTargetDestroyed, TargetId};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::{ChromeDom, HostSurface, JsExecutor, PageId, PageInfo};
use crate::models::{AgentMessage, AgentReply};
use crate::workflow::{AgentDeps, PageAgent};

struct Tab {
    page: Page,
    target_id: TargetId,
    agent: Option<Arc<PageAgent>>,
}

type TabMap = Arc<Mutex<HashMap<PageId, Tab>>>;

/// Chrome 宿主
pub struct ChromeHost {
    browser: Browser,
    deps: AgentDeps,
    tabs: TabMap,
    next_id: AtomicU64,
    closed_tx: broadcast::Sender<PageId>,
    listener: JoinHandle<()>,
}

impl ChromeHost {
    pub async fn new(browser: Browser, deps: AgentDeps) -> AppResult<Self> {
        let (closed_tx, _) = broadcast::channel(64);
        let tabs: TabMap = Arc::new(Mutex::new(HashMap::new()));

        let mut destroyed = browser.event_listener::<EventTargetDestroyed>().await?;
        let listener = {
            let tabs = Arc::clone(&tabs);
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = destroyed.next().await {
                    let closed = {
                        let mut tabs = tabs.lock();
                        let id = tabs
                            .iter()
                            .find(|(_, tab)| tab.target_id == event.target_id)
                            .map(|(id, _)| *id);
                        if let Some(id) = id {
                            tabs.remove(&id);
                        }
                        id
                    };

                    if let Some(page) = closed {
                        info!("🗙 页面 {} 已被关闭", page);
                        // 没有订阅者时发送失败是正常的
                        let _ = closed_tx.send(page);
                    }
                }
                debug!("页面关闭事件流已结束");
            })
        };

        Ok(Self {
            browser,
            deps,
            tabs,
            next_id: AtomicU64::new(1),
            closed_tx,
            listener,
        })
    }

    fn page(&self, id: PageId) -> AppResult<Page> {
        self.tabs
            .lock()
            .get(&id)
            .map(|tab| tab.page.clone())
            .ok_or_else(|| BrowserError::PageClosed { page: id }.into())
    }
}

#[async_trait]
impl HostSurface for ChromeHost {
    async fn open_page(&self, url: &str) -> AppResult<PageId> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| AppError::page_creation_failed(url, e))?;

        let id = PageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let target_id = page.target_id().clone();
        self.tabs.lock().insert(
            id,
            Tab {
                page,
                target_id,
                agent: None,
            },
        );
        debug!("已打开页面 {} → {}", id, url);
        Ok(id)
    }

    async fn inspect_page(&self, id: PageId) -> AppResult<Option<PageInfo>> {
        let page = self.tabs.lock().get(&id).map(|tab| tab.page.clone());
        let Some(page) = page else {
            return Ok(None);
        };

        let url = page.url().await?.unwrap_or_default();
        let loaded = match page.evaluate("document.readyState").await {
            Ok(result) => result
                .into_value::<String>()
                .map(|state| state == "complete")
                .unwrap_or(false),
            Err(e) => {
                debug!("读取页面 {} 加载状态失败: {}", id, e);
                false
            }
        };

        Ok(Some(PageInfo { url, loaded }))
    }

    async fn focus_page(&self, id: PageId) -> AppResult<()> {
        self.page(id)?.bring_to_front().await?;
        Ok(())
    }

    async fn inject_agent(&self, id: PageId, platform_id: &str) -> AppResult<()> {
        let page = self.page(id)?;

        let reusable = self
            .tabs
            .lock()
            .get(&id)
            .and_then(|tab| tab.agent.as_ref())
            .is_some_and(|agent| agent.platform_id() == platform_id);

        let dom = ChromeDom::new(JsExecutor::new(page));
        dom.install().await?;
        if reusable {
            return Ok(());
        }

        let agent = Arc::new(PageAgent::new(Arc::new(dom), platform_id, self.deps.clone()));
        match self.tabs.lock().get_mut(&id) {
            Some(tab) => tab.agent = Some(agent),
            None => return Err(BrowserError::PageClosed { page: id }.into()),
        }
        debug!("页面 {} 已注入 {} 代理", id, platform_id);
        Ok(())
    }

    async fn send_message(&self, id: PageId, message: AgentMessage) -> AppResult<AgentReply> {
        let agent = self
            .tabs
            .lock()
            .get(&id)
            .and_then(|tab| tab.agent.clone())
            .ok_or(BrowserError::AgentMissing { page: id })?;

        Ok(agent.handle(message).await)
    }

    fn page_closed_events(&self) -> broadcast::Receiver<PageId> {
        self.closed_tx.subscribe()
    }
}

impl Drop for ChromeHost {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
