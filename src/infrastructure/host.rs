//! 宿主自动化接口
//!
//! 核心只通过 `HostSurface` 操作浏览器：打开/检查/聚焦页面、注入页面代理、
//! 收发结构化消息、订阅页面关闭事件。真实实现见 `browser::ChromeHost`，
//! 测试中使用内存替身。

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::AppResult;
use crate::models::{AgentMessage, AgentReply};

/// 宿主分配的页面句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// 页面当前状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// 当前地址
    pub url: String,
    /// 文档是否已加载完成
    pub loaded: bool,
}

/// 宿主自动化接口
#[async_trait]
pub trait HostSurface: Send + Sync {
    /// 打开新页面并导航到 `url`
    async fn open_page(&self, url: &str) -> AppResult<PageId>;

    /// 查询页面状态；页面已关闭时返回 `None`
    async fn inspect_page(&self, page: PageId) -> AppResult<Option<PageInfo>>;

    /// 把页面切到前台
    async fn focus_page(&self, page: PageId) -> AppResult<()>;

    /// 在页面中注入页面代理（重复注入是安全的）
    async fn inject_agent(&self, page: PageId, platform_id: &str) -> AppResult<()>;

    /// 向页面代理发送消息并等待回复
    async fn send_message(&self, page: PageId, message: AgentMessage) -> AppResult<AgentReply>;

    /// 订阅页面关闭事件
    fn page_closed_events(&self) -> broadcast::Receiver<PageId>;
}
