//! 选择器目录服务
//!
//! 目录来源优先级：远端 → 本地缓存 → 内置默认。
//! 一旦有任何目录可用，读取方永远不会等待网络请求。
//! 目录只会被整体替换，读取方拿到的是 `Arc<Catalog>` 快照。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, CatalogError, StorageError};
use crate::models::{Catalog, FeatureFlags};

/// 一次刷新的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// 仍在有效期内，未发请求
    StillFresh,
    /// 服务端返回 304，只刷新了时间戳
    Revalidated,
    /// 拉取到新目录并整体替换
    Replaced,
    /// 请求失败，继续使用当前目录
    KeptCurrent,
}

struct Inner {
    client: reqwest::Client,
    registry_url: String,
    flags_url: String,
    ttl: Duration,
    cache_path: Option<PathBuf>,
    catalog: RwLock<Arc<Catalog>>,
    flags: RwLock<FeatureFlags>,
    refreshing: AtomicBool,
}

/// 选择器目录服务（可廉价克隆，共享同一份状态）
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<Inner>,
}

impl CatalogService {
    /// 以给定目录创建服务
    pub fn new(config: &Config, initial: Catalog) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                registry_url: config.registry_url.clone(),
                flags_url: config.flags_url.clone(),
                ttl: config.selector_ttl(),
                cache_path: Some(config.catalog_cache_path()),
                catalog: RwLock::new(Arc::new(initial)),
                flags: RwLock::new(FeatureFlags::default()),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    /// 启动时加载：本地缓存可用则用缓存，否则用内置目录
    pub async fn load(config: &Config) -> Self {
        let path = config.catalog_cache_path();
        let initial = match read_cache(&path).await {
            Ok(Some(catalog)) => {
                info!("✓ 已加载本地目录缓存 (版本 {})", catalog.version);
                catalog
            }
            Ok(None) => {
                info!("未找到本地目录缓存，使用内置目录");
                Catalog::builtin()
            }
            Err(e) => {
                warn!("⚠️ 本地目录缓存不可用，使用内置目录: {}", e);
                Catalog::builtin()
            }
        };
        Self::new(config, initial)
    }

    /// 当前目录（不触发刷新）
    pub fn current(&self) -> Arc<Catalog> {
        self.inner.catalog.read().clone()
    }

    pub fn flags(&self) -> FeatureFlags {
        self.inner.flags.read().clone()
    }

    /// 登录墙检测是否启用（本地开关与远端开关取或）
    pub fn signin_detection(&self, local_switch: bool) -> bool {
        local_switch || self.inner.flags.read().signin_detection
    }

    /// 获取目录快照；过期时在后台发起一次刷新，本次仍返回旧目录
    pub fn snapshot(&self) -> Arc<Catalog> {
        let catalog = self.current();
        if !catalog.is_fresh(Utc::now(), self.inner.ttl) {
            self.spawn_refresh();
        }
        catalog
    }

    /// 后台刷新（同一时间只有一个）
    fn spawn_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.inner.refreshing.store(false, Ordering::Release);
            return;
        };

        debug!("目录已过期，后台刷新");
        let service = self.clone();
        runtime.spawn(async move {
            service.refresh().await;
            service.inner.refreshing.store(false, Ordering::Release);
        });
    }

    /// 刷新目录；任何失败都保留当前目录
    pub async fn refresh(&self) -> RefreshOutcome {
        let current = self.current();
        let force = self.inner.flags.read().force_refresh;

        if !force && current.is_fresh(Utc::now(), self.inner.ttl) {
            debug!("目录仍在有效期内 (版本 {})", current.version);
            return RefreshOutcome::StillFresh;
        }

        match self.fetch(&current).await {
            Ok(Some(catalog)) => {
                info!("✓ 选择器目录已更新: {} → {}", current.version, catalog.version);
                self.replace(catalog).await;
                RefreshOutcome::Replaced
            }
            Ok(None) => {
                debug!("目录未变化 (304)，刷新时间戳");
                self.replace(current.revalidated(Utc::now())).await;
                RefreshOutcome::Revalidated
            }
            Err(e) => {
                warn!("⚠️ 刷新选择器目录失败，继续使用版本 {}: {}", current.version, e);
                RefreshOutcome::KeptCurrent
            }
        }
    }

    /// 条件请求远端目录；`Ok(None)` 表示 304
    async fn fetch(&self, current: &Catalog) -> Result<Option<Catalog>, CatalogError> {
        let url = &self.inner.registry_url;
        let mut request = self.inner.client.get(url);
        if let Some(token) = &current.revalidation_token {
            request = request.header(IF_NONE_MATCH, token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|source| CatalogError::RequestFailed {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CatalogError::BadStatus {
                url: url.clone(),
                status: status.as_u16(),
            });
        }

        let token = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|source| CatalogError::RequestFailed {
                url: url.clone(),
                source,
            })?;

        let catalog = Catalog::from_registry_json(&body, Utc::now(), token)?;
        Ok(Some(catalog))
    }

    async fn replace(&self, catalog: Catalog) {
        let catalog = Arc::new(catalog);
        *self.inner.catalog.write() = catalog.clone();

        if let Some(path) = &self.inner.cache_path {
            if let Err(e) = write_cache(path, &catalog).await {
                warn!("⚠️ 写入目录缓存失败: {}", e);
            }
        }
    }

    /// 拉取远端功能开关；失败时保留当前开关
    pub async fn refresh_flags(&self) -> FeatureFlags {
        let url = &self.inner.flags_url;
        let result = async {
            let response = self.inner.client.get(url).send().await?.error_for_status()?;
            response.json::<FeatureFlags>().await
        }
        .await;

        match result {
            Ok(flags) => {
                debug!("功能开关: {:?}", flags);
                *self.inner.flags.write() = flags.clone();
                flags
            }
            Err(e) => {
                warn!("⚠️ 拉取功能开关失败，沿用当前设置: {}", e);
                self.flags()
            }
        }
    }

    /// 周期性刷新开关与目录
    pub fn spawn_periodic_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                service.refresh_flags().await;
                service.refresh().await;
            }
        })
    }
}

async fn read_cache(path: &PathBuf) -> AppResult<Option<Catalog>> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
    };

    let catalog = serde_json::from_slice(&content).map_err(|source| StorageError::ParseFailed {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(catalog))
}

async fn write_cache(path: &PathBuf, catalog: &Catalog) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::file_write_failed(dir.display().to_string(), e))?;
    }
    let content = serde_json::to_vec_pretty(catalog).map_err(CatalogError::from)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}
