//! 应用装配 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源的创建和后台任务的生命周期。
//!
//! 1. **连接浏览器**：连接已启动的 Chrome，必要时启动无头浏览器
//! 2. **装配依赖**：宿主、标签池、选择器目录、历史记录、失败上报
//! 3. **后台任务**：标签池巡检、目录定期刷新、回复收集
//! 4. **对外接口**：`send` 发起一次多平台注入

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser::{self, ChromeHost};
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::HostSurface;
use crate::models::InjectOptions;
use crate::orchestrator::job_processor::{
    spawn_response_collector, JobReport, Orchestrator, ResponseCollector,
};
use crate::orchestrator::tab_pool::TabPool;
use crate::orchestrator::target_processor::{ReadinessSettings, TargetDeps};
use crate::services::{CatalogService, FailureReporter, HistoryStore, TelemetryClient};
use crate::utils::logging;
use crate::workflow::{AgentDeps, AgentSettings};

/// 应用主结构
pub struct App {
    orchestrator: Orchestrator,
    catalog: CatalogService,
    pool: Arc<TabPool>,
    collector: ResponseCollector,
    background: Vec<JoinHandle<()>>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        logging::log_startup(&config);

        let browser = match browser::connect_to_browser(config.browser_debug_port).await {
            Ok(browser) => browser,
            Err(e) if config.headless => {
                warn!("⚠️ {}，改为启动无头浏览器", e);
                browser::launch_headless_browser(config.chrome_executable.as_deref()).await?
            }
            Err(e) => return Err(e),
        };

        let (harvest_tx, harvest_rx) = mpsc::unbounded_channel();
        let reporter: Arc<dyn FailureReporter> = Arc::new(TelemetryClient::new(
            config.telemetry_url.clone(),
            config.client_version.clone(),
        ));

        let agent_deps = AgentDeps {
            settings: AgentSettings::from_config(&config),
            reporter: reporter.clone(),
            harvest_tx: Some(harvest_tx),
        };
        let host: Arc<dyn HostSurface> = Arc::new(ChromeHost::new(browser, agent_deps).await?);
        let pool = Arc::new(TabPool::new(host.clone()));

        let catalog = CatalogService::load(&config).await;
        let history = Arc::new(HistoryStore::open(config.history_path()).await?);

        let background = vec![
            pool.spawn_maintenance(config.reconcile_interval()),
            catalog.spawn_periodic_refresh(config.selector_ttl()),
        ];
        let collector = spawn_response_collector(history.clone(), harvest_rx);

        let orchestrator = Orchestrator::new(
            TargetDeps {
                host,
                pool: pool.clone(),
                reporter,
                readiness: ReadinessSettings::from_config(&config),
            },
            catalog.clone(),
            history,
            config.signin_detection,
        );

        info!("✓ 初始化完成");
        Ok(Self {
            orchestrator,
            catalog,
            pool,
            collector,
            background,
        })
    }

    /// 发送提示词到多个平台
    pub async fn send(
        &self,
        prompt: &str,
        platforms: &[String],
        options: InjectOptions,
    ) -> JobReport {
        self.orchestrator.inject(prompt, platforms, options).await
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn pool(&self) -> &Arc<TabPool> {
        &self.pool
    }

    /// 等待本次发送的回复写入历史，最多等待 `bound`
    pub async fn wait_for_responses(&mut self, expected: usize, bound: Duration) -> usize {
        if expected == 0 {
            return self.collector.saved();
        }
        info!("⏳ 等待 {} 个平台的回复（最多 {} 秒）...", expected, bound.as_secs());
        self.collector.wait_for(expected, bound).await
    }

    /// 停止后台任务
    pub fn shutdown(self) {
        for task in &self.background {
            task.abort();
        }
        self.collector.abort();
        info!("👋 已停止后台任务");
    }
}
