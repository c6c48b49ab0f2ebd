//! 单个平台处理器 - 编排层
//!
//! ## 职责
//!
//! 把一个平台从"拿到页面"推进到"拿到结果"：
//!
//! 1. **获取页面**：通过标签池复用或新开
//! 2. **等待就绪**：轮询加载状态，再给单页应用留出渲染时间
//! 3. **注入代理**：在页面中注入页面代理
//! 4. **发送指令**：发送注入消息并把回复转换成 `Outcome`
//!
//! 任何错误都在这里变成 `Outcome`，不会影响其他平台。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::{HostSurface, PageId};
use crate::models::platform;
use crate::models::{AgentMessage, AgentReply, Catalog, InjectOptions, Outcome};
use crate::orchestrator::tab_pool::TabPool;
use crate::services::{FailureReport, FailureReporter};
use crate::workflow::InjectionCtx;

/// 页面就绪等待参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// 加载完成后留给前端框架渲染的时间
    pub hydration_grace: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
            hydration_grace: Duration::from_secs(4),
        }
    }
}

impl ReadinessSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.page_ready_timeout(),
            hydration_grace: config.hydration_grace(),
            ..Self::default()
        }
    }
}

/// 单个平台流水线的共享依赖
#[derive(Clone)]
pub struct TargetDeps {
    pub host: Arc<dyn HostSurface>,
    pub pool: Arc<TabPool>,
    pub reporter: Arc<dyn FailureReporter>,
    pub readiness: ReadinessSettings,
}

/// 单次请求的参数
pub struct TargetRequest<'a> {
    pub prompt: &'a str,
    pub options: InjectOptions,
    pub catalog: &'a Catalog,
    pub signin_detection: bool,
}

/// 处理单个平台，总是返回一个 `Outcome`
pub async fn process_target(
    deps: &TargetDeps,
    ctx: &InjectionCtx,
    request: &TargetRequest<'_>,
) -> Outcome {
    info!("{} 🚀 开始处理", ctx);

    let outcome = match run_target(deps, ctx, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{} ❌ 处理失败: {}", ctx, e);
            deps.reporter.report(FailureReport::new(
                ctx.platform_id.clone(),
                "unexpected_error",
                vec![],
            ));
            Outcome::unexpected(e.to_string())
        }
    };

    log_outcome(ctx, &outcome);
    outcome
}

async fn run_target(
    deps: &TargetDeps,
    ctx: &InjectionCtx,
    request: &TargetRequest<'_>,
) -> AppResult<Outcome> {
    let platform = platform::lookup(&ctx.platform_id)
        .ok_or_else(|| AppError::Other(format!("未知平台: {}", ctx.platform_id)))?;
    let selectors = request
        .catalog
        .selectors_for(platform.id)
        .cloned()
        .ok_or_else(|| {
            AppError::Other(format!(
                "选择器目录 (版本 {}) 中没有平台 {}",
                request.catalog.version, platform.id
            ))
        })?;

    // ========== 获取页面并等待就绪 ==========
    let page = deps.pool.acquire(platform).await?;
    wait_until_ready(deps, ctx, page).await?;
    deps.pool.mark_ready(platform.id, page);

    // ========== 注入代理并发送指令 ==========
    deps.host.inject_agent(page, platform.id).await?;
    debug!("{} 页面代理已注入 {}", ctx, page);

    let message = AgentMessage::InjectPrompt {
        prompt: request.prompt.to_string(),
        platform: platform.id.to_string(),
        selectors,
        options: request.options,
        signin_detection: request.signin_detection,
    };

    match deps.host.send_message(page, message).await? {
        AgentReply::Injected { outcome } => Ok(outcome),
        AgentReply::Busy => {
            warn!("{} ⚠️ 页面上已有注入在进行", ctx);
            Ok(Outcome::unexpected("该页面已有注入正在进行"))
        }
        other => Err(AppError::Other(format!("页面代理返回了意外的回复: {:?}", other))),
    }
}

/// 轮询页面加载状态，超时后仍继续；之后等待渲染宽限期
async fn wait_until_ready(deps: &TargetDeps, ctx: &InjectionCtx, page: PageId) -> AppResult<()> {
    let settings = deps.readiness;
    let started = Instant::now();
    let deadline = started + settings.timeout;

    loop {
        match deps.host.inspect_page(page).await? {
            None => return Err(BrowserError::PageClosed { page }.into()),
            Some(info) if info.loaded => break,
            Some(_) => {}
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(
                "{} ⏱️ 页面 {} 在 {:?} 内未加载完成，继续尝试",
                ctx, page, settings.timeout
            );
            break;
        }
        sleep(settings.poll_interval.min(deadline - now)).await;
    }

    sleep(settings.hydration_grace).await;
    debug!("{} 页面 {} 就绪，用时 {:?}", ctx, page, started.elapsed());
    Ok(())
}

// ========== 日志辅助函数 ==========

fn log_outcome(ctx: &InjectionCtx, outcome: &Outcome) {
    match outcome {
        Outcome::Success { .. } => info!("{} ✅ 注入成功", ctx),
        other => {
            let summary = other.error_summary().unwrap_or_default();
            let guidance = other.guidance().unwrap_or_default();
            warn!("{} ❌ {} ({})", ctx, summary, guidance);
        }
    }
}
