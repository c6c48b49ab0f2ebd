//! 任务处理器 - 编排层
//!
//! ## 职责
//!
//! 把一次发送扇出到多个平台，并汇总每个平台的结果。
//!
//! ## 核心功能
//!
//! 1. **创建任务**：分配任务 ID，记录提示词历史
//! 2. **并发扇出**：所有平台的流水线同时运行，互不影响
//! 3. **结果汇总**：按平台 ID 汇总，等待全部平台结束后标记完成
//! 4. **历史记录**：每个平台的结果都写入历史（无论成功与否）
//! 5. **回复收集**：页面代理采集到的回复经通道写入历史

use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{HarvestedResponse, InjectOptions, InjectionJob, JobStatus, Outcome};
use crate::orchestrator::target_processor::{process_target, TargetDeps, TargetRequest};
use crate::services::{CatalogService, HistoryStore, PromptEntry, ResultEntry};
use crate::utils::logging::truncate_text;
use crate::workflow::InjectionCtx;

/// 内存中保留的任务数量
pub const JOB_MEMORY_LIMIT: usize = 50;

/// 一次任务的汇总结果
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub outcomes: BTreeMap<String, Outcome>,
}

impl JobReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }
}

/// 编排器
pub struct Orchestrator {
    deps: TargetDeps,
    catalog: CatalogService,
    history: Arc<HistoryStore>,
    jobs: Mutex<VecDeque<InjectionJob>>,
    /// 本地登录墙检测开关
    signin_detection: bool,
}

impl Orchestrator {
    pub fn new(
        deps: TargetDeps,
        catalog: CatalogService,
        history: Arc<HistoryStore>,
        signin_detection: bool,
    ) -> Self {
        Self {
            deps,
            catalog,
            history,
            jobs: Mutex::new(VecDeque::new()),
            signin_detection,
        }
    }

    /// 向多个平台发送同一个提示词
    pub async fn inject(
        &self,
        prompt: &str,
        platform_ids: &[String],
        options: InjectOptions,
    ) -> JobReport {
        let job_id = format!("inj_{}", Uuid::new_v4().simple());
        let mut platforms: Vec<String> = Vec::with_capacity(platform_ids.len());
        for id in platform_ids {
            if !platforms.contains(id) {
                platforms.push(id.clone());
            }
        }

        log_job_start(&job_id, prompt, &platforms);
        self.remember(InjectionJob {
            job_id: job_id.clone(),
            platforms: platforms.clone(),
            prompt: prompt.to_string(),
            status: JobStatus::Launching,
            per_target_result: BTreeMap::new(),
            created_at: Utc::now(),
        });

        if let Err(e) = self
            .history
            .record_prompt(PromptEntry {
                job_id: job_id.clone(),
                prompt: prompt.to_string(),
                platforms: platforms.clone(),
                timestamp: Utc::now(),
            })
            .await
        {
            warn!("[任务 {}] ⚠️ 记录提示词历史失败: {}", job_id, e);
        }

        let catalog = self.catalog.snapshot();
        let request = TargetRequest {
            prompt,
            options,
            catalog: &catalog,
            signin_detection: self.catalog.signin_detection(self.signin_detection),
        };

        let pipelines = platforms.iter().map(|platform_id| {
            let ctx = InjectionCtx::new(job_id.clone(), platform_id.clone());
            let request = &request;
            async move {
                let outcome = AssertUnwindSafe(process_target(&self.deps, &ctx, request))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| {
                        error!("{} ❌ 流水线异常终止", ctx);
                        Outcome::unexpected("流水线异常终止")
                    });
                self.settle(&ctx, &outcome).await;
                (ctx.platform_id, outcome)
            }
        });

        let outcomes: BTreeMap<String, Outcome> = join_all(pipelines).await.into_iter().collect();

        self.update_job(&job_id, |job| job.status = JobStatus::Completed);
        let report = JobReport { job_id, outcomes };
        log_job_complete(&report);
        report
    }

    /// 查询任务状态
    pub fn job_status(&self, job_id: &str) -> Option<InjectionJob> {
        self.jobs
            .lock()
            .iter()
            .find(|job| job.job_id == job_id)
            .cloned()
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// 单个平台结束：写入任务与历史
    async fn settle(&self, ctx: &InjectionCtx, outcome: &Outcome) {
        self.update_job(&ctx.job_id, |job| {
            job.per_target_result
                .insert(ctx.platform_id.clone(), outcome.clone());
        });

        let entry = ResultEntry::from_outcome(&ctx.job_id, &ctx.platform_id, outcome);
        if let Err(e) = self.history.record_result(entry).await {
            warn!("{} ⚠️ 记录结果历史失败: {}", ctx, e);
        }
    }

    fn remember(&self, job: InjectionJob) {
        let mut jobs = self.jobs.lock();
        jobs.push_front(job);
        jobs.truncate(JOB_MEMORY_LIMIT);
    }

    fn update_job(&self, job_id: &str, update: impl FnOnce(&mut InjectionJob)) {
        if let Some(job) = self.jobs.lock().iter_mut().find(|job| job.job_id == job_id) {
            update(job);
        }
    }
}

/// 回复收集任务
///
/// 把采集到的回复写入历史，并记录已保存的数量。
pub struct ResponseCollector {
    handle: JoinHandle<()>,
    saved: watch::Receiver<usize>,
}

impl ResponseCollector {
    /// 已保存的回复数量
    pub fn saved(&self) -> usize {
        *self.saved.borrow()
    }

    /// 等待已保存的回复达到 `expected` 条，最多等待 `bound`
    pub async fn wait_for(&mut self, expected: usize, bound: Duration) -> usize {
        let reached = tokio::time::timeout(bound, self.saved.wait_for(|n| *n >= expected))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false);
        let saved = self.saved();
        if !reached {
            warn!("⚠️ 等待回复超时: 已保存 {}/{}", saved, expected);
        }
        saved
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

/// 启动回复收集任务
pub fn spawn_response_collector(
    history: Arc<HistoryStore>,
    mut responses: mpsc::UnboundedReceiver<HarvestedResponse>,
) -> ResponseCollector {
    let (counter, saved) = watch::channel(0usize);
    let handle = tokio::spawn(async move {
        while let Some(response) = responses.recv().await {
            info!(
                "[平台 {}] 📝 保存回复: {}",
                response.platform_id,
                truncate_text(&response.text, 40)
            );
            if let Err(e) = history.record_response(response).await {
                warn!("⚠️ 保存回复失败: {}", e);
            }
            counter.send_modify(|n| *n += 1);
        }
    });
    ResponseCollector { handle, saved }
}

// ========== 日志辅助函数 ==========

fn log_job_start(job_id: &str, prompt: &str, platforms: &[String]) {
    info!("{}", "=".repeat(60));
    info!("📤 [任务 {}] 发送到 {} 个平台: {}", job_id, platforms.len(), platforms.join(", "));
    info!("💬 提示词: {}", truncate_text(prompt, 60));
    info!("{}", "=".repeat(60));
}

fn log_job_complete(report: &JobReport) {
    info!("{}", "─".repeat(60));
    info!(
        "✓ [任务 {}] 完成: 成功 {}/{}",
        report.job_id,
        report.success_count(),
        report.outcomes.len()
    );
    info!("{}", "─".repeat(60));
}
