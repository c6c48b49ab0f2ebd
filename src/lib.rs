//! # PromptCast
//!
//! 把同一个提示词同时发送到多个 AI 聊天网页，并在回复生成完毕后采集文本。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() 能力
//! - `PageDom` / `ChromeDom` - 页面 DOM 能力（探测、输入、点击、观察变更）
//! - `HostSurface` - 宿主自动化接口（开页、检查、聚焦、注入代理、收发消息、关闭事件）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个页面
//! - `ElementResolver` - 排名候选选择器解析（共享超时预算）
//! - `PageStateDetector` - 登录墙 / 限流 / 输入框就绪判定
//! - `ResponseHarvester` - 回复完成判定与分块提取
//! - `CatalogService` - 选择器目录（ETag 重新验证 + 兜底）
//! - `TelemetryClient` / `HistoryStore` - 失败上报与历史记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个页面上的一次注入"
//! - `InjectionCtx` - 上下文封装（job_id + platform_id）
//! - `PageAgent` - 注入状态机（检测 → 输入 → 发送 → 采集）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_processor` - 多平台扇出与结果汇总
//! - `orchestrator/target_processor` - 单个平台的流水线
//! - `orchestrator/tab_pool` - 平台到页面的复用池
//! - `orchestrator/app` - 装配真实浏览器与后台任务
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::ChromeHost;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{HostSurface, JsExecutor, PageDom, PageId};
pub use models::{Catalog, InjectOptions, Outcome, Selector, SelectorSet};
pub use orchestrator::{App, JobReport, Orchestrator, TabPool};
pub use workflow::{InjectionCtx, PageAgent};
