//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责多平台扇出和资源调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用装配
//! - 连接浏览器，装配宿主、标签池、目录、历史、上报
//! - 持有后台任务（巡检、目录刷新、回复收集）
//!
//! ### `job_processor` - 任务处理器
//! - 一个提示词扇出到 N 个平台，并发运行、互不影响
//! - 按平台汇总结果，写入历史，维护任务状态
//!
//! ### `target_processor` - 单个平台处理器
//! - 获取页面 → 等待就绪 → 注入代理 → 发送指令 → `Outcome`
//!
//! ### `tab_pool` - 标签池
//! - 平台到页面的映射，只复用不关闭
//!
//! ## 层次关系
//!
//! ```text
//! job_processor (处理 Vec<Platform>)
//!     ↓
//! target_processor (处理单个平台) ── tab_pool
//!     ↓
//! workflow::PageAgent (页面内的注入状态机)
//!     ↓
//! services (能力层：resolver / detector / harvester)
//!     ↓
//! infrastructure (基础设施：PageDom / HostSurface)
//! ```

pub mod app;
pub mod job_processor;
pub mod tab_pool;
pub mod target_processor;

// 重新导出主要类型
pub use app::App;
pub use job_processor::{spawn_response_collector, JobReport, Orchestrator, ResponseCollector};
pub use tab_pool::{PooledTarget, TabPool, TargetState};
pub use target_processor::{process_target, ReadinessSettings, TargetDeps, TargetRequest};
