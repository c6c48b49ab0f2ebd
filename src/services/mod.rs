//! 业务能力层（Services）
//!
//! 每个服务描述"我能做什么"，只处理单个页面或单份数据：
//! - `ElementResolver`：排名候选选择器解析
//! - `PageStateDetector`：页面就绪 / 阻断判定
//! - `ResponseHarvester`：回复完成判定与文本提取
//! - `CatalogService`：选择器目录的刷新与兜底
//! - `TelemetryClient`：失败计数上报
//! - `HistoryStore`：有上限的历史记录

pub mod catalog_service;
pub mod element_resolver;
pub mod history_store;
pub mod page_state;
pub mod response_harvester;
pub mod telemetry;

pub use catalog_service::{CatalogService, RefreshOutcome};
pub use element_resolver::ElementResolver;
pub use history_store::{HistoryData, HistoryStore, PromptEntry, ResultEntry};
pub use page_state::{DetectionTimeouts, PageStateDetector};
pub use response_harvester::{CompletionTracker, HarvestSettings, ResponseHarvester};
pub use telemetry::{FailureReport, FailureReporter, TelemetryClient};
