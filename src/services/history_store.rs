//! 历史记录存储
//!
//! 三个有上限的列表，新记录在前，超出上限时丢弃最旧的记录。
//! 每次写入后整体落盘为 JSON。

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, StorageError};
use crate::models::{HarvestedResponse, Outcome};

pub const PROMPT_HISTORY_LIMIT: usize = 20;
pub const RESULT_HISTORY_LIMIT: usize = 50;
pub const RESPONSE_HISTORY_LIMIT: usize = 50;

/// 一次发送（每个任务一条）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptEntry {
    pub job_id: String,
    pub prompt: String,
    pub platforms: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// 单个平台的注入结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub job_id: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
}

impl ResultEntry {
    pub fn from_outcome(job_id: &str, platform: &str, outcome: &Outcome) -> Self {
        Self {
            job_id: job_id.to_string(),
            platform: platform.to_string(),
            timestamp: Utc::now(),
            success: outcome.is_success(),
            error: outcome.error_summary(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryData {
    pub prompts: Vec<PromptEntry>,
    pub results: Vec<ResultEntry>,
    pub responses: Vec<HarvestedResponse>,
}

/// 插入到最前面并截断到上限
pub fn push_bounded<T>(list: &mut Vec<T>, item: T, limit: usize) {
    list.insert(0, item);
    list.truncate(limit);
}

/// 历史记录存储
pub struct HistoryStore {
    path: Option<PathBuf>,
    data: Mutex<HistoryData>,
}

impl HistoryStore {
    /// 打开（或新建）历史文件
    pub async fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(content) => {
                serde_json::from_slice(&content).map_err(|source| StorageError::ParseFailed {
                    path: path.display().to_string(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("历史文件不存在，将新建: {}", path.display());
                HistoryData::default()
            }
            Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
        };

        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    /// 不落盘的存储
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(HistoryData::default()),
        }
    }

    pub async fn record_prompt(&self, entry: PromptEntry) -> AppResult<()> {
        let mut data = self.data.lock().await;
        push_bounded(&mut data.prompts, entry, PROMPT_HISTORY_LIMIT);
        self.persist(&data).await
    }

    pub async fn record_result(&self, entry: ResultEntry) -> AppResult<()> {
        let mut data = self.data.lock().await;
        push_bounded(&mut data.results, entry, RESULT_HISTORY_LIMIT);
        self.persist(&data).await
    }

    pub async fn record_response(&self, response: HarvestedResponse) -> AppResult<()> {
        let mut data = self.data.lock().await;
        push_bounded(&mut data.responses, response, RESPONSE_HISTORY_LIMIT);
        self.persist(&data).await
    }

    pub async fn snapshot(&self) -> HistoryData {
        self.data.lock().await.clone()
    }

    async fn persist(&self, data: &HistoryData) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json(path, data).await.inspect_err(|e| {
            warn!("⚠️ 保存历史记录失败: {}", e);
        })
    }
}

async fn write_json(path: &Path, data: &HistoryData) -> AppResult<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::file_write_failed(dir.display().to_string(), e))?;
    }
    let content = serde_json::to_vec_pretty(data)
        .map_err(|e| AppError::Other(format!("序列化历史记录失败: {}", e)))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(n: usize) -> PromptEntry {
        PromptEntry {
            job_id: format!("inj_{}", n),
            prompt: format!("prompt {}", n),
            platforms: vec!["kimi".into()],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_push_bounded_keeps_newest_first() {
        let mut list = vec![];
        for n in 0..5 {
            push_bounded(&mut list, n, 3);
        }
        assert_eq!(list, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_prompt_history_capped_at_twenty() {
        let store = HistoryStore::in_memory();
        for n in 0..25 {
            store.record_prompt(prompt(n)).await.unwrap();
        }

        let data = store.snapshot().await;
        assert_eq!(data.prompts.len(), PROMPT_HISTORY_LIMIT);
        assert_eq!(data.prompts[0].job_id, "inj_24");
        assert_eq!(data.prompts.last().unwrap().job_id, "inj_5");
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let store = HistoryStore::open(&path).await.unwrap();
        store.record_prompt(prompt(1)).await.unwrap();
        store
            .record_result(ResultEntry::from_outcome("inj_1", "kimi", &Outcome::success()))
            .await
            .unwrap();

        let reopened = HistoryStore::open(&path).await.unwrap();
        let data = reopened.snapshot().await;
        assert_eq!(data.prompts.len(), 1);
        assert!(data.results[0].success);
        assert!(data.results[0].error.is_none());
    }
}
