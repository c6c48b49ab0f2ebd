//! 选择器目录模型
//!
//! 目录只会被整体替换，消费方拿到的是只读快照。

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::models::platform;
use crate::models::selector::{ResponseSelectors, Selector, SelectorSet};

/// 内置的兜底目录（远端不可达且本地无缓存时使用）
const BUILTIN_REGISTRY: &str = include_str!("../../assets/default_selectors.json");

/// 选择器目录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: String,
    pub platforms: HashMap<String, SelectorSet>,
    pub fetched_at: DateTime<Utc>,
    /// 用于条件请求的实体标签
    pub revalidation_token: Option<String>,
}

impl Catalog {
    /// 从远端目录文档构造
    pub fn from_registry_json(
        body: &[u8],
        fetched_at: DateTime<Utc>,
        revalidation_token: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let document: RegistryDocument = serde_json::from_slice(body)?;

        let platforms = document
            .platforms
            .into_iter()
            .map(|(id, entry)| {
                let set = entry.into_selector_set(&id);
                (id, set)
            })
            .collect();

        Ok(Self {
            version: document.version,
            platforms,
            fetched_at,
            revalidation_token,
        })
    }

    /// 内置兜底目录，时间戳为纪元时间，因此总是被视为过期
    pub fn builtin() -> Self {
        match Self::from_registry_json(BUILTIN_REGISTRY.as_bytes(), DateTime::<Utc>::default(), None) {
            Ok(catalog) => catalog,
            Err(e) => {
                error!("内置选择器目录解析失败: {}", e);
                Self {
                    version: "builtin-empty".to_string(),
                    platforms: HashMap::new(),
                    fetched_at: DateTime::<Utc>::default(),
                    revalidation_token: None,
                }
            }
        }
    }

    /// 是否仍在有效期内
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let age = now.signed_duration_since(self.fetched_at);
        age.to_std().map(|age| age < ttl).unwrap_or(false)
    }

    /// 仅刷新时间戳（304 重新验证）
    pub fn revalidated(&self, now: DateTime<Utc>) -> Self {
        Self {
            fetched_at: now,
            ..self.clone()
        }
    }

    pub fn selectors_for(&self, platform_id: &str) -> Option<&SelectorSet> {
        self.platforms.get(platform_id)
    }
}

/// 远端目录文档
#[derive(Debug, Deserialize)]
struct RegistryDocument {
    version: String,
    #[serde(default)]
    platforms: HashMap<String, PlatformEntry>,
}

#[derive(Debug, Deserialize)]
struct PlatformEntry {
    /// 目录记录的平台地址，仅用于与内置平台表核对
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    selectors: RoleSelectors,
    #[serde(default)]
    signin_detect: Vec<Selector>,
    #[serde(default)]
    limit_detect: Vec<Selector>,
    #[serde(default)]
    response: Option<ResponseSelectors>,
}

#[derive(Debug, Default, Deserialize)]
struct RoleSelectors {
    #[serde(default)]
    input: Vec<Selector>,
    #[serde(default)]
    send: Vec<Selector>,
}

impl PlatformEntry {
    /// 目录地址与内置平台表不属于同一站点
    fn url_disagrees(&self, platform_id: &str) -> bool {
        match (self.url.as_deref(), platform::lookup(platform_id)) {
            (Some(url), Some(known)) => !known.owns_url(url),
            _ => false,
        }
    }

    fn into_selector_set(self, platform_id: &str) -> SelectorSet {
        if self.url_disagrees(platform_id) {
            warn!(
                "⚠️ 目录中平台 {} 的地址 {} 与内置地址不一致，以内置地址为准",
                platform_id,
                self.url.as_deref().unwrap_or_default()
            );
        }
        SelectorSet {
            input: self.selectors.input,
            send: self.selectors.send,
            signin_detect: self.signin_detect,
            limit_detect: self.limit_detect,
            response: self
                .response
                .unwrap_or_else(|| ResponseSelectors::builtin(platform_id)),
        }
    }
}

/// 远端功能开关
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub rollout: HashMap<String, serde_json::Value>,
    /// 下一次刷新忽略目录有效期
    pub force_refresh: bool,
    /// 重新启用登录墙检测
    pub signin_detection: bool,
}
