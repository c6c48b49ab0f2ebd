use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppResult, ConfigError};

/// 默认配置文件名（位于当前目录）
const DEFAULT_CONFIG_FILE: &str = "promptcast.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 浏览器调试端口（已启动的 Chrome）
    pub browser_debug_port: u16,
    /// 连接失败时是否启动无头浏览器
    pub headless: bool,
    /// 无头模式下使用的浏览器可执行文件
    pub chrome_executable: Option<PathBuf>,
    /// 选择器目录地址
    pub registry_url: String,
    /// 功能开关地址
    pub flags_url: String,
    /// 失败计数上报地址
    pub telemetry_url: String,
    /// 上报时携带的客户端版本
    pub client_version: String,
    /// 本地数据目录（目录缓存、历史记录）
    pub data_dir: PathBuf,
    /// 选择器目录有效期（秒）
    pub selector_ttl_secs: u64,
    /// 页面加载等待上限（毫秒）
    pub page_ready_timeout_ms: u64,
    /// 页面加载后的渲染宽限期（毫秒）
    pub hydration_grace_ms: u64,
    /// 回复采集硬上限（秒）
    pub harvest_ceiling_secs: u64,
    /// 标签池巡检间隔（秒）
    pub reconcile_interval_secs: u64,
    /// 是否启用登录墙检测（误报较多，默认关闭）
    pub signin_detection: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_debug_port: 9222,
            headless: false,
            chrome_executable: None,
            registry_url: "https://ronkigen.github.io/promptcast-registry/public/selectors-v1.json"
                .to_string(),
            flags_url: "https://ronkigen.github.io/promptcast-registry/public/flags.json"
                .to_string(),
            telemetry_url: "https://promptcast-telemetry.pixora-ai.workers.dev/hit".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("promptcast_data"),
            selector_ttl_secs: 6 * 60 * 60,
            page_ready_timeout_ms: 15_000,
            hydration_grace_ms: 4_000,
            harvest_ceiling_secs: 180,
            reconcile_interval_secs: 5 * 60,
            signin_detection: false,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 加载配置：配置文件（可选）+ 环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("PROMPTCAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let base = if path.exists() {
            Self::from_file(&path)?
        } else {
            debug!("未找到配置文件 {}，使用默认配置", path.display());
            Self::default()
        };

        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文件读取配置，缺失的字段使用默认值
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
            path: path.display().to_string(),
            source,
        })?;

        let config: Self =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;

        Ok(config.with_positive_intervals())
    }

    /// 仅使用默认值 + 环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Self {
        let config = Self {
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT", self.browser_debug_port),
            headless: env_parse("HEADLESS", self.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE")
                .ok()
                .map(PathBuf::from)
                .or(self.chrome_executable),
            registry_url: std::env::var("REGISTRY_URL").unwrap_or(self.registry_url),
            flags_url: std::env::var("FLAGS_URL").unwrap_or(self.flags_url),
            telemetry_url: std::env::var("TELEMETRY_URL").unwrap_or(self.telemetry_url),
            client_version: std::env::var("CLIENT_VERSION").unwrap_or(self.client_version),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.data_dir),
            selector_ttl_secs: env_parse("SELECTOR_TTL_SECS", self.selector_ttl_secs),
            page_ready_timeout_ms: env_parse("PAGE_READY_TIMEOUT_MS", self.page_ready_timeout_ms),
            hydration_grace_ms: env_parse("HYDRATION_GRACE_MS", self.hydration_grace_ms),
            harvest_ceiling_secs: env_parse("HARVEST_CEILING_SECS", self.harvest_ceiling_secs),
            reconcile_interval_secs: env_parse(
                "RECONCILE_INTERVAL_SECS",
                self.reconcile_interval_secs,
            ),
            signin_detection: env_parse("SIGNIN_DETECTION", self.signin_detection),
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging),
        };
        config.with_positive_intervals()
    }

    /// 周期任务的间隔必须大于 0，否则回退到默认值
    fn with_positive_intervals(self) -> Self {
        let defaults = Self::default();
        Self {
            selector_ttl_secs: positive_or(
                "selector_ttl_secs",
                self.selector_ttl_secs,
                defaults.selector_ttl_secs,
            ),
            reconcile_interval_secs: positive_or(
                "reconcile_interval_secs",
                self.reconcile_interval_secs,
                defaults.reconcile_interval_secs,
            ),
            ..self
        }
    }

    pub fn selector_ttl(&self) -> Duration {
        Duration::from_secs(self.selector_ttl_secs)
    }

    pub fn page_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.page_ready_timeout_ms)
    }

    pub fn hydration_grace(&self) -> Duration {
        Duration::from_millis(self.hydration_grace_ms)
    }

    pub fn harvest_ceiling(&self) -> Duration {
        Duration::from_secs(self.harvest_ceiling_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    /// 目录缓存文件路径
    pub fn catalog_cache_path(&self) -> PathBuf {
        self.data_dir.join("selectors.json")
    }

    /// 历史记录文件路径
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("history.json")
    }
}

/// 解析环境变量，失败时保留原值
fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("环境变量 {} 的值 '{}' 无法解析，使用默认值", name, raw);
            fallback
        }),
        Err(_) => fallback,
    }
}

fn positive_or(name: &str, value: u64, fallback: u64) -> u64 {
    if value == 0 {
        warn!("配置项 {} 必须大于 0，使用默认值 {}", name, fallback);
        fallback
    } else {
        value
    }
}
