use thiserror::Error;

use crate::infrastructure::PageId;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器 / 宿主相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 页面 DOM 操作错误
    #[error("DOM错误: {0}")]
    Dom(#[from] DomError),
    /// 选择器目录错误
    #[error("选择器目录错误: {0}")]
    Catalog(#[from] CatalogError),
    /// 本地存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 连接浏览器失败
    #[error("无法连接到浏览器 (端口: {port}): {source}")]
    ConnectionFailed {
        port: u16,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 启动浏览器失败
    #[error("启动浏览器失败: {source}")]
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 创建页面失败
    #[error("创建页面失败 ({url}): {source}")]
    PageCreationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面已被关闭
    #[error("页面已关闭: {page}")]
    PageClosed { page: PageId },
    /// 页面中尚未注入代理
    #[error("页面 {page} 未注入代理")]
    AgentMissing { page: PageId },
    /// 执行脚本失败
    #[error("执行脚本失败: {source}")]
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// DOM 操作错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
    /// 页面脚本执行失败（包括非法选择器）
    #[error("脚本执行失败: {0}")]
    Script(String),
    /// 元素引用已失效（节点已从文档移除）
    #[error("元素已失效: {0}")]
    StaleElement(String),
}

/// 元素解析错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// 所有候选选择器均未在预算内命中可见元素
    #[error("所有选择器均已尝试失败: {}", candidates.join(", "))]
    AllSelectorsExhausted { candidates: Vec<String> },
}

/// 页面代理错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    /// 同一页面中已有注入正在进行
    #[error("注入正在进行中")]
    AlreadyInProgress,
}

/// 选择器目录错误
#[derive(Debug, Error)]
pub enum CatalogError {
    /// 网络请求失败
    #[error("请求选择器目录失败 ({url}): {source}")]
    RequestFailed {
        url: String,
        source: reqwest::Error,
    },
    /// 返回了非成功状态码
    #[error("选择器目录返回异常状态码 ({url}): {status}")]
    BadStatus { url: String, status: u16 },
    /// JSON 解析失败
    #[error("选择器目录解析失败: {0}")]
    ParseFailed(#[from] serde_json::Error),
}

/// 本地存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        source: std::io::Error,
    },
    /// 文件内容解析失败
    #[error("解析文件失败 ({path}): {source}")]
    ParseFailed {
        path: String,
        source: serde_json::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("读取配置文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        source: std::io::Error,
    },
    /// 配置文件解析失败
    #[error("配置文件解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<ResolveError> for AppError {
    fn from(err: ResolveError) -> Self {
        AppError::Other(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器连接错误
    pub fn browser_connection_failed(
        port: u16,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::ConnectionFailed {
            port,
            source: Box::new(source),
        })
    }

    /// 创建页面创建失败错误
    pub fn page_creation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Browser(BrowserError::PageCreationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Storage(StorageError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::Storage(StorageError::WriteFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
