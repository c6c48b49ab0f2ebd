use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig};
use tracing::{debug, error, info};

use crate::browser::connection::drive_handler;
use crate::error::{AppError, AppResult, BrowserError};

/// 启动无头浏览器
///
/// 未指定可执行文件时由 chromiumoxide 自动查找本机 Chrome / Chromium。
pub async fn launch_headless_browser(executable: Option<&Path>) -> AppResult<Browser> {
    info!("🚀 启动无头浏览器...");

    let mut builder = BrowserConfig::builder().new_headless_mode().args(vec![
        "--disable-gpu",             // 无头模式下禁用 GPU
        "--no-sandbox",              // 禁用沙盒，防止权限问题导致的崩溃
        "--disable-dev-shm-usage",   // 防止共享内存不足
        "--remote-debugging-port=0", // 让浏览器自动选择端口
    ]);
    if let Some(path) = executable {
        debug!("浏览器可执行文件: {}", path.display());
        builder = builder.chrome_executable(path);
    }

    let config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed { source: e.into() })
    })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        AppError::Browser(BrowserError::LaunchFailed {
            source: Box::new(e),
        })
    })?;
    debug!("无头浏览器启动成功");

    drive_handler(handler).await;

    info!("✅ 无头浏览器已就绪");
    Ok(browser)
}
