//! 失败计数上报
//!
//! 尽力而为：不等待响应，失败直接忽略，绝不影响注入结果。
//! 上报只携带平台与客户端版本；尝试过的选择器只写入本地日志。

use tracing::{debug, warn};

/// 一次失败报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub platform: String,
    /// 失败原因，例如 `input_not_found`
    pub reason: String,
    pub attempted: Vec<String>,
}

impl FailureReport {
    pub fn new(platform: impl Into<String>, reason: impl Into<String>, attempted: Vec<String>) -> Self {
        Self {
            platform: platform.into(),
            reason: reason.into(),
            attempted,
        }
    }
}

/// 失败上报接口
pub trait FailureReporter: Send + Sync {
    fn report(&self, report: FailureReport);
}

/// HTTP 上报客户端
#[derive(Clone)]
pub struct TelemetryClient {
    client: reqwest::Client,
    endpoint: String,
    client_version: String,
}

impl TelemetryClient {
    pub fn new(endpoint: impl Into<String>, client_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            client_version: client_version.into(),
        }
    }
}

impl FailureReporter for TelemetryClient {
    fn report(&self, report: FailureReport) {
        warn!(
            "[平台 {}] 📮 上报失败: {} (尝试过的选择器: {:?})",
            report.platform, report.reason, report.attempted
        );

        if self.endpoint.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("没有可用的运行时，跳过上报");
            return;
        };

        let request = self.client.post(&self.endpoint).query(&[
            ("platform", report.platform.as_str()),
            ("v", self.client_version.as_str()),
        ]);

        runtime.spawn(async move {
            if let Err(e) = request.send().await {
                debug!("上报请求失败（已忽略）: {}", e);
            }
        });
    }
}
