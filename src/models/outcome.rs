//! 注入结果模型

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 需要定位的元素角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Input,
    Send,
}

/// 页面被阻断的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// 需要登录
    Signin,
    /// 触发限流
    RateLimit,
    /// 检测超时内输入框不可定位，页面视为未就绪
    InputNotFound,
}

impl BlockReason {
    /// 面向用户的处理建议
    pub fn guidance(self) -> &'static str {
        match self {
            BlockReason::Signin => "请先登录该平台",
            BlockReason::RateLimit => "已达到平台限流，请 1-4 小时后再试",
            BlockReason::InputNotFound => "平台页面未就绪，请刷新页面后重试",
        }
    }
}

/// 发送按钮失败的具体情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailure {
    /// 所有发送按钮选择器均未命中
    NotFound,
    /// 找到了按钮但处于禁用状态
    Disabled,
}

/// 单个平台的最终结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// 已提交
    Success { timestamp: DateTime<Utc> },
    /// 页面被阻断
    Blocked {
        reason: BlockReason,
        guidance: String,
    },
    /// 关键元素未找到
    NotFound {
        role: Role,
        attempted_selectors: Vec<String>,
        guidance: String,
    },
    /// 已输入但未能发送
    PartialSuccess {
        typed: bool,
        send_failed_or_disabled: SendFailure,
        guidance: String,
    },
    /// 未分类的异常
    UnexpectedError { message: String, guidance: String },
}

impl Outcome {
    pub fn success() -> Self {
        Outcome::Success {
            timestamp: Utc::now(),
        }
    }

    pub fn blocked(reason: BlockReason) -> Self {
        Outcome::Blocked {
            reason,
            guidance: reason.guidance().to_string(),
        }
    }

    pub fn not_found(role: Role, attempted_selectors: Vec<String>) -> Self {
        Outcome::NotFound {
            role,
            attempted_selectors,
            guidance: "平台界面可能已改版，请检查选择器目录更新，或刷新页面 / 新开对话后重试"
                .to_string(),
        }
    }

    pub fn partial(failure: SendFailure) -> Self {
        let guidance = match failure {
            SendFailure::NotFound => "提示词已输入但未发送，请手动点击发送",
            SendFailure::Disabled => "提示词已输入但发送按钮不可用，请检查输入内容后手动发送",
        };
        Outcome::PartialSuccess {
            typed: true,
            send_failed_or_disabled: failure,
            guidance: guidance.to_string(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Outcome::UnexpectedError {
            message: message.into(),
            guidance: "发生意外错误，请刷新页面后重试".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// 失败时的简短描述（成功时为 None）
    pub fn error_summary(&self) -> Option<String> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Blocked { reason, .. } => Some(format!("blocked: {:?}", reason)),
            Outcome::NotFound { role, .. } => Some(format!("{:?} not found", role)),
            Outcome::PartialSuccess {
                send_failed_or_disabled,
                ..
            } => Some(format!("partial: send {:?}", send_failed_or_disabled)),
            Outcome::UnexpectedError { message, .. } => Some(message.clone()),
        }
    }

    /// 面向用户的处理建议
    pub fn guidance(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Blocked { guidance, .. }
            | Outcome::NotFound { guidance, .. }
            | Outcome::PartialSuccess { guidance, .. }
            | Outcome::UnexpectedError { guidance, .. } => Some(guidance),
        }
    }
}

/// 采集到的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestedResponse {
    pub platform_id: String,
    pub prompt: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Launching,
    Completed,
}

/// 一次用户发起的多平台注入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionJob {
    pub job_id: String,
    pub platforms: Vec<String>,
    pub prompt: String,
    pub status: JobStatus,
    pub per_target_result: BTreeMap<String, Outcome>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guidance_distinct_per_taxonomy_entry() {
        let outcomes = [
            Outcome::blocked(BlockReason::Signin),
            Outcome::blocked(BlockReason::RateLimit),
            Outcome::blocked(BlockReason::InputNotFound),
            Outcome::not_found(Role::Input, vec![]),
            Outcome::partial(SendFailure::NotFound),
            Outcome::partial(SendFailure::Disabled),
            Outcome::unexpected("boom"),
        ];

        let mut hints: Vec<&str> = outcomes.iter().filter_map(Outcome::guidance).collect();
        let total = hints.len();
        hints.sort();
        hints.dedup();
        assert_eq!(hints.len(), total);
        assert!(Outcome::success().guidance().is_none());
    }

    #[test]
    fn test_outcome_serializes_with_kind_tag() {
        let json = serde_json::to_value(Outcome::partial(SendFailure::Disabled)).unwrap();
        assert_eq!(json["kind"], "partial_success");
        assert_eq!(json["send_failed_or_disabled"], "disabled");
        assert_eq!(json["typed"], true);
    }

    #[test]
    fn test_missing_input_reason_serializes_as_input_not_found() {
        let json = serde_json::to_value(Outcome::blocked(BlockReason::InputNotFound)).unwrap();
        assert_eq!(json["kind"], "blocked");
        assert_eq!(json["reason"], "input_not_found");
    }
}
