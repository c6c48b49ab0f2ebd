//! 宿主与页面代理之间传递的结构化消息

use serde::{Deserialize, Serialize};

use crate::models::outcome::{BlockReason, Outcome};
use crate::models::selector::SelectorSet;

/// 单次注入的选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectOptions {
    /// 逐字输入（模拟人工），否则一次性写入
    pub simulate_typing: bool,
    /// 提交后是否采集回复
    pub harvest_response: bool,
}

impl Default for InjectOptions {
    fn default() -> Self {
        Self {
            simulate_typing: true,
            harvest_response: true,
        }
    }
}

/// 页面状态检测结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub ready: bool,
    pub blocked_reason: Option<BlockReason>,
}

impl PageState {
    pub fn ready() -> Self {
        Self {
            ready: true,
            blocked_reason: None,
        }
    }

    pub fn blocked(reason: BlockReason) -> Self {
        Self {
            ready: false,
            blocked_reason: Some(reason),
        }
    }
}

/// 发给页面代理的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AgentMessage {
    InjectPrompt {
        prompt: String,
        platform: String,
        selectors: SelectorSet,
        options: InjectOptions,
        /// 登录墙检测开关
        signin_detection: bool,
    },
    GetPageState {
        selectors: SelectorSet,
        signin_detection: bool,
    },
    ClearInput {
        selectors: SelectorSet,
    },
}

/// 页面代理的回复
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum AgentReply {
    Injected { outcome: Outcome },
    /// 该页面已有注入在进行
    Busy,
    PageState { state: PageState },
    Cleared { ok: bool, error: Option<String> },
}
