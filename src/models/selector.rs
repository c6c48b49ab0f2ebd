//! 选择器模型
//!
//! 一个 `Selector` 要么是结构化查询（CSS），要么是文本包含谓词。
//! 目录中文本谓词沿用 `scope:contains('text')` 的字符串写法。

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static CONTAINS_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#":contains\(\s*['"](.*?)['"]\s*\)"#).ok());

/// 元素定位规则
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSelector", into = "RawSelector")]
pub enum Selector {
    /// 结构化查询（querySelector 语义，取第一个匹配）
    Css(String),
    /// 在 `scope` 匹配到的元素中查找文本包含 `text` 的第一个元素
    Text { scope: String, text: String },
}

impl Selector {
    pub fn css(query: impl Into<String>) -> Self {
        Selector::Css(query.into())
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Selector::Text {
            scope: scope.into(),
            text: text.into(),
        }
    }

    /// 解析目录中的字符串写法
    ///
    /// `button:contains("Stop")` → `Text { scope: "button", text: "Stop" }`，
    /// 没有 `:contains` 的一律视为 CSS。
    pub fn parse(raw: &str) -> Self {
        let Some(re) = CONTAINS_RE.as_ref() else {
            return Selector::Css(raw.to_string());
        };

        match re.captures(raw) {
            Some(caps) => {
                let text = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let scope = raw.split(":contains").next().unwrap_or_default().trim();
                Selector::Text {
                    scope: if scope.is_empty() { "*".to_string() } else { scope.to_string() },
                    text: text.to_string(),
                }
            }
            None => Selector::Css(raw.to_string()),
        }
    }

    /// 传给页面探针脚本的 JSON 形式
    pub fn to_probe_json(&self) -> serde_json::Value {
        match self {
            Selector::Css(query) => serde_json::json!({ "kind": "css", "query": query }),
            Selector::Text { scope, text } => {
                serde_json::json!({ "kind": "text", "scope": scope, "text": text })
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(query) => write!(f, "{}", query),
            Selector::Text { scope, text } => write!(f, "{}:contains('{}')", scope, text),
        }
    }
}

/// 目录中的原始写法：字符串或 `{scope, text}` 对象
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelector {
    Query(String),
    Text {
        #[serde(default)]
        scope: Option<String>,
        text: String,
    },
}

impl From<RawSelector> for Selector {
    fn from(raw: RawSelector) -> Self {
        match raw {
            RawSelector::Query(s) => Selector::parse(&s),
            RawSelector::Text { scope, text } => Selector::Text {
                scope: scope.unwrap_or_else(|| "*".to_string()),
                text,
            },
        }
    }
}

impl From<Selector> for RawSelector {
    fn from(selector: Selector) -> Self {
        RawSelector::Query(selector.to_string())
    }
}

/// 文本归一化：折叠空白、去首尾空白、转小写
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 文本包含判断（两侧均归一化）
pub fn text_matches(haystack: &str, needle: &str) -> bool {
    normalize_text(haystack).contains(&normalize_text(needle))
}

/// 回复区域相关选择器
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSelectors {
    #[serde(default)]
    pub container: Vec<Selector>,
    #[serde(default, alias = "stopButton")]
    pub stop_control: Vec<Selector>,
    #[serde(default, alias = "streamingIndicator")]
    pub streaming_indicator: Vec<Selector>,
}

impl ResponseSelectors {
    /// 未知平台使用的通用回复选择器
    pub fn generic() -> Self {
        Self {
            container: vec![
                Selector::css(".response"),
                Selector::css(".message"),
                Selector::css("div[class*=\"response\"]"),
            ],
            stop_control: vec![Selector::text("button", "Stop")],
            streaming_indicator: vec![Selector::css("div[class*=\"loading\"]")],
        }
    }

    /// 内置的按平台回复选择器
    pub fn builtin(platform_id: &str) -> Self {
        let css = |items: &[&str]| items.iter().map(|s| Selector::parse(s)).collect::<Vec<_>>();

        match platform_id {
            "kimi" => Self {
                container: css(&[".message-content", "[data-testid=\"message\"]", "div[class*=\"message\"]"]),
                stop_control: css(&["button[aria-label*=\"Stop\"]", "button:contains(\"停止\")"]),
                streaming_indicator: css(&["div[class*=\"typing\"]", "span[class*=\"cursor\"]"]),
            },
            "chatgpt" => Self {
                container: css(&[
                    "[data-message-author-role=\"assistant\"]",
                    "div[class*=\"agent-turn\"]",
                    ".markdown",
                ]),
                stop_control: css(&[
                    "button[aria-label=\"Stop generating\"]",
                    "button[data-testid=\"stop-button\"]",
                ]),
                streaming_indicator: css(&["div.result-streaming", "div[class*=\"streaming\"]"]),
            },
            "gemini" => Self {
                container: css(&["message-content", "model-response", "[data-test-id=\"response\"]"]),
                stop_control: css(&["button[aria-label*=\"Stop\"]"]),
                streaming_indicator: css(&["mat-spinner", "div[class*=\"loading\"]"]),
            },
            "claude" => Self {
                container: css(&[
                    ".font-claude-message",
                    "[data-testid=\"message-content\"]",
                    "div[class*=\"Message\"]",
                ]),
                stop_control: css(&["button[aria-label*=\"Stop\"]"]),
                streaming_indicator: css(&["div[class*=\"streaming\"]"]),
            },
            _ => Self::generic(),
        }
    }
}

/// 单个平台的选择器集合
///
/// 每个列表严格按顺序尝试，第一个可见匹配胜出；
/// 空列表表示该角色在此平台上不可检测。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    pub input: Vec<Selector>,
    pub send: Vec<Selector>,
    #[serde(default)]
    pub signin_detect: Vec<Selector>,
    #[serde(default)]
    pub limit_detect: Vec<Selector>,
    #[serde(default)]
    pub response: ResponseSelectors,
}

/// 把选择器列表渲染成字符串列表（用于诊断与上报）
pub fn describe(selectors: &[Selector]) -> Vec<String> {
    selectors.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_contains_with_scope() {
        assert_eq!(
            Selector::parse("button:contains(\"Sign In\")"),
            Selector::text("button", "Sign In")
        );
        assert_eq!(
            Selector::parse("div:contains('rate limit')"),
            Selector::text("div", "rate limit")
        );
    }

    #[test]
    fn test_parse_contains_without_scope_defaults_to_any() {
        assert_eq!(Selector::parse(":contains('停止')"), Selector::text("*", "停止"));
    }

    #[test]
    fn test_parse_plain_css() {
        assert_eq!(
            Selector::parse("button[aria-label=\"Send message\"]"),
            Selector::css("button[aria-label=\"Send message\"]")
        );
    }

    #[test]
    fn test_deserialize_mixed_forms() {
        let json = serde_json::json!([
            "#prompt-textarea",
            "a:contains('Log in')",
            { "text": "too many requests" },
            { "scope": "span", "text": "limit" }
        ]);
        let selectors: Vec<Selector> = serde_json::from_value(json).unwrap();

        assert_eq!(
            selectors,
            vec![
                Selector::css("#prompt-textarea"),
                Selector::text("a", "Log in"),
                Selector::text("*", "too many requests"),
                Selector::text("span", "limit"),
            ]
        );
    }

    #[test]
    fn test_text_matching_is_normalized() {
        assert!(text_matches("  Too   Many\nRequests  ", "too many requests"));
        assert!(!text_matches("Send", "stop"));
    }

    #[test]
    fn test_selector_set_missing_optional_roles() {
        let set: SelectorSet = serde_json::from_value(serde_json::json!({
            "input": ["textarea"],
            "send": ["button"]
        }))
        .unwrap();

        assert!(set.signin_detect.is_empty());
        assert!(set.limit_detect.is_empty());
        assert!(set.response.container.is_empty());
    }
}
