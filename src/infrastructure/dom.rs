//! 页面 DOM 能力
//!
//! 页面代理只通过这个 trait 接触页面，不关心背后是 CDP 还是测试替身。

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::DomError;
use crate::models::Selector;

/// 页面内元素的不透明引用
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub String);

/// 元素的可编辑类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditableKind {
    /// INPUT / TEXTAREA，内容在 value 上
    Value,
    /// contenteditable 富文本区域
    RichText,
    Other,
}

/// 一次探测得到的元素快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    #[serde(rename = "id")]
    pub node: ElementRef,
    pub tag: String,
    pub kind: EditableKind,
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    /// 是否参与布局（offsetParent 存在）
    pub laid_out: bool,
    pub disabled: bool,
    pub aria_disabled: bool,
    pub text_len: usize,
}

impl ElementSnapshot {
    /// 可见性判定：未被 display/visibility/opacity 隐藏且实际参与布局
    pub fn is_visible(&self) -> bool {
        self.display != "none"
            && self.visibility != "hidden"
            && self.opacity != 0.0
            && self.laid_out
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled || self.aria_disabled
    }
}

/// 一批 DOM 变更
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationBatch {
    /// 本批变更记录数
    pub records: usize,
}

/// 变更批次流
pub type MutationStream = BoxStream<'static, MutationBatch>;

/// 页面 DOM 能力
#[async_trait]
pub trait PageDom: Send + Sync {
    /// 查询选择器命中的元素（不判断可见性）
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, DomError>;

    /// 选择器是否命中任意元素
    async fn exists(&self, selector: &Selector) -> Result<bool, DomError>;

    /// 清空元素内容
    async fn clear(&self, element: &ElementRef) -> Result<(), DomError>;

    /// 追加文本（逐字输入时使用）
    async fn append_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError>;

    /// 一次性写入全部文本
    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError>;

    /// 输入完成后通知前端框架（change / Enter keydown）
    async fn commit_input(&self, element: &ElementRef) -> Result<(), DomError>;

    async fn click(&self, element: &ElementRef) -> Result<(), DomError>;

    /// 元素文本长度（UTF-16 代码单元）
    async fn text_length(&self, element: &ElementRef) -> Result<usize, DomError>;

    /// 元素文本的一段 `[start, start + len)`，单位为 UTF-16 代码单元
    ///
    /// 结尾落在代理对中间时少取一个单元，调用方按返回长度前进。
    async fn text_slice(
        &self,
        element: &ElementRef,
        start: usize,
        len: usize,
    ) -> Result<String, DomError>;

    /// 开始观察整页的结构与文本变更；会替换之前的观察者
    async fn observe_mutations(&self) -> Result<MutationStream, DomError>;

    async fn stop_observing(&self) -> Result<(), DomError>;
}
