//! 测试替身：内存中的页面 DOM 与宿主
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use prompt_cast::error::{AppResult, BrowserError, DomError};
use prompt_cast::infrastructure::{
    EditableKind, ElementRef, ElementSnapshot, HostSurface, MutationBatch, MutationStream, PageDom,
    PageId, PageInfo,
};
use prompt_cast::models::{AgentMessage, AgentReply, Selector};
use prompt_cast::services::{FailureReport, FailureReporter};
use prompt_cast::workflow::{AgentDeps, AgentSettings, PageAgent};

// ========== 页面元素 ==========

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub id: String,
    pub matches: Vec<Selector>,
    pub kind: EditableKind,
    pub visible: bool,
    pub disabled: bool,
    pub text: String,
    /// 页面创建后多久出现
    pub appears_after: Duration,
    /// 只对前 N 次探测可见
    pub probe_budget: Option<usize>,
}

impl FakeElement {
    fn new(id: &str, kind: EditableKind, tag_selector: Selector) -> Self {
        Self {
            id: id.to_string(),
            matches: vec![tag_selector],
            kind,
            visible: true,
            disabled: false,
            text: String::new(),
            appears_after: Duration::ZERO,
            probe_budget: None,
        }
    }

    /// 普通输入框（textarea）
    pub fn input(id: &str, selector: Selector) -> Self {
        Self::new(id, EditableKind::Value, selector)
    }

    /// 富文本输入区域
    pub fn rich_input(id: &str, selector: Selector) -> Self {
        Self::new(id, EditableKind::RichText, selector)
    }

    pub fn button(id: &str, selector: Selector) -> Self {
        Self::new(id, EditableKind::Other, selector)
    }

    pub fn block(id: &str, selector: Selector, text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::new(id, EditableKind::Other, selector)
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    pub fn visible_for_probes(mut self, probes: usize) -> Self {
        self.probe_budget = Some(probes);
        self
    }

    fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot {
            node: ElementRef(self.id.clone()),
            tag: "div".to_string(),
            kind: self.kind,
            display: if self.visible { "block" } else { "none" }.to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            laid_out: self.visible,
            disabled: self.disabled,
            aria_disabled: false,
            text_len: self.text.encode_utf16().count(),
        }
    }
}

// ========== 页面 DOM ==========

/// 一个变更批次，被消费时先把文本更新应用到页面
type QueuedBatch = Option<(String, String)>;

#[derive(Default)]
struct DomState {
    elements: Vec<FakeElement>,
    probes: HashMap<String, usize>,
    failing: HashSet<Selector>,
    ops: Vec<String>,
    clicks: Vec<String>,
    slices: usize,
    fail_clear: bool,
    panic_on_click: bool,
    observer: Option<mpsc::UnboundedSender<QueuedBatch>>,
    pending: VecDeque<QueuedBatch>,
    observe_calls: usize,
    stop_calls: usize,
    consumed_batches: usize,
}

/// 内存中的页面 DOM
pub struct FakeDom {
    created: Instant,
    state: Arc<Mutex<DomState>>,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDom {
    pub fn new() -> Self {
        Self {
            created: Instant::now(),
            state: Arc::new(Mutex::new(DomState::default())),
        }
    }

    pub fn with(self, element: FakeElement) -> Self {
        self.add(element);
        self
    }

    pub fn add(&self, element: FakeElement) {
        self.state.lock().elements.push(element);
    }

    /// 探测该选择器时返回脚本错误
    pub fn fail_on(&self, selector: Selector) {
        self.state.lock().failing.insert(selector);
    }

    pub fn fail_clear(&self) {
        self.state.lock().fail_clear = true;
    }

    pub fn panic_on_click(&self) {
        self.state.lock().panic_on_click = true;
    }

    pub fn set_text(&self, id: &str, text: &str) {
        if let Some(el) = self.state.lock().elements.iter_mut().find(|e| e.id == id) {
            el.text = text.to_string();
        }
    }

    pub fn text_of(&self, id: &str) -> String {
        self.state
            .lock()
            .elements
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.text.clone())
            .unwrap_or_default()
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().ops.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub fn slices(&self) -> usize {
        self.state.lock().slices
    }

    pub fn observe_calls(&self) -> usize {
        self.state.lock().observe_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    pub fn consumed_batches(&self) -> usize {
        self.state.lock().consumed_batches
    }

    /// 排队一个变更批次；`update` 为被消费时写入的 (元素, 新文本)
    pub fn queue_mutation(&self, update: Option<(&str, &str)>) {
        let batch = update.map(|(id, text)| (id.to_string(), text.to_string()));
        let mut state = self.state.lock();
        let undelivered = match &state.observer {
            Some(tx) => tx.send(batch).err().map(|e| e.0),
            None => Some(batch),
        };
        if let Some(batch) = undelivered {
            state.pending.push_back(batch);
        }
    }

    fn find(&self, selector: &Selector) -> Option<FakeElement> {
        let elapsed = self.created.elapsed();
        let mut state = self.state.lock();
        let found = state
            .elements
            .iter()
            .find(|e| e.matches.contains(selector) && elapsed >= e.appears_after)
            .cloned()?;

        let count = state.probes.entry(found.id.clone()).or_insert(0);
        *count += 1;
        match found.probe_budget {
            Some(budget) if *count > budget => None,
            _ => Some(found),
        }
    }

    fn with_element<T>(
        &self,
        element: &ElementRef,
        f: impl FnOnce(&mut FakeElement) -> T,
    ) -> Result<T, DomError> {
        let mut state = self.state.lock();
        state
            .elements
            .iter_mut()
            .find(|e| e.id == element.0)
            .map(f)
            .ok_or_else(|| DomError::StaleElement(element.0.clone()))
    }

    fn log(&self, op: String) {
        self.state.lock().ops.push(op);
    }
}

#[async_trait]
impl PageDom for FakeDom {
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, DomError> {
        if self.state.lock().failing.contains(selector) {
            return Err(DomError::Script(format!("invalid selector {}", selector)));
        }
        Ok(self.find(selector).map(|e| e.snapshot()))
    }

    async fn exists(&self, selector: &Selector) -> Result<bool, DomError> {
        let elapsed = self.created.elapsed();
        Ok(self
            .state
            .lock()
            .elements
            .iter()
            .any(|e| e.matches.contains(selector) && elapsed >= e.appears_after))
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DomError> {
        if self.state.lock().fail_clear {
            return Err(DomError::Script("clear failed".into()));
        }
        self.with_element(element, |e| e.text.clear())?;
        self.log(format!("clear {}", element.0));
        Ok(())
    }

    async fn append_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError> {
        self.with_element(element, |e| e.text.push_str(text))?;
        self.log(format!("append {}", element.0));
        Ok(())
    }

    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError> {
        self.with_element(element, |e| e.text = text.to_string())?;
        self.log(format!("set {}", element.0));
        Ok(())
    }

    async fn commit_input(&self, element: &ElementRef) -> Result<(), DomError> {
        self.log(format!("commit {}", element.0));
        Ok(())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DomError> {
        if self.state.lock().panic_on_click {
            panic!("click handler exploded");
        }
        self.state.lock().clicks.push(element.0.clone());
        Ok(())
    }

    async fn text_length(&self, element: &ElementRef) -> Result<usize, DomError> {
        self.with_element(element, |e| e.text.encode_utf16().count())
    }

    async fn text_slice(
        &self,
        element: &ElementRef,
        start: usize,
        len: usize,
    ) -> Result<String, DomError> {
        self.state.lock().slices += 1;
        let units: Vec<u16> = self.with_element(element, |e| e.text.encode_utf16().collect())?;
        let mut end = (start + len).min(units.len());
        if end < units.len() && end - start > 1 && (0xD800..0xDC00).contains(&units[end - 1]) {
            end -= 1;
        }
        // 拆开的代理对在真实浏览器里会让 JSON 解码失败
        String::from_utf16(&units[start.min(end)..end])
            .map_err(|e| DomError::Script(format!("lone surrogate: {}", e)))
    }

    async fn observe_mutations(&self) -> Result<MutationStream, DomError> {
        let (tx, rx) = mpsc::unbounded_channel::<QueuedBatch>();
        {
            let mut state = self.state.lock();
            state.observe_calls += 1;
            while let Some(batch) = state.pending.pop_front() {
                let _ = tx.send(batch);
            }
            state.observer = Some(tx);
        }

        let state = Arc::clone(&self.state);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|batch| (batch, rx))
        })
        .map(move |batch| {
            let mut state = state.lock();
            state.consumed_batches += 1;
            if let Some((id, text)) = batch {
                if let Some(el) = state.elements.iter_mut().find(|e| e.id == id) {
                    el.text = text;
                }
            }
            MutationBatch { records: 1 }
        })
        .boxed();

        Ok(stream)
    }

    async fn stop_observing(&self) -> Result<(), DomError> {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        state.observer = None;
        Ok(())
    }
}

// ========== 失败上报 ==========

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.reason.clone()).collect()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, report: FailureReport) {
        self.reports.lock().push(report);
    }
}

pub fn agent_deps(reporter: Arc<RecordingReporter>) -> AgentDeps {
    AgentDeps {
        settings: AgentSettings::default(),
        reporter,
        harvest_tx: None,
    }
}

// ========== 宿主 ==========

struct FakePage {
    url: String,
    loaded: bool,
    dom: Arc<FakeDom>,
    agent: Option<Arc<PageAgent>>,
}

#[derive(Default)]
struct HostState {
    pages: HashMap<PageId, FakePage>,
    /// 按 URL 预先准备好的页面 DOM
    doms: HashMap<String, Arc<FakeDom>>,
    opened: Vec<String>,
    focused: Vec<PageId>,
}

/// 内存中的宿主，页面代理使用真实的 `PageAgent`
pub struct FakeHost {
    deps: AgentDeps,
    state: Mutex<HostState>,
    next_id: AtomicU64,
    closed_tx: broadcast::Sender<PageId>,
}

impl FakeHost {
    pub fn new(deps: AgentDeps) -> Self {
        let (closed_tx, _) = broadcast::channel(16);
        Self {
            deps,
            state: Mutex::new(HostState::default()),
            next_id: AtomicU64::new(1),
            closed_tx,
        }
    }

    /// 打开 `url` 时使用这个 DOM
    pub fn serve(&self, url: &str, dom: Arc<FakeDom>) {
        self.state.lock().doms.insert(url.to_string(), dom);
    }

    pub fn opened(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    pub fn focused(&self) -> Vec<PageId> {
        self.state.lock().focused.clone()
    }

    pub fn navigate(&self, page: PageId, url: &str) {
        if let Some(p) = self.state.lock().pages.get_mut(&page) {
            p.url = url.to_string();
        }
    }

    /// 用户关闭页面（发送关闭事件）
    pub fn close(&self, page: PageId) {
        self.state.lock().pages.remove(&page);
        let _ = self.closed_tx.send(page);
    }

    /// 页面消失但没有事件（例如事件丢失）
    pub fn close_silently(&self, page: PageId) {
        self.state.lock().pages.remove(&page);
    }

    pub fn set_loaded(&self, page: PageId, loaded: bool) {
        if let Some(p) = self.state.lock().pages.get_mut(&page) {
            p.loaded = loaded;
        }
    }
}

#[async_trait]
impl HostSurface for FakeHost {
    async fn open_page(&self, url: &str) -> AppResult<PageId> {
        let id = PageId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();
        let dom = state
            .doms
            .get(url)
            .cloned()
            .unwrap_or_else(|| Arc::new(FakeDom::new()));
        state.opened.push(url.to_string());
        state.pages.insert(
            id,
            FakePage {
                url: url.to_string(),
                loaded: true,
                dom,
                agent: None,
            },
        );
        Ok(id)
    }

    async fn inspect_page(&self, page: PageId) -> AppResult<Option<PageInfo>> {
        Ok(self.state.lock().pages.get(&page).map(|p| PageInfo {
            url: p.url.clone(),
            loaded: p.loaded,
        }))
    }

    async fn focus_page(&self, page: PageId) -> AppResult<()> {
        self.state.lock().focused.push(page);
        Ok(())
    }

    async fn inject_agent(&self, page: PageId, platform_id: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        let p = state
            .pages
            .get_mut(&page)
            .ok_or(BrowserError::PageClosed { page })?;
        if p.agent.is_none() {
            let dom: Arc<dyn PageDom> = p.dom.clone();
            p.agent = Some(Arc::new(PageAgent::new(dom, platform_id, self.deps.clone())));
        }
        Ok(())
    }

    async fn send_message(&self, page: PageId, message: AgentMessage) -> AppResult<AgentReply> {
        let agent = self
            .state
            .lock()
            .pages
            .get(&page)
            .and_then(|p| p.agent.clone())
            .ok_or(BrowserError::AgentMissing { page })?;
        Ok(agent.handle(message).await)
    }

    fn page_closed_events(&self) -> broadcast::Receiver<PageId> {
        self.closed_tx.subscribe()
    }
}
