//! 注入流程 - 流程层
//!
//! 核心职责：定义"一个页面上的一次注入"的完整状态机
//!
//! 流程顺序：
//! 1. 检测页面状态（登录墙 / 限流 / 输入框）
//! 2. 定位输入框 → 清空 → 输入
//! 3. 定位发送按钮 → 校验可用 → 点击
//! 4. （可选）启动回复采集，不阻塞本次结果
//!
//! 任何阶段的错误或 panic 都在这里转换为 `Outcome`，不会向上传播。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AgentError, AppResult, DomError, ResolveError};
use crate::infrastructure::{EditableKind, ElementSnapshot, PageDom};
use crate::models::selector::describe;
use crate::models::{
    AgentMessage, AgentReply, BlockReason, HarvestedResponse, InjectOptions, Outcome, PageState,
    ResponseSelectors, Role, SelectorSet, SendFailure,
};
use crate::services::{
    DetectionTimeouts, ElementResolver, FailureReport, FailureReporter, HarvestSettings,
    PageStateDetector, ResponseHarvester,
};

/// 页面代理参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub detection: DetectionTimeouts,
    /// 定位输入框 / 发送按钮的时限
    pub locate_timeout: Duration,
    /// 逐字输入时每个字符的延迟范围（毫秒）
    pub keystroke_delay_ms: (u64, u64),
    pub harvest: HarvestSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            detection: DetectionTimeouts::default(),
            locate_timeout: Duration::from_secs(5),
            keystroke_delay_ms: (5, 25),
            harvest: HarvestSettings::default(),
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            harvest: HarvestSettings {
                ceiling: config.harvest_ceiling(),
                ..HarvestSettings::default()
            },
            ..Self::default()
        }
    }
}

/// 创建页面代理所需的共享依赖
#[derive(Clone)]
pub struct AgentDeps {
    pub settings: AgentSettings,
    pub reporter: Arc<dyn FailureReporter>,
    pub harvest_tx: Option<mpsc::UnboundedSender<HarvestedResponse>>,
}

/// 状态机所处阶段（仅用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InjectionState {
    Idle,
    Detecting,
    LocatingInput,
    Clearing,
    Typing,
    LocatingSend,
    Validating,
    Submitted,
    Harvesting,
    Done,
}

/// 离开作用域时释放单飞锁
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 页面代理
///
/// - 每个页面一个实例，单飞锁的作用域也是这个页面
/// - 只依赖 `PageDom` 能力，不认识浏览器
/// - 同一页面同时最多一个回复采集器
pub struct PageAgent {
    dom: Arc<dyn PageDom>,
    platform_id: String,
    deps: AgentDeps,
    in_flight: AtomicBool,
    harvester: Mutex<Option<JoinHandle<()>>>,
}

impl PageAgent {
    pub fn new(dom: Arc<dyn PageDom>, platform_id: impl Into<String>, deps: AgentDeps) -> Self {
        Self {
            dom,
            platform_id: platform_id.into(),
            deps,
            in_flight: AtomicBool::new(false),
            harvester: Mutex::new(None),
        }
    }

    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    /// 处理一条宿主消息
    pub async fn handle(&self, message: AgentMessage) -> AgentReply {
        match message {
            AgentMessage::InjectPrompt {
                prompt,
                selectors,
                options,
                signin_detection,
                ..
            } => match self
                .inject(&prompt, &selectors, options, signin_detection)
                .await
            {
                Ok(outcome) => AgentReply::Injected { outcome },
                Err(AgentError::AlreadyInProgress) => AgentReply::Busy,
            },
            AgentMessage::GetPageState {
                selectors,
                signin_detection,
            } => AgentReply::PageState {
                state: self.page_state(&selectors, signin_detection).await,
            },
            AgentMessage::ClearInput { selectors } => match self.clear_input(&selectors).await {
                Ok(()) => AgentReply::Cleared {
                    ok: true,
                    error: None,
                },
                Err(e) => AgentReply::Cleared {
                    ok: false,
                    error: Some(e.to_string()),
                },
            },
        }
    }

    /// 执行一次注入
    ///
    /// 已有注入在进行时立即返回 `AlreadyInProgress`，不排队。
    pub async fn inject(
        &self,
        prompt: &str,
        selectors: &SelectorSet,
        options: InjectOptions,
        signin_detection: bool,
    ) -> Result<Outcome, AgentError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("[平台 {}] ⚠️ 注入正在进行中，拒绝新的请求", self.platform_id);
            return Err(AgentError::AlreadyInProgress);
        }
        let _guard = FlightGuard(&self.in_flight);

        let pipeline = AssertUnwindSafe(self.run_pipeline(
            prompt,
            selectors,
            options,
            signin_detection,
        ))
        .catch_unwind()
        .await;

        let outcome = match pipeline {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!("[平台 {}] ❌ 注入失败: {}", self.platform_id, e);
                self.report("unexpected_error", vec![]);
                Outcome::unexpected(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("[平台 {}] ❌ 注入过程中 panic: {}", self.platform_id, message);
                self.report("unexpected_error", vec![]);
                Outcome::unexpected(message)
            }
        };

        Ok(outcome)
    }

    /// 仅检测页面状态
    pub async fn page_state(&self, selectors: &SelectorSet, signin_detection: bool) -> PageState {
        PageStateDetector::new(self.dom.as_ref(), self.deps.settings.detection)
            .detect(selectors, signin_detection)
            .await
    }

    /// 清空输入框
    pub async fn clear_input(&self, selectors: &SelectorSet) -> AppResult<()> {
        let input = ElementResolver::new(self.dom.as_ref())
            .resolve(&selectors.input, self.deps.settings.locate_timeout)
            .await?;
        self.dom.clear(&input.node).await?;
        Ok(())
    }

    async fn run_pipeline(
        &self,
        prompt: &str,
        selectors: &SelectorSet,
        options: InjectOptions,
        signin_detection: bool,
    ) -> Result<Outcome, DomError> {
        let mut state = InjectionState::Idle;
        let resolver = ElementResolver::new(self.dom.as_ref());

        // ========== 检测页面状态 ==========
        self.advance(&mut state, InjectionState::Detecting);
        let page_state = self.page_state(selectors, signin_detection).await;
        if !page_state.ready {
            let reason = page_state.blocked_reason.unwrap_or(BlockReason::InputNotFound);
            if reason == BlockReason::InputNotFound {
                self.report("input_not_ready", describe(&selectors.input));
            }
            info!("[平台 {}] 🚫 页面被阻断: {:?}", self.platform_id, reason);
            self.advance(&mut state, InjectionState::Done);
            return Ok(Outcome::blocked(reason));
        }

        // ========== 定位输入框 ==========
        self.advance(&mut state, InjectionState::LocatingInput);
        let input = match resolver
            .resolve(&selectors.input, self.deps.settings.locate_timeout)
            .await
        {
            Ok(input) => input,
            Err(ResolveError::AllSelectorsExhausted { candidates }) => {
                self.report("input_not_found", candidates.clone());
                self.advance(&mut state, InjectionState::Done);
                return Ok(Outcome::not_found(Role::Input, candidates));
            }
        };

        // ========== 清空并输入 ==========
        self.advance(&mut state, InjectionState::Clearing);
        self.dom.clear(&input.node).await?;

        self.advance(&mut state, InjectionState::Typing);
        self.type_prompt(&input, prompt, options.simulate_typing)
            .await?;

        // ========== 定位发送按钮 ==========
        self.advance(&mut state, InjectionState::LocatingSend);
        let send = match resolver
            .resolve(&selectors.send, self.deps.settings.locate_timeout)
            .await
        {
            Ok(send) => send,
            Err(ResolveError::AllSelectorsExhausted { candidates }) => {
                self.report("send_not_found", candidates);
                self.advance(&mut state, InjectionState::Done);
                return Ok(Outcome::partial(SendFailure::NotFound));
            }
        };

        // ========== 校验并提交 ==========
        self.advance(&mut state, InjectionState::Validating);
        if send.is_disabled() {
            warn!("[平台 {}] ⚠️ 发送按钮不可用，不点击", self.platform_id);
            self.report("send_disabled", describe(&selectors.send));
            self.advance(&mut state, InjectionState::Done);
            return Ok(Outcome::partial(SendFailure::Disabled));
        }

        self.dom.click(&send.node).await?;
        self.advance(&mut state, InjectionState::Submitted);
        info!("[平台 {}] ✓ 提示词已提交", self.platform_id);

        if options.harvest_response {
            self.advance(&mut state, InjectionState::Harvesting);
            self.start_harvest(prompt, selectors.response.clone());
        }

        self.advance(&mut state, InjectionState::Done);
        Ok(Outcome::success())
    }

    /// 写入提示词
    ///
    /// 普通输入框支持逐字输入；富文本区域总是一次性写入。
    async fn type_prompt(
        &self,
        input: &ElementSnapshot,
        prompt: &str,
        simulate_typing: bool,
    ) -> Result<(), DomError> {
        match input.kind {
            EditableKind::Value if simulate_typing => {
                let (low, high) = self.deps.settings.keystroke_delay_ms;
                let mut buf = [0u8; 4];
                for ch in prompt.chars() {
                    self.dom
                        .append_text(&input.node, ch.encode_utf8(&mut buf))
                        .await?;
                    let delay = {
                        let mut rng = rand::rng();
                        rng.random_range(low..=high.max(low))
                    };
                    sleep(Duration::from_millis(delay)).await;
                }
            }
            _ => self.dom.set_text(&input.node, prompt).await?,
        }

        self.dom.commit_input(&input.node).await
    }

    /// 启动回复采集，替换该页面上之前的采集器
    fn start_harvest(&self, prompt: &str, selectors: ResponseSelectors) {
        let mut harvester = ResponseHarvester::new(
            self.dom.clone(),
            selectors,
            self.deps.settings.harvest,
            self.platform_id.clone(),
            prompt,
        );
        if let Some(tx) = &self.deps.harvest_tx {
            harvester = harvester.with_sink(tx.clone());
        }

        let mut slot = self.harvester.lock();
        if let Some(previous) = slot.take() {
            debug!("[平台 {}] 终止上一个回复采集器", self.platform_id);
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            harvester.run().await;
        }));
    }

    fn advance(&self, state: &mut InjectionState, next: InjectionState) {
        debug!("[平台 {}] {:?} → {:?}", self.platform_id, state, next);
        *state = next;
    }

    fn report(&self, reason: &str, attempted: Vec<String>) {
        self.deps
            .reporter
            .report(FailureReport::new(self.platform_id.clone(), reason, attempted));
    }
}

impl Drop for PageAgent {
    fn drop(&mut self) {
        if let Some(handle) = self.harvester.get_mut().take() {
            handle.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知异常".to_string()
    }
}
