//! 基于 CDP 的页面 DOM 实现
//!
//! 每个脚本前都带上幂等的引导代码，页面刷新或跳转后无需重新注入。
//! 元素以 id 登记在页面内（元素 → id 用 WeakMap，id → 元素用 WeakRef），Rust 侧只持有 id。
//! 已脱离文档的登记项每登记 64 个元素清理一次。

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::DomError;
use crate::infrastructure::dom::{
    ElementRef, ElementSnapshot, MutationBatch, MutationStream, PageDom,
};
use crate::infrastructure::js_executor::JsExecutor;
use crate::models::Selector;

/// 变更通知使用的运行时绑定名
const MUTATION_BINDING: &str = "__promptcastMutation";

const BOOTSTRAP: &str = r#"
if (!window.__promptcast) {
  const ids = new WeakMap();
  const nodes = new Map();
  let next = 1;
  const sweep = () => {
    for (const [id, ref] of nodes) {
      const el = ref.deref();
      if (!el || !el.isConnected) nodes.delete(id);
    }
  };
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  window.__promptcast = {
    observer: null,
    find(sel) {
      if (sel.kind === 'text') {
        const needle = norm(sel.text);
        for (const el of document.querySelectorAll(sel.scope || '*')) {
          if (norm(el.textContent).includes(needle)) return el;
        }
        return null;
      }
      return document.querySelector(sel.query);
    },
    register(el) {
      const known = ids.get(el);
      if (known && nodes.has(known)) return known;
      const id = 'n' + next++;
      ids.set(el, id);
      nodes.set(id, new WeakRef(el));
      if (next % 64 === 0) sweep();
      return id;
    },
    size() {
      return nodes.size;
    },
    node(id) {
      const ref = nodes.get(id);
      const el = ref && ref.deref();
      if (!el || !el.isConnected) {
        nodes.delete(id);
        throw new Error('stale element: ' + id);
      }
      return el;
    },
    snapshot(el) {
      const st = window.getComputedStyle(el);
      const tag = el.tagName;
      return {
        id: this.register(el),
        tag: tag.toLowerCase(),
        kind: (tag === 'TEXTAREA' || tag === 'INPUT') ? 'value' : (el.isContentEditable ? 'rich_text' : 'other'),
        display: st.display,
        visibility: st.visibility,
        opacity: parseFloat(st.opacity),
        laid_out: el.offsetParent !== null,
        disabled: !!el.disabled,
        aria_disabled: el.getAttribute('aria-disabled') === 'true',
        text_len: (el.textContent || '').length
      };
    },
    isValue(el) {
      return el.tagName === 'TEXTAREA' || el.tagName === 'INPUT';
    },
    text(el) {
      return el.textContent || el.innerText || '';
    },
    observe() {
      if (this.observer) this.observer.disconnect();
      this.observer = new MutationObserver((records) => {
        if (typeof window.__promptcastMutation === 'function') {
          window.__promptcastMutation(String(records.length));
        }
      });
      this.observer.observe(document.body, { childList: true, subtree: true, characterData: true });
    },
    stop() {
      if (this.observer) {
        this.observer.disconnect();
        this.observer = null;
      }
    }
  };
}
"#;

/// 把脚本主体包进带引导代码的立即执行函数
fn script(body: &str) -> String {
    format!("(() => {{ {} const pc = window.__promptcast; {} }})()", BOOTSTRAP, body)
}

fn json_arg<T: serde::Serialize>(value: &T) -> Result<String, DomError> {
    serde_json::to_string(value).map_err(|e| DomError::Script(e.to_string()))
}

/// CDP 页面 DOM
pub struct ChromeDom {
    executor: JsExecutor,
}

impl ChromeDom {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }

    /// 安装引导代码
    pub async fn install(&self) -> Result<(), DomError> {
        self.eval(script("return true;")).await.map(|_| ())
    }

    async fn eval(&self, js: String) -> Result<JsonValue, DomError> {
        self.executor.eval(js).await
    }

    /// 对已登记的元素执行一段脚本，脚本中可用 `el`
    async fn with_node(&self, element: &ElementRef, body: &str) -> Result<JsonValue, DomError> {
        let id = json_arg(&element.0)?;
        self.eval(script(&format!("const el = pc.node({}); {}", id, body)))
            .await
    }
}

#[async_trait]
impl PageDom for ChromeDom {
    async fn probe(&self, selector: &Selector) -> Result<Option<ElementSnapshot>, DomError> {
        let sel = json_arg(&selector.to_probe_json())?;
        let value = self
            .eval(script(&format!(
                "const el = pc.find({}); return el ? pc.snapshot(el) : null;",
                sel
            )))
            .await?;

        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| DomError::Script(format!("探针结果解析失败: {}", e)))
    }

    async fn exists(&self, selector: &Selector) -> Result<bool, DomError> {
        let sel = json_arg(&selector.to_probe_json())?;
        let value = self
            .eval(script(&format!(
                "try {{ return !!pc.find({}); }} catch (e) {{ return false; }}",
                sel
            )))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn clear(&self, element: &ElementRef) -> Result<(), DomError> {
        self.with_node(
            element,
            r#"
            if (pc.isValue(el)) { el.value = ''; }
            else if (el.isContentEditable) { el.textContent = ''; }
            el.dispatchEvent(new Event('input', { bubbles: true }));
            return true;
            "#,
        )
        .await
        .map(|_| ())
    }

    async fn append_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError> {
        let text = json_arg(&text)?;
        self.with_node(
            element,
            &format!(
                r#"
                if (pc.isValue(el)) {{ el.value += {text}; }}
                else {{ el.textContent = (el.textContent || '') + {text}; }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                return true;
                "#
            ),
        )
        .await
        .map(|_| ())
    }

    async fn set_text(&self, element: &ElementRef, text: &str) -> Result<(), DomError> {
        let text = json_arg(&text)?;
        self.with_node(
            element,
            &format!(
                r#"
                if (pc.isValue(el)) {{
                    el.value = {text};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                }} else {{
                    el.textContent = {text};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }}
                return true;
                "#
            ),
        )
        .await
        .map(|_| ())
    }

    async fn commit_input(&self, element: &ElementRef) -> Result<(), DomError> {
        self.with_node(
            element,
            "el.dispatchEvent(new KeyboardEvent('keydown', { key: 'Enter', bubbles: true })); return true;",
        )
        .await
        .map(|_| ())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DomError> {
        self.with_node(element, "el.click(); return true;")
            .await
            .map(|_| ())
    }

    async fn text_length(&self, element: &ElementRef) -> Result<usize, DomError> {
        let value = self.with_node(element, "return pc.text(el).length;").await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn text_slice(
        &self,
        element: &ElementRef,
        start: usize,
        len: usize,
    ) -> Result<String, DomError> {
        let value = self
            .with_node(
                element,
                &format!(
                    "const t = pc.text(el); let end = Math.min({end}, t.length); \
                     const c = t.charCodeAt(end - 1); \
                     if (end < t.length && end - {start} > 1 && c >= 0xD800 && c <= 0xDBFF) end -= 1; \
                     return t.slice({start}, end);",
                    start = start,
                    end = start + len,
                ),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn observe_mutations(&self) -> Result<MutationStream, DomError> {
        let calls = self.executor.binding_calls(MUTATION_BINDING).await?;
        self.eval(script("pc.observe(); return true;")).await?;
        debug!("已开始观察页面变更");

        let stream = calls
            .map(|payload| MutationBatch {
                records: payload.parse().unwrap_or(1),
            })
            .boxed();

        Ok(stream)
    }

    async fn stop_observing(&self) -> Result<(), DomError> {
        self.eval(script("pc.stop(); return true;")).await.map(|_| ())
    }
}
