//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"执行 JS"与"接收页面回调"两种能力

use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::Page;
use futures::stream::BoxStream;
use futures::{future, StreamExt};
use serde_json::Value as JsonValue;

use crate::error::DomError;

/// 页面脚本抛出的失效元素错误中包含的标记
const STALE_MARKER: &str = "stale element";

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() 能力，错误统一转换为 `DomError`
/// - 不认识平台 / 选择器
/// - 不处理注入流程
#[derive(Clone)]
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 执行 JS 代码并返回 JSON 结果
    ///
    /// 脚本必须返回一个值（`undefined` 会被视为错误）。
    pub async fn eval(&self, js_code: impl Into<String>) -> Result<JsonValue, DomError> {
        let result = self
            .page
            .evaluate(js_code.into())
            .await
            .map_err(|e| classify(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| DomError::Script(format!("脚本没有返回值: {}", e)))
    }

    /// 注册运行时绑定，返回该绑定收到的调用载荷
    pub async fn binding_calls(
        &self,
        name: &'static str,
    ) -> Result<BoxStream<'static, String>, DomError> {
        self.page
            .execute(AddBindingParams::new(name))
            .await
            .map_err(|e| DomError::Script(e.to_string()))?;
        let events = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| DomError::Script(e.to_string()))?;

        Ok(events
            .filter(move |event| future::ready(event.name == name))
            .map(|event| event.payload.clone())
            .boxed())
    }
}

/// 区分失效元素与其他脚本错误
fn classify(message: String) -> DomError {
    if message.contains(STALE_MARKER) {
        DomError::StaleElement(message)
    } else {
        DomError::Script(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stale_element() {
        assert_eq!(
            classify("Uncaught Error: stale element: n3".into()),
            DomError::StaleElement("Uncaught Error: stale element: n3".into())
        );
        assert!(matches!(
            classify("SyntaxError: ':bogus' is not a valid selector".into()),
            DomError::Script(_)
        ));
    }
}
