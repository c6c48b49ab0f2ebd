//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源（Page），只向上暴露能力：
//! - `JsExecutor`：唯一的 page owner，提供 eval()
//! - `PageDom` / `ChromeDom`：页面 DOM 能力及其 CDP 实现
//! - `HostSurface`：宿主自动化接口

pub mod chrome_dom;
pub mod dom;
pub mod host;
pub mod js_executor;

pub use chrome_dom::ChromeDom;
pub use dom::{EditableKind, ElementRef, ElementSnapshot, MutationBatch, MutationStream, PageDom};
pub use host::{HostSurface, PageId, PageInfo};
pub use js_executor::JsExecutor;
