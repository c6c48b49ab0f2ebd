pub mod injection_ctx;
pub mod injection_flow;

pub use injection_ctx::InjectionCtx;
pub use injection_flow::{AgentDeps, AgentSettings, PageAgent};
