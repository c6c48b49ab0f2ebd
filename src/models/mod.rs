pub mod catalog;
pub mod message;
pub mod outcome;
pub mod platform;
pub mod selector;

pub use catalog::{Catalog, FeatureFlags};
pub use message::{AgentMessage, AgentReply, InjectOptions, PageState};
pub use outcome::{
    BlockReason, HarvestedResponse, InjectionJob, JobStatus, Outcome, Role, SendFailure,
};
pub use platform::Platform;
pub use selector::{ResponseSelectors, Selector, SelectorSet};
