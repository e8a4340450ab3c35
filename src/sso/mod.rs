pub mod deferred;
pub mod handoff;
pub mod origin;

pub use deferred::{DeferredStore, InMemoryDeferredStore, RedisDeferredStore};
pub use handoff::{handoff_url, FlowState, HandoffDecision};
pub use origin::OriginAllowList;
